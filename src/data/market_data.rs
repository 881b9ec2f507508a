/// On-demand M1 → M5/M15/H1/H4 aggregation over wall-clock UTC-aligned
/// bucket boundaries, plus the `getRecentCandles` contract used by strategy
/// evaluation and order flow.
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::data::candle_builder::CandleBuilder;
use crate::data::candle_store::CandleStoreRegistry;
use crate::types::{Candle, Timeframe};

/// Floors `ts` to the start of its bucket for `tf`. M5 aligns on minutes %5,
/// M15 on %15, H1 on the hour, H4 on hours %4 from 00:00 UTC.
fn bucket_start(ts: DateTime<Utc>, tf: Timeframe) -> DateTime<Utc> {
    match tf {
        Timeframe::M1 => ts.with_second(0).unwrap().with_nanosecond(0).unwrap(),
        Timeframe::M5 => {
            let minute = (ts.minute() / 5) * 5;
            ts.with_minute(minute).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap()
        }
        Timeframe::M15 => {
            let minute = (ts.minute() / 15) * 15;
            ts.with_minute(minute).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap()
        }
        Timeframe::H1 => ts.with_minute(0).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap(),
        Timeframe::H4 => {
            let hour = (ts.hour() / 4) * 4;
            ts.with_hour(hour).unwrap().with_minute(0).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap()
        }
    }
}

/// Aggregates M1 candles (assumed ascending by `start_time`) into `tf`
/// candles. A bucket with zero M1 bars is skipped, never emitted as flat.
/// Does not trust anything about the input beyond UTC time ordering.
pub fn aggregate(m1: &[Candle], tf: Timeframe) -> Vec<Candle> {
    if tf == Timeframe::M1 {
        return m1.to_vec();
    }

    let mut out = Vec::new();
    let mut current_bucket: Option<DateTime<Utc>> = None;
    let mut open = 0.0;
    let mut high = f64::MIN;
    let mut low = f64::MAX;
    let mut close = 0.0;
    let mut volume: i64 = 0;

    for bar in m1 {
        let bucket = bucket_start(bar.start_time, tf);
        match current_bucket {
            Some(b) if b == bucket => {
                high = high.max(bar.high);
                low = low.min(bar.low);
                close = bar.close;
                volume += bar.volume;
            }
            Some(b) => {
                out.push(Candle {
                    open,
                    high,
                    low,
                    close,
                    volume,
                    start_time: b,
                    end_time: b + chrono::Duration::minutes(tf.minutes()),
                });
                current_bucket = Some(bucket);
                open = bar.open;
                high = bar.high;
                low = bar.low;
                close = bar.close;
                volume = bar.volume;
            }
            None => {
                current_bucket = Some(bucket);
                open = bar.open;
                high = bar.high;
                low = bar.low;
                close = bar.close;
                volume = bar.volume;
            }
        }
    }

    if let Some(b) = current_bucket {
        out.push(Candle {
            open,
            high,
            low,
            close,
            volume,
            start_time: b,
            end_time: b + chrono::Duration::minutes(tf.minutes()),
        });
    }

    out
}

#[derive(Clone)]
pub struct MarketData {
    stores: CandleStoreRegistry,
    builder: std::sync::Arc<CandleBuilder>,
}

impl MarketData {
    pub fn new(stores: CandleStoreRegistry, builder: std::sync::Arc<CandleBuilder>) -> Self {
        MarketData { stores, builder }
    }

    /// `getRecentCandles(symbol, tf, limit)`: up to `limit` most-recent
    /// candles, ascending, excluding the in-progress bar (strategy call
    /// sites want this; order flow reads the builder's `current` directly
    /// when it needs the forming bar).
    pub async fn recent_candles(&self, symbol: &str, tf: Timeframe, limit: usize) -> Vec<Candle> {
        // Pull extra M1 history so the aggregation window has enough
        // complete buckets to produce `limit` higher-timeframe candles.
        let m1_needed = limit * tf.minutes().max(1) as usize + tf.minutes() as usize;
        let m1 = self.stores.recent(symbol, m1_needed.max(limit)).await;
        let aggregated = aggregate(&m1, tf);
        let n = limit.min(aggregated.len());
        aggregated[aggregated.len() - n..].to_vec()
    }

    pub async fn current_m1(&self, symbol: &str) -> Option<Candle> {
        self.builder.current(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn m1(minute_offset: i64, open: f64, high: f64, low: f64, close: f64, volume: i64) -> Candle {
        let start = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(minute_offset);
        Candle { open, high, low, close, volume, start_time: start, end_time: start + chrono::Duration::minutes(1) }
    }

    #[test]
    fn m5_aggregation_matches_invariants() {
        let bars = vec![
            m1(0, 1.0, 1.5, 0.9, 1.2, 10),
            m1(1, 1.2, 1.6, 1.1, 1.3, 10),
            m1(2, 1.3, 1.4, 1.2, 1.35, 10),
            m1(3, 1.35, 1.45, 1.3, 1.4, 10),
            m1(4, 1.4, 1.5, 1.35, 1.45, 10),
        ];
        let m5 = aggregate(&bars, Timeframe::M5);
        assert_eq!(m5.len(), 1);
        assert_eq!(m5[0].open, 1.0);
        assert_eq!(m5[0].close, 1.45);
        assert_eq!(m5[0].high, 1.6);
        assert_eq!(m5[0].low, 0.9);
        assert_eq!(m5[0].volume, 50);
    }

    #[test]
    fn aggregating_twice_matches_direct_aggregation() {
        let bars: Vec<Candle> = (0..30)
            .map(|i| m1(i, 1.0 + i as f64 * 0.01, 1.1 + i as f64 * 0.01, 0.9 + i as f64 * 0.01, 1.0 + i as f64 * 0.01, 5))
            .collect();

        let m5 = aggregate(&bars, Timeframe::M5);
        let m15_via_m5 = aggregate(&m5, Timeframe::M15);
        let m15_direct = aggregate(&bars, Timeframe::M15);

        assert_eq!(m15_via_m5.len(), m15_direct.len());
        for (a, b) in m15_via_m5.iter().zip(m15_direct.iter()) {
            assert_eq!(a.open, b.open);
            assert_eq!(a.close, b.close);
            assert_eq!(a.high, b.high);
            assert_eq!(a.low, b.low);
            assert_eq!(a.volume, b.volume);
        }
    }

    #[test]
    fn skips_buckets_with_zero_bars() {
        let bars = vec![m1(0, 1.0, 1.1, 0.9, 1.0, 1), m1(10, 1.0, 1.1, 0.9, 1.0, 1)];
        let m5 = aggregate(&bars, Timeframe::M5);
        assert_eq!(m5.len(), 2);
    }
}
