/// Tick-to-M1 aggregation. Maintains one in-progress M1 candle per symbol;
/// finalizes it into the `CandleStoreRegistry` on minute-bucket rollover.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::data::candle_store::CandleStoreRegistry;
use crate::types::{Candle, Tick};

/// Aligns `ts` down to the start of its UTC minute.
fn minute_bucket(ts: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    use chrono::Timelike;
    ts.with_second(0).unwrap().with_nanosecond(0).unwrap()
}

#[derive(Debug, Clone, Copy)]
struct InProgressCandle {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    bucket_start: chrono::DateTime<chrono::Utc>,
}

impl InProgressCandle {
    fn new(mid: f64, bucket_start: chrono::DateTime<chrono::Utc>) -> Self {
        InProgressCandle { open: mid, high: mid, low: mid, close: mid, volume: 1, bucket_start }
    }

    fn update(&mut self, mid: f64) {
        self.high = self.high.max(mid);
        self.low = self.low.min(mid);
        self.close = mid;
        self.volume += 1;
    }

    fn finalize(&self) -> Candle {
        Candle {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            start_time: self.bucket_start,
            end_time: self.bucket_start + chrono::Duration::minutes(1),
        }
    }
}

pub struct CandleBuilder {
    stores: CandleStoreRegistry,
    in_progress: Arc<RwLock<HashMap<String, InProgressCandle>>>,
}

impl CandleBuilder {
    pub fn new(stores: CandleStoreRegistry) -> Self {
        CandleBuilder { stores, in_progress: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Folds a single tick into the current M1 candle for `symbol`,
    /// finalizing the previous one if the minute bucket rolled over.
    pub async fn on_tick(&self, symbol: &str, tick: Tick) {
        let bucket = minute_bucket(tick.time);
        let mid = tick.mid();

        let mut in_progress = self.in_progress.write().await;
        match in_progress.get_mut(symbol) {
            Some(current) if current.bucket_start == bucket => {
                current.update(mid);
            }
            Some(current) => {
                let finished = current.finalize();
                self.stores.add_candle(symbol, finished).await;
                *current = InProgressCandle::new(mid, bucket);
            }
            None => {
                in_progress.insert(symbol.to_string(), InProgressCandle::new(mid, bucket));
            }
        }
    }

    /// The still-forming M1 candle, for call sites that want it included
    /// (order-flow display); strategy evaluation excludes it.
    pub async fn current(&self, symbol: &str) -> Option<Candle> {
        self.in_progress.read().await.get(symbol).map(|c| c.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(bid: f64, ask: f64, minute: u32, second: u32) -> Tick {
        Tick {
            bid,
            ask,
            time: chrono::Utc.with_ymd_and_hms(2026, 1, 1, 10, minute, second).unwrap(),
        }
    }

    #[tokio::test]
    async fn rolls_over_on_minute_boundary() {
        let stores = CandleStoreRegistry::new(100);
        let builder = CandleBuilder::new(stores.clone());

        builder.on_tick("XAUUSD", tick(100.0, 100.2, 0, 0)).await;
        builder.on_tick("XAUUSD", tick(101.0, 101.2, 0, 30)).await;
        builder.on_tick("XAUUSD", tick(99.0, 99.2, 1, 0)).await;

        let recent = stores.recent("XAUUSD", 10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].open, 100.1);
        assert_eq!(recent[0].close, 101.1);
        assert_eq!(recent[0].volume, 2);
    }

    #[tokio::test]
    async fn tracks_high_low_within_bucket() {
        let stores = CandleStoreRegistry::new(100);
        let builder = CandleBuilder::new(stores.clone());

        builder.on_tick("EURUSD", tick(1.1000, 1.1002, 0, 0)).await;
        builder.on_tick("EURUSD", tick(1.1050, 1.1052, 0, 10)).await;
        builder.on_tick("EURUSD", tick(1.0950, 1.0952, 0, 20)).await;
        builder.on_tick("EURUSD", tick(1.1000, 1.1002, 1, 0)).await;

        let recent = stores.recent("EURUSD", 10).await;
        assert_eq!(recent.len(), 1);
        assert!((recent[0].high - 1.1051).abs() < 1e-9);
        assert!((recent[0].low - 1.0951).abs() < 1e-9);
    }
}
