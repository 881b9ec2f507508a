/// Break of structure, trend bias, change of character, premium/discount.
use crate::types::{BosEvent, Candle, ChochEvent, SwingKind, SwingPoint, TradeDirection, Trend, TrendBias};

/// Scans candles for BOS events: a close beyond the most recent
/// opposite-directional swing level within `lookback` candles of that swing.
/// Strict close policy: the close itself, not the wick, must clear the level.
pub fn find_bos_events(candles: &[Candle], swings: &[SwingPoint], lookback: usize) -> Vec<BosEvent> {
    let mut events = Vec::new();

    for (si, swing) in swings.iter().enumerate() {
        let scan_start = swing.index + 1;
        let scan_end = (swing.index + 1 + lookback).min(candles.len());
        if scan_start >= scan_end {
            continue;
        }

        for i in scan_start..scan_end {
            let broke = match swing.kind {
                SwingKind::High => candles[i].close > swing.price,
                SwingKind::Low => candles[i].close < swing.price,
            };
            if broke {
                let direction = match swing.kind {
                    SwingKind::High => TradeDirection::Buy,
                    SwingKind::Low => TradeDirection::Sell,
                };
                events.push(BosEvent { index: i, direction, broken_swing_idx: si, level: swing.price });
                break;
            }
        }
    }

    events
}

/// Bullish iff the last two confirmed highs and the last two confirmed lows
/// are each strictly increasing and the last BOS is bullish; bearish
/// symmetric; sideways otherwise.
pub fn trend_bias(swings: &[SwingPoint], bos_events: &[BosEvent], last_price: f64) -> TrendBias {
    use crate::strategy::swings::last_n_of;

    let last2_highs = last_n_of(swings, SwingKind::High, 2);
    let last2_lows = last_n_of(swings, SwingKind::Low, 2);
    let last_bos_dir = bos_events.last().map(|b| b.direction);

    let rising_highs = last2_highs.len() == 2 && last2_highs[0].price < last2_highs[1].price;
    let rising_lows = last2_lows.len() == 2 && last2_lows[0].price < last2_lows[1].price;
    let falling_highs = last2_highs.len() == 2 && last2_highs[0].price > last2_highs[1].price;
    let falling_lows = last2_lows.len() == 2 && last2_lows[0].price > last2_lows[1].price;

    let trend = if rising_highs && rising_lows && last_bos_dir == Some(TradeDirection::Buy) {
        Trend::Bullish
    } else if falling_highs && falling_lows && last_bos_dir == Some(TradeDirection::Sell) {
        Trend::Bearish
    } else {
        Trend::Sideways
    };

    let last_swing_hi = last2_highs.last().map(|s| s.price);
    let last_swing_lo = last2_lows.last().map(|s| s.price);

    let pd_position = match (last_swing_lo, last_swing_hi) {
        (Some(lo), Some(hi)) if (hi - lo).abs() > f64::EPSILON => Some(((last_price - lo) / (hi - lo)).clamp(0.0, 1.0)),
        _ => None,
    };

    TrendBias { trend, last_swing_hi, last_swing_lo, last_bos_dir, pd_position }
}

pub fn is_discount(pd: Option<f64>) -> bool {
    pd.map(|p| p <= 0.5).unwrap_or(false)
}

pub fn is_premium(pd: Option<f64>) -> bool {
    pd.map(|p| p >= 0.5).unwrap_or(false)
}

/// A CHoCH is a BOS whose direction opposes the prevailing trend at that
/// candle and whose level breaches the protected swing: the last higher-low
/// for a bullish trend, the last lower-high for a bearish trend.
pub fn find_choch(bos_events: &[BosEvent], prevailing_trend: Trend, protected_swing: Option<f64>) -> Option<ChochEvent> {
    let protected = protected_swing?;
    let bos = bos_events.last()?;

    let opposes = match prevailing_trend {
        Trend::Bullish => bos.direction == TradeDirection::Sell && bos.level < protected,
        Trend::Bearish => bos.direction == TradeDirection::Buy && bos.level > protected,
        Trend::Sideways => false,
    };

    if !opposes {
        return None;
    }

    let to_trend = match bos.direction {
        TradeDirection::Buy => Trend::Bullish,
        TradeDirection::Sell => Trend::Bearish,
    };

    Some(ChochEvent { bos: *bos, from_trend: prevailing_trend, to_trend })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(close: f64) -> Candle {
        let now = Utc::now();
        Candle { open: close, high: close + 0.1, low: close - 0.1, close, volume: 1, start_time: now, end_time: now }
    }

    #[test]
    fn bos_fires_on_strict_close_beyond_swing() {
        let candles: Vec<Candle> = vec![10.0, 10.0, 10.0, 9.5, 10.2].into_iter().map(candle).collect();
        let swing = SwingPoint { index: 1, kind: SwingKind::High, price: 10.0 };
        let events = find_bos_events(&candles, &[swing], 5);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, TradeDirection::Buy);
        assert_eq!(events[0].index, 4);
    }

    #[test]
    fn trend_bias_sideways_when_no_two_swings() {
        let bias = trend_bias(&[], &[], 10.0);
        assert_eq!(bias.trend, Trend::Sideways);
        assert!(bias.pd_position.is_none());
    }

    #[test]
    fn pd_position_none_on_degenerate_range() {
        let swings = vec![
            SwingPoint { index: 0, kind: SwingKind::Low, price: 10.0 },
            SwingPoint { index: 1, kind: SwingKind::High, price: 10.0 },
        ];
        let bias = trend_bias(&swings, &[], 10.0);
        assert!(bias.pd_position.is_none());
    }

    #[test]
    fn choch_requires_opposite_direction_and_protected_breach() {
        let bos = BosEvent { index: 5, direction: TradeDirection::Sell, broken_swing_idx: 0, level: 9.0 };
        let choch = find_choch(&[bos], Trend::Bullish, Some(9.5));
        assert!(choch.is_some());
        assert_eq!(choch.unwrap().to_trend, Trend::Bearish);

        let no_breach = find_choch(&[bos], Trend::Bullish, Some(8.5));
        assert!(no_breach.is_none());
    }
}
