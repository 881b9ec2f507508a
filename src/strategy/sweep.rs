/// Liquidity sweep detection: price wicks beyond a prior swing and closes
/// back on the defended side, before the BOS that follows it.
use crate::types::{Candle, SwingKind, SwingPoint, TradeDirection};

pub fn swept_before_bos(candles: &[Candle], swings: &[SwingPoint], bos_index: usize, lookback: usize, direction: TradeDirection) -> bool {
    let scan_start = bos_index.saturating_sub(lookback);
    let window = &candles[scan_start..bos_index.min(candles.len())];

    let target_kind = match direction {
        TradeDirection::Buy => SwingKind::Low,
        TradeDirection::Sell => SwingKind::High,
    };

    let prior_swing = swings
        .iter()
        .rev()
        .find(|s| s.kind == target_kind && s.index < bos_index)
        .map(|s| s.price);

    let Some(level) = prior_swing else {
        return false;
    };

    window.iter().any(|c| match direction {
        TradeDirection::Buy => c.low < level && c.close > level,
        TradeDirection::Sell => c.high > level && c.close < level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(close: f64, high: f64, low: f64) -> Candle {
        let now = Utc::now();
        Candle { open: close, high, low, close, volume: 1, start_time: now, end_time: now }
    }

    #[test]
    fn detects_bullish_sweep_before_bos() {
        let swings = vec![SwingPoint { index: 0, kind: SwingKind::Low, price: 10.0 }];
        let candles = vec![
            candle(10.2, 10.3, 9.9),
            candle(10.5, 10.6, 10.4),
            candle(11.0, 11.1, 10.0),
        ];
        assert!(swept_before_bos(&candles, &swings, 2, 5, TradeDirection::Buy));
    }

    #[test]
    fn no_sweep_without_wick_below_prior_low() {
        let swings = vec![SwingPoint { index: 0, kind: SwingKind::Low, price: 9.0 }];
        let candles = vec![candle(10.2, 10.3, 9.9), candle(10.5, 10.6, 10.4)];
        assert!(!swept_before_bos(&candles, &swings, 2, 5, TradeDirection::Buy));
    }
}
