/// Order block identification and mitigation.
use crate::types::{BosEvent, Candle, OrderBlock, Side, Timeframe, TradeDirection};

/// The OB for a BOS is the last opposite-color candle immediately preceding
/// the impulse leg. A bullish BOS (break above a swing high) looks back for
/// the last bearish candle before the impulse; bearish BOS symmetric.
pub fn identify_order_block(candles: &[Candle], bos: &BosEvent, tf: Timeframe) -> Option<OrderBlock> {
    let impulse_start = bos.broken_swing_idx_hint(candles.len())?;
    let want_bearish = bos.direction == TradeDirection::Buy;

    for i in (0..impulse_start).rev() {
        let c = &candles[i];
        let is_bearish = !c.is_bullish();
        if is_bearish == want_bearish {
            let side = if want_bearish { Side::Bullish } else { Side::Bearish };
            return Some(OrderBlock { tf, side, high: c.high, low: c.low, created_at: c.start_time, mitigated: false });
        }
    }

    None
}

/// Mitigation: a later close crosses the order block's far edge (the low
/// for a bullish OB, the high for a bearish one).
pub fn mitigate(ob: &mut OrderBlock, candles_after: &[Candle]) {
    let far_edge_breached = candles_after.iter().any(|c| match ob.side {
        Side::Bullish => c.close < ob.low,
        Side::Bearish => c.close > ob.high,
    });
    if far_edge_breached {
        ob.mitigated = true;
    }
}

trait ImpulseHint {
    fn broken_swing_idx_hint(&self, candle_count: usize) -> Option<usize>;
}

impl ImpulseHint for BosEvent {
    fn broken_swing_idx_hint(&self, candle_count: usize) -> Option<usize> {
        if self.index < candle_count {
            Some(self.index)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, close: f64) -> Candle {
        let now = Utc::now();
        Candle { open, high: open.max(close) + 0.1, low: open.min(close) - 0.1, close, volume: 1, start_time: now, end_time: now }
    }

    #[test]
    fn bullish_bos_looks_back_for_last_bearish_candle() {
        let candles = vec![
            candle(10.0, 9.5),
            candle(9.5, 9.3),
            candle(9.3, 10.5),
            candle(10.5, 11.0),
        ];
        let bos = BosEvent { index: 3, direction: TradeDirection::Buy, broken_swing_idx: 0, level: 10.0 };
        let ob = identify_order_block(&candles, &bos, Timeframe::M15).unwrap();
        assert_eq!(ob.side, Side::Bullish);
        assert_eq!(ob.low, 9.2);
    }

    #[test]
    fn mitigation_flags_on_far_edge_close_cross() {
        let mut ob = OrderBlock { tf: Timeframe::M15, side: Side::Bullish, high: 10.0, low: 9.0, created_at: Utc::now(), mitigated: false };
        let after = vec![candle(9.5, 9.2), candle(9.2, 8.8)];
        mitigate(&mut ob, &after);
        assert!(ob.mitigated);
    }

    #[test]
    fn no_mitigation_while_far_edge_holds() {
        let mut ob = OrderBlock { tf: Timeframe::M15, side: Side::Bullish, high: 10.0, low: 9.0, created_at: Utc::now(), mitigated: false };
        let after = vec![candle(9.5, 9.3)];
        mitigate(&mut ob, &after);
        assert!(!ob.mitigated);
    }
}
