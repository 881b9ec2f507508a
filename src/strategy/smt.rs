/// SMT (smart money divergence) between a symbol and its configured
/// correlated pair: one asset prints a new extreme that the other fails to
/// confirm. Optional confluence signal, never a hard gate unless configured.
use crate::types::{Candle, TradeDirection};

pub fn divergence_present(primary: &[Candle], correlated: &[Candle], direction: TradeDirection, lookback: usize) -> Option<bool> {
    if primary.len() < lookback || correlated.len() < lookback {
        return None;
    }

    let p = &primary[primary.len() - lookback..];
    let c = &correlated[correlated.len() - lookback..];

    let present = match direction {
        TradeDirection::Buy => {
            let primary_new_low = p.last().unwrap().low <= p.iter().map(|x| x.low).fold(f64::INFINITY, f64::min);
            let correlated_new_low = c.last().unwrap().low <= c.iter().map(|x| x.low).fold(f64::INFINITY, f64::min);
            primary_new_low && !correlated_new_low
        }
        TradeDirection::Sell => {
            let primary_new_high = p.last().unwrap().high >= p.iter().map(|x| x.high).fold(f64::NEG_INFINITY, f64::max);
            let correlated_new_high = c.last().unwrap().high >= c.iter().map(|x| x.high).fold(f64::NEG_INFINITY, f64::max);
            primary_new_high && !correlated_new_high
        }
    };

    Some(present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(high: f64, low: f64) -> Candle {
        let now = Utc::now();
        Candle { open: (high + low) / 2.0, high, low, close: (high + low) / 2.0, volume: 1, start_time: now, end_time: now }
    }

    #[test]
    fn detects_bullish_divergence() {
        let primary = vec![candle(10.0, 9.0), candle(10.0, 8.5), candle(10.0, 8.0)];
        let correlated = vec![candle(10.0, 7.0), candle(10.0, 7.5), candle(10.0, 7.2)];
        assert_eq!(divergence_present(&primary, &correlated, TradeDirection::Buy, 3), Some(true));
    }

    #[test]
    fn none_when_insufficient_history() {
        let primary = vec![candle(10.0, 9.0)];
        let correlated = vec![candle(10.0, 9.0)];
        assert_eq!(divergence_present(&primary, &correlated, TradeDirection::Buy, 3), None);
    }
}
