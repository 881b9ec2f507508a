/// Fair value gap detection and grading.
use crate::types::{Candle, FairValueGap, FvgGrade, Timeframe, TradeDirection};

/// Three-candle pattern: `candle[i-1].high < candle[i+1].low` is a bullish
/// gap (bought space between the two wicks price hasn't traded through);
/// `candle[i-1].low > candle[i+1].high` is the bearish inverse. Scans the
/// full slice and returns every gap found, oldest first.
pub fn find_fvgs(candles: &[Candle], tf: Timeframe, narrow_max_pips: f64, wide_min_pips: f64, pip_size: f64) -> Vec<FairValueGap> {
    let mut gaps = Vec::new();
    if candles.len() < 3 {
        return gaps;
    }

    for i in 1..candles.len() - 1 {
        let prev = &candles[i - 1];
        let next = &candles[i + 1];

        if prev.high < next.low {
            gaps.push(build_gap(tf, TradeDirection::Buy, next.low, prev.high, narrow_max_pips, wide_min_pips, pip_size));
        } else if prev.low > next.high {
            gaps.push(build_gap(tf, TradeDirection::Sell, prev.low, next.high, narrow_max_pips, wide_min_pips, pip_size));
        }
    }

    gaps
}

fn build_gap(
    tf: Timeframe,
    direction: TradeDirection,
    upper: f64,
    lower: f64,
    narrow_max_pips: f64,
    wide_min_pips: f64,
    pip_size: f64,
) -> FairValueGap {
    let width_pips = (upper - lower).abs() / pip_size;
    let grade = if width_pips <= narrow_max_pips {
        FvgGrade::Narrow
    } else if width_pips >= wide_min_pips {
        FvgGrade::Wide
    } else {
        FvgGrade::Medium
    };
    FairValueGap { tf, direction, upper, lower, grade }
}

/// A price touches an unfilled gap when it trades back into `[lower, upper]`.
pub fn gap_contains(gap: &FairValueGap, price: f64) -> bool {
    price >= gap.lower && price <= gap.upper
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
    fn detects_bullish_gap() {
        let candles = vec![candle(10.0, 9.0), candle(11.0, 10.5), candle(12.0, 10.2)];
        let gaps = find_fvgs(&candles, Timeframe::M15, 5.0, 15.0, 0.1);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, TradeDirection::Buy);
        assert_eq!(gaps[0].lower, 10.0);
        assert_eq!(gaps[0].upper, 10.2);
    }

    #[test]
    fn grades_by_width() {
        let candles = vec![candle(10.0, 9.0), candle(12.0, 11.5), candle(20.0, 13.0)];
        let gaps = find_fvgs(&candles, Timeframe::M15, 5.0, 15.0, 0.1);
        assert_eq!(gaps[0].grade, FvgGrade::Wide);
    }

    #[test]
    fn no_gap_when_overlapping() {
        let candles = vec![candle(10.0, 9.0), candle(10.5, 9.5), candle(10.2, 9.8)];
        assert!(find_fvgs(&candles, Timeframe::M15, 5.0, 15.0, 0.1).is_empty());
    }
}
