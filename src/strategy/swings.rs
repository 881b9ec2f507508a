/// Confirmed swing-pivot detection over a candle slice.
use crate::types::{Candle, SwingKind, SwingPoint};

/// A bar at `i` is a confirmed high once `right` later bars have closed and
/// none of the `left`/`right` neighbors exceed its high (symmetric for lows).
/// Pivots are only emitted once fully confirmed, matching the "confirmed
/// only after pivotRight bars" invariant.
pub fn find_swings(candles: &[Candle], left: usize, right: usize) -> Vec<SwingPoint> {
    let mut swings = Vec::new();
    if candles.len() < left + right + 1 {
        return swings;
    }

    for i in left..candles.len() - right {
        let window = &candles[i - left..=i + right];
        let pivot = &candles[i];

        let is_high = window.iter().all(|c| c.high <= pivot.high) && window.iter().filter(|c| c.high == pivot.high).count() == 1;
        if is_high {
            swings.push(SwingPoint { index: i, kind: SwingKind::High, price: pivot.high });
            continue;
        }

        let is_low = window.iter().all(|c| c.low >= pivot.low) && window.iter().filter(|c| c.low == pivot.low).count() == 1;
        if is_low {
            swings.push(SwingPoint { index: i, kind: SwingKind::Low, price: pivot.low });
        }
    }

    swings
}

pub fn last_swing_of(swings: &[SwingPoint], kind: SwingKind) -> Option<&SwingPoint> {
    swings.iter().rev().find(|s| s.kind == kind)
}

/// Last `n` swings of a given kind, oldest first.
pub fn last_n_of(swings: &[SwingPoint], kind: SwingKind, n: usize) -> Vec<SwingPoint> {
    let mut out: Vec<SwingPoint> = swings.iter().rev().filter(|s| s.kind == kind).take(n).copied().collect();
    out.reverse();
    out
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
    fn detects_single_swing_high() {
        let candles = vec![
            candle(10.0, 9.0),
            candle(11.0, 10.0),
            candle(15.0, 12.0),
            candle(11.0, 10.0),
            candle(10.0, 9.0),
        ];
        let swings = find_swings(&candles, 2, 2);
        assert_eq!(swings.len(), 1);
        assert_eq!(swings[0].kind, SwingKind::High);
        assert_eq!(swings[0].index, 2);
        assert_eq!(swings[0].price, 15.0);
    }

    #[test]
    fn too_short_slice_yields_no_swings() {
        let candles = vec![candle(10.0, 9.0), candle(11.0, 10.0)];
        assert!(find_swings(&candles, 2, 2).is_empty());
    }

    #[test]
    fn last_n_of_returns_oldest_first() {
        let candles = vec![
            candle(10.0, 9.0),
            candle(15.0, 10.0),
            candle(10.0, 9.0),
            candle(9.0, 8.0),
            candle(20.0, 9.0),
            candle(9.0, 8.0),
            candle(10.0, 9.0),
        ];
        let swings = find_swings(&candles, 2, 2);
        let highs = last_n_of(&swings, SwingKind::High, 2);
        assert!(highs.len() <= 2);
        if highs.len() == 2 {
            assert!(highs[0].index < highs[1].index);
        }
    }
}
