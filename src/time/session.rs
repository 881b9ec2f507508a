/// Trading-session window checks: configured sessions are `"HH:MM"-"HH:MM"`
/// windows in UTC, not tied to any particular exchange's local time.
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::config::SessionWindowConfig;

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

/// Weekday in UTC, Saturday/Sunday excluded. FX-style venues trade Mon-Fri;
/// this is a coarse gate, not a holiday calendar.
pub fn is_trading_day(ts: DateTime<Utc>) -> bool {
    ts.weekday().num_days_from_monday() < 5
}

/// True if `ts`'s UTC time-of-day falls within `[start, end)`. A window
/// where `end < start` is treated as wrapping past midnight.
pub fn within_window(ts: DateTime<Utc>, window: &SessionWindowConfig) -> bool {
    let Some((sh, sm)) = parse_hhmm(&window.start) else { return false };
    let Some((eh, em)) = parse_hhmm(&window.end) else { return false };

    let minute_of_day = ts.hour() * 60 + ts.minute();
    let start_min = sh * 60 + sm;
    let end_min = eh * 60 + em;

    if start_min <= end_min {
        minute_of_day >= start_min && minute_of_day < end_min
    } else {
        minute_of_day >= start_min || minute_of_day < end_min
    }
}

/// A symbol with no configured sessions is treated as always-on.
pub fn session_active(ts: DateTime<Utc>, windows: &[SessionWindowConfig]) -> bool {
    if !is_trading_day(ts) {
        return false;
    }
    if windows.is_empty() {
        return true;
    }
    windows.iter().any(|w| within_window(ts, w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window(start: &str, end: &str) -> SessionWindowConfig {
        SessionWindowConfig { start: start.to_string(), end: end.to_string() }
    }

    #[test]
    fn within_simple_window() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 10, 30, 0).unwrap(); // Tuesday
        assert!(session_active(ts, &[window("08:00", "16:00")]));
        assert!(!session_active(ts, &[window("17:00", "23:00")]));
    }

    #[test]
    fn wrapping_window_crosses_midnight() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 23, 30, 0).unwrap(); // Tuesday
        assert!(session_active(ts, &[window("22:00", "02:00")]));
    }

    #[test]
    fn weekend_always_closed() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(); // Saturday
        assert!(!session_active(ts, &[window("00:00", "23:59")]));
    }

    #[test]
    fn empty_windows_means_always_on_weekday() {
        let ts = Utc.with_ymd_and_hms(2026, 7, 28, 3, 0, 0).unwrap();
        assert!(session_active(ts, &[]));
    }
}
