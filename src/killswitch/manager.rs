/// Global (per-account) circuit breaker. Evaluated at each decision tick
/// against a caller-supplied snapshot; state is in-memory, transitions are
/// persisted as events by the caller so a restart can reconstruct history.
use std::sync::Arc;
use chrono::{DateTime, Datelike, IsoWeek, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::Config;
use crate::types::{KillSwitchState, LiveTrade};

#[derive(Debug, Clone)]
pub struct KillSwitchContext {
    pub daily_pnl: f64,
    pub weekly_pnl: f64,
    pub day_start_equity: f64,
    pub week_start_equity: f64,
    /// Tail of recent trades, oldest first.
    pub recent_trades: Vec<LiveTrade>,
    pub daily_trade_count: u32,
    pub weekly_trade_count: u32,
    pub current_spread_points: f64,
    pub global_estimated_risk: f64,
    pub now: DateTime<Utc>,
}

/// A state transition the caller should persist (and, if becoming active,
/// react to by force-closing positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    BecameActive,
    BecameInactive,
}

pub struct KillSwitch {
    config: Arc<Config>,
    state: RwLock<KillSwitchState>,
    last_reset_day: RwLock<Option<chrono::NaiveDate>>,
    last_reset_week: RwLock<Option<IsoWeek>>,
}

impl KillSwitch {
    pub fn new(config: Arc<Config>) -> Self {
        KillSwitch {
            config,
            state: RwLock::new(KillSwitchState::default()),
            last_reset_day: RwLock::new(None),
            last_reset_week: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> KillSwitchState {
        self.state.read().await.clone()
    }

    fn consecutive_losses(recent_trades: &[LiveTrade]) -> u32 {
        recent_trades.iter().rev().take_while(|t| !t.is_win()).count() as u32
    }

    pub async fn evaluate(&self, ctx: &KillSwitchContext) -> Transition {
        let ks = &self.config.kill_switch;

        // Auto-resume: a new local day/week always takes priority over any
        // condition re-tripping it within the same evaluation, matching the
        // "first evaluation whose local day/week differs" rule.
        let today = ctx.now.date_naive();
        let this_week = ctx.now.iso_week();

        let day_rolled = {
            let mut last = self.last_reset_day.write().await;
            let rolled = ks.auto_resume_next_day && *last != Some(today);
            *last = Some(today);
            rolled
        };
        let week_rolled = {
            let mut last = self.last_reset_week.write().await;
            let rolled = ks.auto_resume_next_week && *last != Some(this_week);
            *last = Some(this_week);
            rolled
        };

        let was_active = self.state.read().await.active;

        if was_active && (day_rolled || week_rolled) {
            let reason = if day_rolled { "new day" } else { "new week" };
            let mut state = self.state.write().await;
            state.active = false;
            state.reasons = vec![format!("auto-resume: {}", reason)];
            state.activated_at = None;
            return Transition::BecameInactive;
        }

        let mut reasons = Vec::new();

        if ctx.daily_pnl <= -ks.daily_max_loss_currency {
            reasons.push(format!("daily_pnl {:.2} <= -{:.2} currency", ctx.daily_pnl, ks.daily_max_loss_currency));
        }
        if ctx.day_start_equity > 0.0 {
            let pct = (-ctx.daily_pnl / ctx.day_start_equity) * 100.0;
            if ctx.daily_pnl < 0.0 && pct >= ks.daily_max_loss_pct {
                reasons.push(format!("daily_pnl {:.2}% >= {:.2}% cap", pct, ks.daily_max_loss_pct));
            }
        }
        if ctx.weekly_pnl <= -ks.weekly_max_loss_currency {
            reasons.push(format!("weekly_pnl {:.2} <= -{:.2} currency", ctx.weekly_pnl, ks.weekly_max_loss_currency));
        }
        if ctx.week_start_equity > 0.0 {
            let pct = (-ctx.weekly_pnl / ctx.week_start_equity) * 100.0;
            if ctx.weekly_pnl < 0.0 && pct >= ks.weekly_max_loss_pct {
                reasons.push(format!("weekly_pnl {:.2}% >= {:.2}% cap", pct, ks.weekly_max_loss_pct));
            }
        }

        let streak = Self::consecutive_losses(&ctx.recent_trades);
        if streak >= ks.max_losing_streak {
            reasons.push(format!("losing streak {} >= {}", streak, ks.max_losing_streak));
        }

        if ctx.daily_trade_count >= ks.max_daily_trades {
            reasons.push(format!("daily trades {} >= {}", ctx.daily_trade_count, ks.max_daily_trades));
        }
        if ctx.weekly_trade_count >= ks.max_weekly_trades {
            reasons.push(format!("weekly trades {} >= {}", ctx.weekly_trade_count, ks.max_weekly_trades));
        }

        if ctx.current_spread_points > ks.max_spread_points {
            reasons.push(format!("spread {:.2} > {:.2}", ctx.current_spread_points, ks.max_spread_points));
        }

        if ctx.global_estimated_risk > ks.max_exposure_risk_currency {
            reasons.push(format!("global risk {:.2} > {:.2}", ctx.global_estimated_risk, ks.max_exposure_risk_currency));
        }

        let should_be_active = !reasons.is_empty();

        if should_be_active && !was_active {
            warn!(reasons = ?reasons, "kill switch activated");
            let mut state = self.state.write().await;
            state.active = true;
            state.reasons = reasons;
            state.activated_at = Some(ctx.now);
            Transition::BecameActive
        } else if should_be_active && was_active {
            let mut state = self.state.write().await;
            state.reasons = reasons;
            Transition::None
        } else {
            Transition::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, DatabaseConfig, GlobalLimitsConfig, GuardrailConfig, KillSwitchConfig};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn config_with(daily_max_loss_currency: f64) -> Config {
        Config {
            tick_interval_sec: 60,
            market_feed_interval_sec: 1,
            historical_backfill_days: 90,
            max_candles_per_symbol: 10_000,
            exposure_poll_interval_sec: 10,
            exit_tick_interval_sec: 2,
            broker: BrokerConfig { base_url: "http://x".to_string(), timeout_secs: 8 },
            guardrail: GuardrailConfig { base_url: "http://y".to_string(), timeout_secs: 8 },
            database: DatabaseConfig { url: "postgres://x".to_string(), max_connections: 10 },
            symbols: vec!["XAUUSD".to_string()],
            strategy_tiers: HashMap::new(),
            symbol_execution: HashMap::new(),
            global: GlobalLimitsConfig { max_concurrent_trades_global: 5, max_daily_risk_global: None },
            kill_switch: KillSwitchConfig {
                daily_max_loss_currency,
                daily_max_loss_pct: 1000.0,
                weekly_max_loss_currency: 100_000.0,
                weekly_max_loss_pct: 1000.0,
                max_losing_streak: 100,
                max_daily_trades: 1000,
                max_weekly_trades: 1000,
                max_spread_points: 1000.0,
                max_exposure_risk_currency: 1_000_000.0,
                auto_resume_next_day: true,
                auto_resume_next_week: true,
                timezone: "America/New_York".to_string(),
            },
            exit: Default::default(),
            order_flow: Default::default(),
            loss_streak: Default::default(),
            accounts: vec![],
            display_timezone: "America/New_York".to_string(),
            smc: Default::default(),
            symbol_meta: HashMap::new(),
            webhook_port: 8090,
            event_log_path: "events.jsonl".to_string(),
        }
    }

    fn ctx(now: DateTime<Utc>, daily_pnl: f64) -> KillSwitchContext {
        KillSwitchContext {
            daily_pnl,
            weekly_pnl: 0.0,
            day_start_equity: 10_000.0,
            week_start_equity: 10_000.0,
            recent_trades: vec![],
            daily_trade_count: 0,
            weekly_trade_count: 0,
            current_spread_points: 0.0,
            global_estimated_risk: 0.0,
            now,
        }
    }

    #[tokio::test]
    async fn activates_on_daily_loss_breach() {
        let ks = KillSwitch::new(Arc::new(config_with(100.0)));
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let transition = ks.evaluate(&ctx(now, -150.0)).await;
        assert_eq!(transition, Transition::BecameActive);
        assert!(ks.state().await.active);
    }

    #[tokio::test]
    async fn auto_resumes_on_new_day() {
        let ks = KillSwitch::new(Arc::new(config_with(100.0)));
        let day1 = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        ks.evaluate(&ctx(day1, -150.0)).await;
        assert!(ks.state().await.active);

        let day2 = Utc.with_ymd_and_hms(2026, 7, 29, 0, 1, 0).unwrap();
        let transition = ks.evaluate(&ctx(day2, 0.0)).await;
        assert_eq!(transition, Transition::BecameInactive);
        assert!(!ks.state().await.active);
    }

    #[tokio::test]
    async fn stays_inactive_when_no_condition_trips() {
        let ks = KillSwitch::new(Arc::new(config_with(1000.0)));
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let transition = ks.evaluate(&ctx(now, -10.0)).await;
        assert_eq!(transition, Transition::None);
        assert!(!ks.state().await.active);
    }
}
