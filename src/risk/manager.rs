/// Risk sizing and per-trade admission: the `canTakeNewTrade` /
/// `positionSize` contract. Pure computation over a caller-supplied
/// snapshot — Risk does not own persistence or IO, it reads the tier/day
/// figures the pipeline has already gathered.
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, SymbolMetaConfig};
use crate::types::{GuardrailMode, StrategyTier};

#[derive(Debug, Clone)]
pub struct RiskContext {
    pub symbol: String,
    pub tier: StrategyTier,
    pub equity: f64,
    pub daily_pnl: f64,
    pub trades_today: u32,
    pub guardrail_mode: GuardrailMode,
}

#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub adjusted_risk_pct: Option<f64>,
}

impl RiskDecision {
    fn reject(reason: &str) -> Self {
        RiskDecision { allowed: false, reason: Some(reason.to_string()), adjusted_risk_pct: None }
    }
}

pub struct RiskManager {
    config: Arc<Config>,
}

impl RiskManager {
    pub fn new(config: Arc<Config>) -> Self {
        RiskManager { config }
    }

    fn tier_config(&self, tier: StrategyTier) -> Option<&crate::config::StrategyTierConfig> {
        self.config.strategy_tiers.get(tier.as_query_value())
    }

    pub fn can_take_new_trade(&self, ctx: &RiskContext) -> RiskDecision {
        if ctx.guardrail_mode == GuardrailMode::Blocked {
            return RiskDecision::reject("guardrail_blocked");
        }

        let Some(tier) = self.tier_config(ctx.tier) else {
            return RiskDecision::reject("unknown_strategy_tier");
        };

        if ctx.trades_today >= tier.max_trades_per_day {
            return RiskDecision::reject("max_trades_reached");
        }

        let loss_pct = if ctx.equity > 0.0 { (-ctx.daily_pnl / ctx.equity) * 100.0 } else { 0.0 };
        if ctx.daily_pnl < 0.0 && loss_pct >= tier.max_daily_loss_pct {
            return RiskDecision::reject("daily_loss_limit_reached");
        }

        let mut adjusted = self
            .config
            .symbol_execution
            .get(&ctx.symbol)
            .and_then(|e| e.risk_pct_override)
            .unwrap_or(tier.default_risk_pct);

        if ctx.guardrail_mode == GuardrailMode::Reduced {
            adjusted /= 2.0;
        }

        RiskDecision { allowed: true, reason: None, adjusted_risk_pct: Some(adjusted) }
    }

    /// `riskAmount = equity * adjustedPct/100`; `lot = riskAmount /
    /// (slDistance-in-pips * pipValuePerLot)`, clamped to `[minVolume,
    /// maxVolume]` and snapped down to the nearest `volumeStep`.
    pub fn position_size(&self, equity: f64, adjusted_risk_pct: f64, sl_distance: f64, meta: &SymbolMetaConfig) -> f64 {
        if sl_distance <= 0.0 || meta.pip_size <= 0.0 {
            return meta.min_volume;
        }

        let risk_amount = equity * adjusted_risk_pct / 100.0;
        let sl_pips = sl_distance / meta.pip_size;
        let raw_lot = risk_amount / (sl_pips * meta.pip_value_per_lot);

        let snapped = (raw_lot / meta.volume_step).floor() * meta.volume_step;
        let clamped = snapped.clamp(meta.min_volume, meta.max_volume);

        debug!(risk_amount, sl_pips, raw_lot, clamped, "position size computed");
        clamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, DatabaseConfig, GlobalLimitsConfig, GuardrailConfig, KillSwitchConfig, StrategyTierConfig};
    use std::collections::HashMap;

    fn test_config(tier_risk_pct: f64, max_trades: u32, max_daily_loss_pct: f64) -> Config {
        let mut tiers = HashMap::new();
        tiers.insert(
            "low".to_string(),
            StrategyTierConfig { max_daily_loss_pct, max_trades_per_day: max_trades, default_risk_pct: tier_risk_pct },
        );

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
            strategy_tiers: tiers,
            symbol_execution: HashMap::new(),
            global: GlobalLimitsConfig { max_concurrent_trades_global: 5, max_daily_risk_global: None },
            kill_switch: KillSwitchConfig {
                daily_max_loss_currency: 200.0,
                daily_max_loss_pct: 2.0,
                weekly_max_loss_currency: 600.0,
                weekly_max_loss_pct: 5.0,
                max_losing_streak: 3,
                max_daily_trades: 10,
                max_weekly_trades: 40,
                max_spread_points: 3.0,
                max_exposure_risk_currency: 1000.0,
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

    #[test]
    fn rejects_when_guardrail_blocked() {
        let rm = RiskManager::new(Arc::new(test_config(1.0, 10, 2.0)));
        let ctx = RiskContext {
            symbol: "XAUUSD".to_string(),
            tier: StrategyTier::Low,
            equity: 10_000.0,
            daily_pnl: 0.0,
            trades_today: 0,
            guardrail_mode: GuardrailMode::Blocked,
        };
        let decision = rm.can_take_new_trade(&ctx);
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("guardrail_blocked"));
    }

    #[test]
    fn halves_risk_pct_when_guardrail_reduced() {
        let rm = RiskManager::new(Arc::new(test_config(2.0, 10, 5.0)));
        let ctx = RiskContext {
            symbol: "XAUUSD".to_string(),
            tier: StrategyTier::Low,
            equity: 10_000.0,
            daily_pnl: 0.0,
            trades_today: 0,
            guardrail_mode: GuardrailMode::Reduced,
        };
        let decision = rm.can_take_new_trade(&ctx);
        assert!(decision.allowed);
        assert_eq!(decision.adjusted_risk_pct, Some(1.0));
    }

    #[test]
    fn rejects_at_max_trades_per_day() {
        let rm = RiskManager::new(Arc::new(test_config(1.0, 3, 5.0)));
        let ctx = RiskContext {
            symbol: "XAUUSD".to_string(),
            tier: StrategyTier::Low,
            equity: 10_000.0,
            daily_pnl: 0.0,
            trades_today: 3,
            guardrail_mode: GuardrailMode::Normal,
        };
        let decision = rm.can_take_new_trade(&ctx);
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("max_trades_reached"));
    }

    #[test]
    fn position_size_snaps_to_volume_step_and_clamps() {
        let rm = RiskManager::new(Arc::new(test_config(1.0, 10, 5.0)));
        let meta = SymbolMetaConfig {
            pip_size: 0.1,
            pip_value_per_lot: 10.0,
            contract_size: 100.0,
            volume_step: 0.01,
            min_volume: 0.01,
            max_volume: 5.0,
            min_risk_distance: 0.5,
        };
        let lot = rm.position_size(10_000.0, 1.0, 5.0, &meta);
        assert!(lot >= meta.min_volume && lot <= meta.max_volume);
    }
}
