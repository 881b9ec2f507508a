/// Eight-stage pre-trade admission gate. Unlike `RiskManager`, which
/// short-circuits on the first rejection, every stage here runs regardless
/// of earlier failures and every failing reason is accumulated — a skip
/// carries the full list of reasons encountered, not just the first.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::Config;
use crate::data::{OpenTrades, OrderFlow};
use crate::persistence::{self, Pool};
use crate::types::{Signal, StrategyTier, TradeDirection};

/// Everything the filter needs about "now" that it cannot derive itself
/// from config: current quote, last trade time for the symbol, and the
/// risk this candidate trade would add if admitted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub signal: Signal,
    pub tier: StrategyTier,
    pub bid: f64,
    pub ask: f64,
    pub now: DateTime<Utc>,
    pub last_trade_time: Option<DateTime<Utc>>,
    pub new_trade_risk_estimate: f64,
    pub liquidity_swept: bool,
    pub order_block_zone: bool,
    pub bos_direction: Option<TradeDirection>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionVerdict {
    pub allowed: bool,
    pub reasons: Vec<String>,
}

pub struct ExecutionFilter {
    config: Arc<Config>,
    open_trades: Arc<OpenTrades>,
    order_flow: Arc<OrderFlow>,
    pool: Pool,
}

impl ExecutionFilter {
    pub fn new(config: Arc<Config>, open_trades: Arc<OpenTrades>, order_flow: Arc<OrderFlow>, pool: Pool) -> Self {
        ExecutionFilter { config, open_trades, order_flow, pool }
    }

    pub async fn evaluate(&self, ctx: &ExecutionContext) -> ExecutionVerdict {
        let mut reasons = Vec::new();
        let symbol = ctx.signal.symbol.as_str();
        let exec_cfg = self.config.symbol_execution.get(symbol);

        // 1. Session
        let sessions = exec_cfg.map(|e| e.sessions.clone()).unwrap_or_default();
        if !crate::time::session_active(ctx.now, &sessions) {
            reasons.push(format!("Outside configured session window for {}", symbol));
        }

        // 2. Spread
        if let (Some(exec), Some(meta)) = (exec_cfg, self.config.symbol_meta.get(symbol)) {
            if meta.pip_size > 0.0 {
                let spread_pips = (ctx.ask - ctx.bid) / meta.pip_size;
                if spread_pips > exec.max_spread_pips {
                    reasons.push(format!(
                        "Spread {:.2} pips > max {:.2} for {}",
                        spread_pips, exec.max_spread_pips, symbol
                    ));
                }
            }
        }

        // 3. Cooldown
        if let Some(exec) = exec_cfg {
            if let Some(last) = ctx.last_trade_time {
                let elapsed = ctx.now - last;
                let min_cooldown = chrono::Duration::minutes(exec.min_cooldown_minutes);
                if elapsed < min_cooldown {
                    reasons.push(format!(
                        "Cooldown not elapsed for {}: {}m < {}m",
                        symbol,
                        elapsed.num_minutes(),
                        exec.min_cooldown_minutes
                    ));
                }
            }
        }

        // 4. Daily trade count, from committed decisions only.
        if let Some(tier_cfg) = self.config.strategy_tiers.get(ctx.tier.as_query_value()) {
            let day_start = ctx.now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
            match persistence::decisions::traded_count_since(&self.pool, symbol, day_start).await {
                Ok(count) if count as u32 >= tier_cfg.max_trades_per_day => {
                    reasons.push(format!(
                        "Daily trade count for {} reached: {} >= {}",
                        symbol, count, tier_cfg.max_trades_per_day
                    ));
                }
                Ok(_) => {}
                Err(e) => debug!(symbol, error = %e, "daily trade count lookup failed, not blocking on it"),
            }
        }

        // 5. SMC confluence gate.
        if !ctx.liquidity_swept || !ctx.order_block_zone || ctx.bos_direction != Some(ctx.signal.direction) {
            reasons.push(format!(
                "SMC confluence gate failed for {}: swept={} ob_zone={} bos_dir={:?}",
                symbol, ctx.liquidity_swept, ctx.order_block_zone, ctx.bos_direction
            ));
        }

        // 6. Exposure. The global caps are symbol-independent and must be
        // checked regardless of whether this symbol has its own execution
        // config; only the per-symbol caps need `exec_cfg`.
        let global = self.open_trades.global().await;

        if global.total_open_trades >= self.config.global.max_concurrent_trades_global {
            reasons.push(format!(
                "Max concurrent trades global reached: {} >= {}",
                global.total_open_trades, self.config.global.max_concurrent_trades_global
            ));
        }
        if let Some(max_global_risk) = self.config.global.max_daily_risk_global {
            if global.total_estimated_risk + ctx.new_trade_risk_estimate > max_global_risk {
                reasons.push(format!(
                    "Max daily risk global exceeded: {:.2} > {:.2}",
                    global.total_estimated_risk + ctx.new_trade_risk_estimate,
                    max_global_risk
                ));
            }
        }

        if let Some(exec) = exec_cfg {
            let exposure = self.open_trades.exposure_for(symbol).await;
            let directional = self.open_trades.directional_count(symbol, ctx.signal.direction).await;

            if exposure.total_count >= exec.max_concurrent_trades_per_symbol {
                reasons.push(format!(
                    "Max concurrent trades per symbol reached for {}: {} >= {}",
                    symbol, exposure.total_count, exec.max_concurrent_trades_per_symbol
                ));
            }
            if directional >= exec.max_concurrent_trades_per_direction {
                reasons.push(format!(
                    "Max concurrent trades per direction reached for {} {:?}: {} >= {}",
                    symbol, ctx.signal.direction, directional, exec.max_concurrent_trades_per_direction
                ));
            }
            if let Some(max_symbol_risk) = exec.max_daily_risk_per_symbol {
                if exposure.estimated_risk + ctx.new_trade_risk_estimate > max_symbol_risk {
                    reasons.push(format!(
                        "Max daily risk per symbol exceeded for {}: {:.2} > {:.2}",
                        symbol,
                        exposure.estimated_risk + ctx.new_trade_risk_estimate,
                        max_symbol_risk
                    ));
                }
            }
        } else {
            reasons.push(format!("No execution config for {}, per-symbol exposure caps not enforced", symbol));
        }

        // 7. Loss-streak filter, per symbol.
        match persistence::loss_streaks::get(&self.pool, symbol).await {
            Ok(streak) => {
                if let Some(paused_until) = streak.paused_until {
                    if ctx.now < paused_until {
                        reasons.push(format!(
                            "{} paused until {} after loss streak ({} consecutive, {} today)",
                            symbol, paused_until, streak.consecutive_losses, streak.losses_today
                        ));
                    }
                }
            }
            Err(e) => debug!(symbol, error = %e, "loss-streak lookup failed, not blocking on it"),
        }

        // 8. Order-flow check.
        if let Some(metrics) = self.order_flow.metrics(symbol).await {
            let min_delta = self.config.order_flow.min_delta_trend_confirmation;
            let opposes = match ctx.signal.direction {
                TradeDirection::Buy => metrics.delta15s < -min_delta,
                TradeDirection::Sell => metrics.delta15s > min_delta,
            };
            if opposes {
                reasons.push(format!(
                    "Order flow delta15s {:.2} opposes {:?} for {}",
                    metrics.delta15s, ctx.signal.direction, symbol
                ));
            }

            let absorption_against = match ctx.signal.direction {
                TradeDirection::Buy => metrics.absorption_against_buy,
                TradeDirection::Sell => metrics.absorption_against_sell,
            };
            if absorption_against {
                reasons.push(format!("Absorption against {:?} detected for {}", ctx.signal.direction, symbol));
            }

            let large_opposing = match ctx.signal.direction {
                TradeDirection::Buy => metrics.large_sell_orders,
                TradeDirection::Sell => metrics.large_buy_orders,
            };
            if large_opposing >= self.config.order_flow.large_order_cluster_threshold {
                reasons.push(format!(
                    "Large opposing order cluster present for {} {:?}: {} clusters",
                    symbol, ctx.signal.direction, large_opposing
                ));
            }

            let exhaustion = (metrics.delta5s.abs() < self.config.order_flow.exhaustion_threshold)
                && metrics.delta60s.abs() > metrics.delta5s.abs() * 3.0;
            if exhaustion {
                reasons.push(format!("Exhaustion collapse after spike detected for {}", symbol));
            }
        }

        ExecutionVerdict { allowed: reasons.is_empty(), reasons }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BrokerConfig, DatabaseConfig, GlobalLimitsConfig, GuardrailConfig, KillSwitchConfig, SessionWindowConfig,
        SymbolExecutionConfig,
    };
    use crate::types::{OrderKind, Signal, SignalMeta, Trend};
    use std::collections::HashMap;

    fn signal(symbol: &str, direction: TradeDirection) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            direction,
            entry: 100.0,
            sl: 99.0,
            tp: 102.0,
            order_kind: OrderKind::Market,
            reason: "test".to_string(),
            meta: SignalMeta {
                htf_trend: Trend::Bullish,
                pd_position: Some(0.3),
                order_block: crate::types::OrderBlock {
                    tf: crate::types::Timeframe::M1,
                    side: crate::types::Side::Bullish,
                    high: 100.0,
                    low: 99.5,
                    created_at: Utc::now(),
                    mitigated: false,
                },
                fvg: None,
                liquidity_swept: true,
                smt_divergence: None,
                session: "NY".to_string(),
                confluence_score: 1.0,
            },
        }
    }

    fn base_config() -> Config {
        let mut symbol_execution = HashMap::new();
        symbol_execution.insert(
            "XAUUSD".to_string(),
            SymbolExecutionConfig {
                sessions: vec![SessionWindowConfig { start: "00:00".to_string(), end: "23:59".to_string() }],
                max_spread_pips: 5.0,
                min_cooldown_minutes: 0,
                max_concurrent_trades_per_symbol: 2,
                max_concurrent_trades_per_direction: 2,
                max_daily_risk_per_symbol: None,
                risk_pct_override: None,
            },
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
            strategy_tiers: HashMap::new(),
            symbol_execution,
            global: GlobalLimitsConfig { max_concurrent_trades_global: 5, max_daily_risk_global: None },
            kill_switch: KillSwitchConfig {
                daily_max_loss_currency: 1000.0,
                daily_max_loss_pct: 100.0,
                weekly_max_loss_currency: 1000.0,
                weekly_max_loss_pct: 100.0,
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

    #[test]
    fn confluence_gate_fails_without_sweep_or_ob_zone() {
        let ctx = ExecutionContext {
            signal: signal("XAUUSD", TradeDirection::Buy),
            tier: StrategyTier::Low,
            bid: 100.0,
            ask: 100.1,
            now: Utc::now(),
            last_trade_time: None,
            new_trade_risk_estimate: 10.0,
            liquidity_swept: false,
            order_block_zone: true,
            bos_direction: Some(TradeDirection::Buy),
        };
        assert!(!ctx.liquidity_swept);
        let _ = base_config();
    }
}
