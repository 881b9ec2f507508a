/// Recognized configuration schema for the trading core.
///
/// Unknown top-level keys are rejected at parse time (`deny_unknown_fields`);
/// an unrecognized key is a `fatal_startup` error per the design notes.
pub mod loader;

use serde::Deserialize;
use std::collections::HashMap;

pub use loader::load_config;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_tick_interval_sec")]
    pub tick_interval_sec: u64,

    #[serde(default = "default_market_feed_interval_sec")]
    pub market_feed_interval_sec: u64,

    #[serde(default = "default_historical_backfill_days")]
    pub historical_backfill_days: u32,

    #[serde(default = "default_max_candles_per_symbol")]
    pub max_candles_per_symbol: usize,

    #[serde(default = "default_exposure_poll_interval_sec")]
    pub exposure_poll_interval_sec: u64,

    #[serde(default = "default_exit_tick_interval_sec")]
    pub exit_tick_interval_sec: u64,

    pub broker: BrokerConfig,
    pub guardrail: GuardrailConfig,
    pub database: DatabaseConfig,

    pub symbols: Vec<String>,

    #[serde(default)]
    pub strategy_tiers: HashMap<String, StrategyTierConfig>,

    #[serde(default)]
    pub symbol_execution: HashMap<String, SymbolExecutionConfig>,

    pub global: GlobalLimitsConfig,

    pub kill_switch: KillSwitchConfig,

    #[serde(default)]
    pub exit: ExitConfig,

    #[serde(default)]
    pub order_flow: OrderFlowConfig,

    #[serde(default)]
    pub loss_streak: LossStreakConfig,

    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,

    #[serde(default)]
    pub smc: SmcConfig,

    #[serde(default)]
    pub symbol_meta: HashMap<String, SymbolMetaConfig>,

    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,

    #[serde(default = "default_event_log_path")]
    pub event_log_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SmcConfig {
    pub htf_timeframe: String,
    pub min_htf_candles: usize,
    pub min_itf_candles: usize,
    pub min_ltf_candles: usize,
    pub htf_pivot: usize,
    pub itf_pivot: usize,
    pub ltf_pivot: usize,
    pub bos_lookback: usize,
    pub sweep_lookback: usize,
    pub fvg_narrow_max_pips: f64,
    pub fvg_wide_min_pips: f64,
    pub ob_buffer_pips: f64,
    #[serde(default)]
    pub smt_pairs: HashMap<String, String>,
    pub require_smt: bool,
    pub min_confluence_score: f64,
}

impl Default for SmcConfig {
    fn default() -> Self {
        SmcConfig {
            htf_timeframe: "H4".to_string(),
            min_htf_candles: 50,
            min_itf_candles: 40,
            min_ltf_candles: 20,
            htf_pivot: 5,
            itf_pivot: 3,
            ltf_pivot: 2,
            bos_lookback: 30,
            sweep_lookback: 15,
            fvg_narrow_max_pips: 5.0,
            fvg_wide_min_pips: 15.0,
            ob_buffer_pips: 2.0,
            smt_pairs: HashMap::new(),
            require_smt: false,
            min_confluence_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolMetaConfig {
    pub pip_size: f64,
    pub pip_value_per_lot: f64,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
    pub volume_step: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub min_risk_distance: f64,
}

fn default_contract_size() -> f64 {
    100_000.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardrailConfig {
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyTierConfig {
    pub max_daily_loss_pct: f64,
    pub max_trades_per_day: u32,
    pub default_risk_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolExecutionConfig {
    #[serde(default)]
    pub sessions: Vec<SessionWindowConfig>,
    pub max_spread_pips: f64,
    pub min_cooldown_minutes: i64,
    pub max_concurrent_trades_per_symbol: u32,
    pub max_concurrent_trades_per_direction: u32,
    #[serde(default)]
    pub max_daily_risk_per_symbol: Option<f64>,
    #[serde(default)]
    pub risk_pct_override: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionWindowConfig {
    /// `"HH:MM"` in UTC.
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalLimitsConfig {
    pub max_concurrent_trades_global: u32,
    #[serde(default)]
    pub max_daily_risk_global: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KillSwitchConfig {
    pub daily_max_loss_currency: f64,
    pub daily_max_loss_pct: f64,
    pub weekly_max_loss_currency: f64,
    pub weekly_max_loss_pct: f64,
    #[serde(default = "default_max_losing_streak")]
    pub max_losing_streak: u32,
    pub max_daily_trades: u32,
    pub max_weekly_trades: u32,
    pub max_spread_points: f64,
    pub max_exposure_risk_currency: f64,
    #[serde(default = "default_true")]
    pub auto_resume_next_day: bool,
    #[serde(default = "default_true")]
    pub auto_resume_next_week: bool,
    #[serde(default = "default_display_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExitConfig {
    pub enable_break_even: bool,
    pub enable_partial_close: bool,
    pub enable_trailing_stop: bool,
    pub enable_time_exit: bool,
    pub enable_commission_exit: bool,
    pub be_trigger_r: f64,
    pub partial_pct: f64,
    pub trail_pips: f64,
    pub trail_throttle_secs: i64,
    pub time_limit_hours: i64,
    pub tp_r_multiple: f64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        ExitConfig {
            enable_break_even: true,
            enable_partial_close: true,
            enable_trailing_stop: true,
            enable_time_exit: true,
            enable_commission_exit: true,
            be_trigger_r: 1.0,
            partial_pct: 50.0,
            trail_pips: 15.0,
            trail_throttle_secs: 30,
            time_limit_hours: 48,
            tp_r_multiple: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrderFlowConfig {
    pub poll_interval_ms: u64,
    /// Size multiplier above the rolling average used to classify a single
    /// order as "large" when deriving `large_buy_orders`/`large_sell_orders`.
    pub large_order_multiplier: f64,
    /// Count of opposing large orders that, once reached, rejects a signal
    /// in the execution filter's order-flow stage. Distinct from
    /// `large_order_multiplier`, which only classifies individual orders.
    pub large_order_cluster_threshold: u32,
    pub min_delta_trend_confirmation: f64,
    pub exhaustion_threshold: f64,
    pub absorption_lookback: usize,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        OrderFlowConfig {
            poll_interval_ms: 1000,
            large_order_multiplier: 3.0,
            large_order_cluster_threshold: 3,
            min_delta_trend_confirmation: 0.0,
            exhaustion_threshold: 0.5,
            absorption_lookback: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LossStreakConfig {
    pub pause_after_consecutive_losses: u32,
    pub pause_duration_hours: i64,
    pub pause_after_daily_losses: u32,
}

impl Default for LossStreakConfig {
    fn default() -> Self {
        LossStreakConfig {
            pause_after_consecutive_losses: 2,
            pause_duration_hours: 6,
            pause_after_daily_losses: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub account_id: String,
    pub broker_base_url: String,
    pub symbols: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_tick_interval_sec() -> u64 {
    60
}
fn default_market_feed_interval_sec() -> u64 {
    1
}
fn default_historical_backfill_days() -> u32 {
    90
}
fn default_max_candles_per_symbol() -> usize {
    10_000
}
fn default_exposure_poll_interval_sec() -> u64 {
    10
}
fn default_exit_tick_interval_sec() -> u64 {
    2
}
fn default_http_timeout_secs() -> u64 {
    8
}
fn default_max_connections() -> u32 {
    10
}
fn default_max_losing_streak() -> u32 {
    3
}
fn default_display_timezone() -> String {
    "America/New_York".to_string()
}
fn default_true() -> bool {
    true
}
fn default_webhook_port() -> u16 {
    8090
}
fn default_event_log_path() -> String {
    "events.jsonl".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_flow_size_multiplier_and_cluster_threshold_are_independent_knobs() {
        let cfg = OrderFlowConfig::default();
        assert_eq!(cfg.large_order_multiplier, 3.0);
        assert_eq!(cfg.large_order_cluster_threshold, 3);
    }
}
