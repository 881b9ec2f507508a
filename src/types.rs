/// Core domain types shared across the decision pipeline.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single best bid/ask snapshot from the broker bridge price feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
    pub time: DateTime<Utc>,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// OHLCV candle for a given timeframe. M1 candles are authoritative; every
/// higher timeframe is derived from them by `data::market_data`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// `low <= min(open,close) <= max(open,close) <= high`
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.volume >= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

/// A confirmed pivot: only emitted once `pivotRight` bars have closed past it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub kind: SwingKind,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            TradeDirection::Buy => TradeDirection::Sell,
            TradeDirection::Sell => TradeDirection::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BosEvent {
    pub index: usize,
    pub direction: TradeDirection,
    pub broken_swing_idx: usize,
    pub level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Bullish,
    Bearish,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChochEvent {
    pub bos: BosEvent,
    pub from_trend: Trend,
    pub to_trend: Trend,
}

/// Per-timeframe structure state, recomputed on every new candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendBias {
    pub trend: Trend,
    pub last_swing_hi: Option<f64>,
    pub last_swing_lo: Option<f64>,
    pub last_bos_dir: Option<TradeDirection>,
    /// `None` when the PD range is degenerate (`high == low`).
    pub pd_position: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderBlock {
    pub tf: Timeframe,
    pub side: Side,
    pub high: f64,
    pub low: f64,
    pub created_at: DateTime<Utc>,
    pub mitigated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FvgGrade {
    Narrow,
    Medium,
    Wide,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairValueGap {
    pub tf: Timeframe,
    pub direction: TradeDirection,
    pub upper: f64,
    pub lower: f64,
    pub grade: FvgGrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
            OrderKind::Stop => "stop",
        }
    }
}

/// Confluence metadata carried alongside a `Signal`, used both for order
/// placement decisions and for the decision log / performance report.
#[derive(Debug, Clone)]
pub struct SignalMeta {
    pub htf_trend: Trend,
    pub pd_position: Option<f64>,
    pub order_block: OrderBlock,
    pub fvg: Option<FairValueGap>,
    pub liquidity_swept: bool,
    pub smt_divergence: Option<bool>,
    pub session: String,
    pub confluence_score: f64,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub order_kind: OrderKind,
    pub reason: String,
    pub meta: SignalMeta,
}

impl Signal {
    /// `direction=buy => sl<entry<tp`, `direction=sell => tp<entry<sl`.
    pub fn is_valid(&self, symbol_min_risk: f64) -> bool {
        let risk_ok = (self.entry - self.sl).abs() >= symbol_min_risk;
        let geometry_ok = match self.direction {
            TradeDirection::Buy => self.sl < self.entry && self.entry < self.tp,
            TradeDirection::Sell => self.tp < self.entry && self.entry < self.sl,
        };
        risk_ok && geometry_ok
    }

    pub fn risk_distance(&self) -> f64 {
        (self.entry - self.sl).abs()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub long_count: u32,
    pub short_count: u32,
    pub total_count: u32,
    pub estimated_risk: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub total_open_trades: u32,
    pub total_estimated_risk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTrade {
    pub ticket: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub open_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub float_pnl: Option<f64>,
    pub commission: Option<f64>,
    pub swap: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailMode {
    FixedPips,
    None,
}

#[derive(Debug, Clone)]
pub struct ExitPlan {
    pub ticket: String,
    pub entry: f64,
    pub tp1: Option<f64>,
    pub tp2: Option<f64>,
    pub tp3: Option<f64>,
    pub sl_initial: f64,
    pub be_trigger_r: f64,
    pub be_fired: bool,
    pub partial_pct: Option<f64>,
    pub partial_fired: bool,
    pub trail_mode: TrailMode,
    pub trail_value: f64,
    pub trail_sl: Option<f64>,
    pub last_trail_move: Option<DateTime<Utc>>,
    pub time_limit: chrono::Duration,
    pub opened_at: DateTime<Utc>,
}

impl ExitPlan {
    pub fn r_unit(&self) -> f64 {
        (self.entry - self.sl_initial).abs()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveTrade {
    pub ticket: String,
    pub position_id: String,
    pub symbol: String,
    pub strategy: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub commission: f64,
    pub swap: f64,
    pub profit_gross: f64,
    pub profit_net: f64,
    pub closed_reason: String,
}

impl LiveTrade {
    pub fn is_win(&self) -> bool {
        self.profit_net > 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub ts: DateTime<Utc>,
    pub balance: f64,
    pub equity: f64,
    pub floating_pnl: f64,
    pub closed_pnl_today: f64,
    pub closed_pnl_week: f64,
    pub max_drawdown_abs: f64,
    pub max_drawdown_pct: f64,
}

#[derive(Debug, Clone, Default)]
pub struct KillSwitchState {
    pub active: bool,
    pub reasons: Vec<String>,
    pub activated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GuardrailMode {
    Normal,
    Reduced,
    Blocked,
}

#[derive(Debug, Clone)]
pub struct GuardrailDecision {
    pub mode: GuardrailMode,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyTier {
    Low,
    High,
}

impl StrategyTier {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            StrategyTier::Low => "low",
            StrategyTier::High => "high",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvoidWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub currency: String,
    pub event: String,
    pub risk_score: f64,
    pub critical: bool,
}

/// Per-symbol instrument metadata, read once from the broker at start and
/// cached — see the Open Question in spec §9 about pip value per lot.
#[derive(Debug, Clone, Copy)]
pub struct SymbolMeta {
    pub pip_size: f64,
    pub pip_value_per_lot: f64,
    pub contract_size: f64,
    pub volume_step: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub min_risk_distance: f64,
}

/// One row per tick-decision: a trade taken, or a skip with reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: uuid::Uuid,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub account_id: Option<String>,
    pub traded: bool,
    pub direction: Option<TradeDirection>,
    pub planned_entry: Option<f64>,
    pub planned_sl: Option<f64>,
    pub planned_tp: Option<f64>,
    pub skip_reasons: Vec<String>,
    pub strategy_error: Option<String>,
    pub guardrail_mode: Option<GuardrailMode>,
    pub ticket: Option<String>,
}

/// Per-symbol loss-streak counter driving the §4.4 pause rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolLossStreak {
    pub consecutive_losses: u32,
    pub losses_today: u32,
    pub paused_until: Option<DateTime<Utc>>,
}

/// A single configured account the dispatcher fans a signal out to.
#[derive(Debug, Clone)]
pub struct Account {
    pub account_id: String,
    pub broker_base_url: String,
    pub symbols: Vec<String>,
    pub enabled: bool,
}
