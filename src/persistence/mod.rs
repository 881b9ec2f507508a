/// Postgres-compatible persistence layer.
///
/// Every write here is a single statement — no multi-row transactions, per
/// the concurrency model's "no long transactions" rule. Database errors are
/// never fatal outside of boot: callers log and continue, the same way the
/// teacher's flat-file writer never took down its caller on an I/O error.
pub mod decisions;
pub mod equity;
pub mod exit_plans;
pub mod kill_switch;
pub mod loss_streaks;
pub mod news_windows;
pub mod order_events;
pub mod trades;

use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Pool {
    pub pg: PgPool,
}

impl Pool {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pg = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Pool { pg })
    }

    /// Creates the core tables if they do not already exist. Intended for
    /// local/dev bring-up; production deployments are expected to run
    /// migrations out-of-band.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pg).await?;
        Ok(())
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS trade_decisions (
    id UUID PRIMARY KEY,
    ts TIMESTAMPTZ NOT NULL,
    symbol TEXT NOT NULL,
    account_id TEXT,
    traded BOOLEAN NOT NULL,
    direction TEXT,
    planned_entry DOUBLE PRECISION,
    planned_sl DOUBLE PRECISION,
    planned_tp DOUBLE PRECISION,
    skip_reasons JSONB NOT NULL DEFAULT '[]',
    strategy_error TEXT,
    guardrail_mode TEXT,
    ticket TEXT
);
CREATE INDEX IF NOT EXISTS idx_trade_decisions_symbol_ts ON trade_decisions (symbol, ts);

CREATE TABLE IF NOT EXISTS order_events (
    id UUID PRIMARY KEY,
    ts TIMESTAMPTZ NOT NULL,
    ticket TEXT,
    symbol TEXT,
    event_type TEXT NOT NULL,
    idempotency_key TEXT NOT NULL UNIQUE,
    payload JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_order_events_ticket ON order_events (ticket);

CREATE TABLE IF NOT EXISTS live_trades (
    ticket TEXT NOT NULL,
    position_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    strategy TEXT NOT NULL,
    direction TEXT NOT NULL,
    volume DOUBLE PRECISION NOT NULL,
    entry_time TIMESTAMPTZ NOT NULL,
    exit_time TIMESTAMPTZ NOT NULL,
    entry_price DOUBLE PRECISION NOT NULL,
    exit_price DOUBLE PRECISION NOT NULL,
    sl DOUBLE PRECISION,
    tp DOUBLE PRECISION,
    commission DOUBLE PRECISION NOT NULL,
    swap DOUBLE PRECISION NOT NULL,
    profit_gross DOUBLE PRECISION NOT NULL,
    profit_net DOUBLE PRECISION NOT NULL,
    closed_reason TEXT NOT NULL,
    PRIMARY KEY (ticket, exit_time)
);
CREATE INDEX IF NOT EXISTS idx_live_trades_symbol_time ON live_trades (symbol, exit_time);

CREATE TABLE IF NOT EXISTS live_equity (
    ts TIMESTAMPTZ PRIMARY KEY,
    balance DOUBLE PRECISION NOT NULL,
    equity DOUBLE PRECISION NOT NULL,
    floating_pnl DOUBLE PRECISION NOT NULL,
    closed_pnl_today DOUBLE PRECISION NOT NULL,
    closed_pnl_week DOUBLE PRECISION NOT NULL,
    max_drawdown_abs DOUBLE PRECISION NOT NULL,
    max_drawdown_pct DOUBLE PRECISION NOT NULL
);

CREATE TABLE IF NOT EXISTS kill_switch_events (
    id UUID PRIMARY KEY,
    ts TIMESTAMPTZ NOT NULL,
    account_id TEXT,
    active BOOLEAN NOT NULL,
    reasons JSONB NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS exit_plans (
    ticket TEXT PRIMARY KEY,
    entry DOUBLE PRECISION NOT NULL,
    tp1 DOUBLE PRECISION,
    tp2 DOUBLE PRECISION,
    tp3 DOUBLE PRECISION,
    sl_initial DOUBLE PRECISION NOT NULL,
    be_trigger_r DOUBLE PRECISION NOT NULL,
    be_fired BOOLEAN NOT NULL,
    partial_pct DOUBLE PRECISION,
    partial_fired BOOLEAN NOT NULL,
    trail_mode TEXT NOT NULL,
    trail_value DOUBLE PRECISION NOT NULL,
    trail_sl DOUBLE PRECISION,
    last_trail_move TIMESTAMPTZ,
    time_limit_secs BIGINT NOT NULL,
    opened_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS symbol_loss_streaks (
    symbol TEXT PRIMARY KEY,
    consecutive_losses INT NOT NULL,
    losses_today INT NOT NULL,
    paused_until TIMESTAMPTZ
);

CREATE TABLE IF NOT EXISTS daily_news_windows (
    id UUID PRIMARY KEY,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    currency TEXT NOT NULL,
    event TEXT NOT NULL,
    risk_score DOUBLE PRECISION NOT NULL,
    critical BOOLEAN NOT NULL
);
"#;
