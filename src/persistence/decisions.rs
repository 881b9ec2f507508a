/// Repository for `trade_decisions`.
use super::Pool;
use crate::error::Result;
use crate::types::{DecisionRecord, GuardrailMode, TradeDirection};
use uuid::Uuid;

fn direction_str(d: Option<TradeDirection>) -> Option<&'static str> {
    d.map(|d| d.as_str())
}

fn guardrail_str(m: Option<GuardrailMode>) -> Option<&'static str> {
    m.map(|m| match m {
        GuardrailMode::Normal => "normal",
        GuardrailMode::Reduced => "reduced",
        GuardrailMode::Blocked => "blocked",
    })
}

pub async fn insert(pool: &Pool, record: &DecisionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trade_decisions
            (id, ts, symbol, account_id, traded, direction, planned_entry,
             planned_sl, planned_tp, skip_reasons, strategy_error, guardrail_mode, ticket)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(record.id)
    .bind(record.ts)
    .bind(&record.symbol)
    .bind(&record.account_id)
    .bind(record.traded)
    .bind(direction_str(record.direction))
    .bind(record.planned_entry)
    .bind(record.planned_sl)
    .bind(record.planned_tp)
    .bind(serde_json::to_value(&record.skip_reasons)?)
    .bind(&record.strategy_error)
    .bind(guardrail_str(record.guardrail_mode))
    .bind(&record.ticket)
    .execute(&pool.pg)
    .await?;

    Ok(())
}

/// Count of committed (traded) decisions for a symbol since `since`, used by
/// the execution filter's daily-trade-count stage to avoid double-counting
/// across restarts.
pub async fn traded_count_since(
    pool: &Pool,
    symbol: &str,
    since: chrono::DateTime<chrono::Utc>,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM trade_decisions WHERE symbol = $1 AND traded = true AND ts >= $2",
    )
    .bind(symbol)
    .bind(since)
    .fetch_one(&pool.pg)
    .await?;

    Ok(row.0)
}

/// Fetch decisions that were skipped (not traded) with a planned entry/sl/tp,
/// in a time window, for the false-negative analysis in the performance
/// report.
pub async fn skipped_with_plan_in_range(
    pool: &Pool,
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<DecisionRecord>> {
    let id = Uuid::nil();
    let _ = id;
    // Rows are reconstructed manually since `direction`/`guardrail_mode` are
    // stored as text, not a native enum.
    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        ts: chrono::DateTime<chrono::Utc>,
        symbol: String,
        account_id: Option<String>,
        traded: bool,
        direction: Option<String>,
        planned_entry: Option<f64>,
        planned_sl: Option<f64>,
        planned_tp: Option<f64>,
        skip_reasons: serde_json::Value,
        strategy_error: Option<String>,
        guardrail_mode: Option<String>,
        ticket: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT id, ts, symbol, account_id, traded, direction, planned_entry,
               planned_sl, planned_tp, skip_reasons, strategy_error, guardrail_mode, ticket
        FROM trade_decisions
        WHERE traded = false AND planned_entry IS NOT NULL AND ts BETWEEN $1 AND $2
        ORDER BY ts ASC
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(&pool.pg)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| DecisionRecord {
            id: r.id,
            ts: r.ts,
            symbol: r.symbol,
            account_id: r.account_id,
            traded: r.traded,
            direction: r.direction.as_deref().and_then(|s| match s {
                "BUY" => Some(TradeDirection::Buy),
                "SELL" => Some(TradeDirection::Sell),
                _ => None,
            }),
            planned_entry: r.planned_entry,
            planned_sl: r.planned_sl,
            planned_tp: r.planned_tp,
            skip_reasons: serde_json::from_value(r.skip_reasons).unwrap_or_default(),
            strategy_error: r.strategy_error,
            guardrail_mode: r.guardrail_mode.as_deref().and_then(|s| match s {
                "normal" => Some(GuardrailMode::Normal),
                "reduced" => Some(GuardrailMode::Reduced),
                "blocked" => Some(GuardrailMode::Blocked),
                _ => None,
            }),
            ticket: r.ticket,
        })
        .collect())
}

/// Every decision (traded or skipped) in a time window, for the
/// performance report's setups-found/traded/skipped breakdown.
pub async fn in_range(pool: &Pool, from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> Result<Vec<DecisionRecord>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        id: Uuid,
        ts: chrono::DateTime<chrono::Utc>,
        symbol: String,
        account_id: Option<String>,
        traded: bool,
        direction: Option<String>,
        planned_entry: Option<f64>,
        planned_sl: Option<f64>,
        planned_tp: Option<f64>,
        skip_reasons: serde_json::Value,
        strategy_error: Option<String>,
        guardrail_mode: Option<String>,
        ticket: Option<String>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT id, ts, symbol, account_id, traded, direction, planned_entry,
               planned_sl, planned_tp, skip_reasons, strategy_error, guardrail_mode, ticket
        FROM trade_decisions
        WHERE ts BETWEEN $1 AND $2
        ORDER BY ts ASC
        "#,
    )
    .bind(from)
    .bind(to)
    .fetch_all(&pool.pg)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| DecisionRecord {
            id: r.id,
            ts: r.ts,
            symbol: r.symbol,
            account_id: r.account_id,
            traded: r.traded,
            direction: r.direction.as_deref().and_then(|s| match s {
                "BUY" => Some(TradeDirection::Buy),
                "SELL" => Some(TradeDirection::Sell),
                _ => None,
            }),
            planned_entry: r.planned_entry,
            planned_sl: r.planned_sl,
            planned_tp: r.planned_tp,
            skip_reasons: serde_json::from_value(r.skip_reasons).unwrap_or_default(),
            strategy_error: r.strategy_error,
            guardrail_mode: r.guardrail_mode.as_deref().and_then(|s| match s {
                "normal" => Some(GuardrailMode::Normal),
                "reduced" => Some(GuardrailMode::Reduced),
                "blocked" => Some(GuardrailMode::Blocked),
                _ => None,
            }),
            ticket: r.ticket,
        })
        .collect())
}
