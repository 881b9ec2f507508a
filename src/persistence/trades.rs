/// Repository for `live_trades`.
use super::Pool;
use crate::error::Result;
use crate::types::{LiveTrade, TradeDirection};

pub async fn insert(pool: &Pool, trade: &LiveTrade) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO live_trades
            (ticket, position_id, symbol, strategy, direction, volume, entry_time, exit_time,
             entry_price, exit_price, sl, tp, commission, swap, profit_gross, profit_net, closed_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        ON CONFLICT (ticket, exit_time) DO NOTHING
        "#,
    )
    .bind(&trade.ticket)
    .bind(&trade.position_id)
    .bind(&trade.symbol)
    .bind(&trade.strategy)
    .bind(trade.direction.as_str())
    .bind(trade.volume)
    .bind(trade.entry_time)
    .bind(trade.exit_time)
    .bind(trade.entry_price)
    .bind(trade.exit_price)
    .bind(trade.sl)
    .bind(trade.tp)
    .bind(trade.commission)
    .bind(trade.swap)
    .bind(trade.profit_gross)
    .bind(trade.profit_net)
    .bind(&trade.closed_reason)
    .execute(&pool.pg)
    .await?;

    Ok(())
}

pub async fn closed_pnl_since(pool: &Pool, since: chrono::DateTime<chrono::Utc>) -> Result<f64> {
    let row: (Option<f64>,) =
        sqlx::query_as("SELECT SUM(profit_net) FROM live_trades WHERE exit_time >= $1")
            .bind(since)
            .fetch_one(&pool.pg)
            .await?;

    Ok(row.0.unwrap_or(0.0))
}

pub async fn trade_count_since(pool: &Pool, since: chrono::DateTime<chrono::Utc>) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM live_trades WHERE exit_time >= $1")
        .bind(since)
        .fetch_one(&pool.pg)
        .await?;

    Ok(row.0)
}

/// Most recent trades in closing order, used to compute the losing-streak
/// length from the tail.
pub async fn recent(pool: &Pool, limit: i64) -> Result<Vec<LiveTrade>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        ticket: String,
        position_id: String,
        symbol: String,
        strategy: String,
        direction: String,
        volume: f64,
        entry_time: chrono::DateTime<chrono::Utc>,
        exit_time: chrono::DateTime<chrono::Utc>,
        entry_price: f64,
        exit_price: f64,
        sl: Option<f64>,
        tp: Option<f64>,
        commission: f64,
        swap: f64,
        profit_gross: f64,
        profit_net: f64,
        closed_reason: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT ticket, position_id, symbol, strategy, direction, volume, entry_time, exit_time, \
         entry_price, exit_price, sl, tp, commission, swap, profit_gross, profit_net, closed_reason \
         FROM live_trades ORDER BY exit_time DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(&pool.pg)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LiveTrade {
            ticket: r.ticket,
            position_id: r.position_id,
            symbol: r.symbol,
            strategy: r.strategy,
            direction: if r.direction == "BUY" { TradeDirection::Buy } else { TradeDirection::Sell },
            volume: r.volume,
            entry_time: r.entry_time,
            exit_time: r.exit_time,
            entry_price: r.entry_price,
            exit_price: r.exit_price,
            sl: r.sl,
            tp: r.tp,
            commission: r.commission,
            swap: r.swap,
            profit_gross: r.profit_gross,
            profit_net: r.profit_net,
            closed_reason: r.closed_reason,
        })
        .collect())
}

/// All trades closed within `[from, to]`, ascending by exit time, used by
/// the performance report.
pub async fn in_range(pool: &Pool, from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> Result<Vec<LiveTrade>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        ticket: String,
        position_id: String,
        symbol: String,
        strategy: String,
        direction: String,
        volume: f64,
        entry_time: chrono::DateTime<chrono::Utc>,
        exit_time: chrono::DateTime<chrono::Utc>,
        entry_price: f64,
        exit_price: f64,
        sl: Option<f64>,
        tp: Option<f64>,
        commission: f64,
        swap: f64,
        profit_gross: f64,
        profit_net: f64,
        closed_reason: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT ticket, position_id, symbol, strategy, direction, volume, entry_time, exit_time, \
         entry_price, exit_price, sl, tp, commission, swap, profit_gross, profit_net, closed_reason \
         FROM live_trades WHERE exit_time BETWEEN $1 AND $2 ORDER BY exit_time ASC",
    )
    .bind(from)
    .bind(to)
    .fetch_all(&pool.pg)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| LiveTrade {
            ticket: r.ticket,
            position_id: r.position_id,
            symbol: r.symbol,
            strategy: r.strategy,
            direction: if r.direction == "BUY" { TradeDirection::Buy } else { TradeDirection::Sell },
            volume: r.volume,
            entry_time: r.entry_time,
            exit_time: r.exit_time,
            entry_price: r.entry_price,
            exit_price: r.exit_price,
            sl: r.sl,
            tp: r.tp,
            commission: r.commission,
            swap: r.swap,
            profit_gross: r.profit_gross,
            profit_net: r.profit_net,
            closed_reason: r.closed_reason,
        })
        .collect())
}
