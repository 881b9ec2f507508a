/// Repository for `live_equity`.
use super::Pool;
use crate::error::Result;
use crate::types::EquitySnapshot;

pub async fn insert(pool: &Pool, snap: &EquitySnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO live_equity
            (ts, balance, equity, floating_pnl, closed_pnl_today, closed_pnl_week,
             max_drawdown_abs, max_drawdown_pct)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (ts) DO NOTHING
        "#,
    )
    .bind(snap.ts)
    .bind(snap.balance)
    .bind(snap.equity)
    .bind(snap.floating_pnl)
    .bind(snap.closed_pnl_today)
    .bind(snap.closed_pnl_week)
    .bind(snap.max_drawdown_abs)
    .bind(snap.max_drawdown_pct)
    .execute(&pool.pg)
    .await?;

    Ok(())
}

pub async fn latest(pool: &Pool) -> Result<Option<EquitySnapshot>> {
    let row: Option<(
        chrono::DateTime<chrono::Utc>,
        f64,
        f64,
        f64,
        f64,
        f64,
        f64,
        f64,
    )> = sqlx::query_as(
        "SELECT ts, balance, equity, floating_pnl, closed_pnl_today, closed_pnl_week, \
         max_drawdown_abs, max_drawdown_pct FROM live_equity ORDER BY ts DESC LIMIT 1",
    )
    .fetch_optional(&pool.pg)
    .await?;

    Ok(row.map(|r| EquitySnapshot {
        ts: r.0,
        balance: r.1,
        equity: r.2,
        floating_pnl: r.3,
        closed_pnl_today: r.4,
        closed_pnl_week: r.5,
        max_drawdown_abs: r.6,
        max_drawdown_pct: r.7,
    }))
}

pub async fn series_since(pool: &Pool, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<f64>> {
    let rows: Vec<(f64,)> =
        sqlx::query_as("SELECT equity FROM live_equity WHERE ts >= $1 ORDER BY ts ASC")
            .bind(since)
            .fetch_all(&pool.pg)
            .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}
