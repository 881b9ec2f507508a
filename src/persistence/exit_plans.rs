/// Repository for `exit_plans`. Plans are lazy-loaded by `ExitEngine`; absent
/// means "static SL/TP only" for that ticket.
use super::Pool;
use crate::error::Result;
use crate::types::{ExitPlan, TrailMode};

pub async fn upsert(pool: &Pool, plan: &ExitPlan) -> Result<()> {
    let trail_mode = match plan.trail_mode {
        TrailMode::FixedPips => "fixed_pips",
        TrailMode::None => "none",
    };

    sqlx::query(
        r#"
        INSERT INTO exit_plans
            (ticket, entry, tp1, tp2, tp3, sl_initial, be_trigger_r, be_fired, partial_pct,
             partial_fired, trail_mode, trail_value, trail_sl, last_trail_move, time_limit_secs, opened_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (ticket) DO UPDATE SET
            be_fired = EXCLUDED.be_fired,
            partial_fired = EXCLUDED.partial_fired,
            trail_sl = EXCLUDED.trail_sl,
            last_trail_move = EXCLUDED.last_trail_move
        "#,
    )
    .bind(&plan.ticket)
    .bind(plan.entry)
    .bind(plan.tp1)
    .bind(plan.tp2)
    .bind(plan.tp3)
    .bind(plan.sl_initial)
    .bind(plan.be_trigger_r)
    .bind(plan.be_fired)
    .bind(plan.partial_pct)
    .bind(plan.partial_fired)
    .bind(trail_mode)
    .bind(plan.trail_value)
    .bind(plan.trail_sl)
    .bind(plan.last_trail_move)
    .bind(plan.time_limit.num_seconds())
    .bind(plan.opened_at)
    .execute(&pool.pg)
    .await?;

    Ok(())
}

pub async fn find(pool: &Pool, ticket: &str) -> Result<Option<ExitPlan>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        ticket: String,
        entry: f64,
        tp1: Option<f64>,
        tp2: Option<f64>,
        tp3: Option<f64>,
        sl_initial: f64,
        be_trigger_r: f64,
        be_fired: bool,
        partial_pct: Option<f64>,
        partial_fired: bool,
        trail_mode: String,
        trail_value: f64,
        trail_sl: Option<f64>,
        last_trail_move: Option<chrono::DateTime<chrono::Utc>>,
        time_limit_secs: i64,
        opened_at: chrono::DateTime<chrono::Utc>,
    }

    let row: Option<Row> = sqlx::query_as(
        "SELECT ticket, entry, tp1, tp2, tp3, sl_initial, be_trigger_r, be_fired, partial_pct, \
         partial_fired, trail_mode, trail_value, trail_sl, last_trail_move, time_limit_secs, opened_at \
         FROM exit_plans WHERE ticket = $1",
    )
    .bind(ticket)
    .fetch_optional(&pool.pg)
    .await?;

    Ok(row.map(|r| ExitPlan {
        ticket: r.ticket,
        entry: r.entry,
        tp1: r.tp1,
        tp2: r.tp2,
        tp3: r.tp3,
        sl_initial: r.sl_initial,
        be_trigger_r: r.be_trigger_r,
        be_fired: r.be_fired,
        partial_pct: r.partial_pct,
        partial_fired: r.partial_fired,
        trail_mode: if r.trail_mode == "fixed_pips" { TrailMode::FixedPips } else { TrailMode::None },
        trail_value: r.trail_value,
        trail_sl: r.trail_sl,
        last_trail_move: r.last_trail_move,
        time_limit: chrono::Duration::seconds(r.time_limit_secs),
        opened_at: r.opened_at,
    }))
}

pub async fn delete(pool: &Pool, ticket: &str) -> Result<()> {
    sqlx::query("DELETE FROM exit_plans WHERE ticket = $1")
        .bind(ticket)
        .execute(&pool.pg)
        .await?;
    Ok(())
}
