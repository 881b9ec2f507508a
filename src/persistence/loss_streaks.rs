/// Repository for `symbol_loss_streaks`.
use super::Pool;
use crate::error::Result;
use crate::types::SymbolLossStreak;

pub async fn get(pool: &Pool, symbol: &str) -> Result<SymbolLossStreak> {
    let row: Option<(i32, i32, Option<chrono::DateTime<chrono::Utc>>)> = sqlx::query_as(
        "SELECT consecutive_losses, losses_today, paused_until FROM symbol_loss_streaks WHERE symbol = $1",
    )
    .bind(symbol)
    .fetch_optional(&pool.pg)
    .await?;

    Ok(match row {
        Some((consecutive, today, paused)) => SymbolLossStreak {
            consecutive_losses: consecutive as u32,
            losses_today: today as u32,
            paused_until: paused,
        },
        None => SymbolLossStreak::default(),
    })
}

pub async fn upsert(pool: &Pool, symbol: &str, streak: &SymbolLossStreak) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO symbol_loss_streaks (symbol, consecutive_losses, losses_today, paused_until)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (symbol) DO UPDATE SET
            consecutive_losses = EXCLUDED.consecutive_losses,
            losses_today = EXCLUDED.losses_today,
            paused_until = EXCLUDED.paused_until
        "#,
    )
    .bind(symbol)
    .bind(streak.consecutive_losses as i32)
    .bind(streak.losses_today as i32)
    .bind(streak.paused_until)
    .execute(&pool.pg)
    .await?;

    Ok(())
}
