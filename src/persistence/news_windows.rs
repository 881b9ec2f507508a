/// Read-only accessor for `daily_news_windows`. This crate never writes to
/// this table; it is populated by the news guardrail service out-of-band.
use super::Pool;
use crate::error::Result;
use crate::types::AvoidWindow;

pub async fn today(pool: &Pool, date: chrono::NaiveDate) -> Result<Vec<AvoidWindow>> {
    let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let end = start + chrono::Duration::days(1);

    let rows: Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>, String, String, f64, bool)> =
        sqlx::query_as(
            "SELECT start_time, end_time, currency, event, risk_score, critical \
             FROM daily_news_windows WHERE start_time >= $1 AND start_time < $2 ORDER BY start_time ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&pool.pg)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(start_time, end_time, currency, event, risk_score, critical)| AvoidWindow {
            start_time,
            end_time,
            currency,
            event,
            risk_score,
            critical,
        })
        .collect())
}
