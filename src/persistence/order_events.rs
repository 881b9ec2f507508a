/// Repository for `order_events`. Insert is unique on `idempotency_key`, so a
/// replayed webhook delivery is rejected by the database even if the
/// in-memory `EventBus` dedupe set was reset by a restart.
use super::Pool;
use crate::error::Result;
use crate::events::Event;
use uuid::Uuid;

pub async fn insert(pool: &Pool, ticket: Option<&str>, symbol: Option<&str>, event: &Event) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO order_events (id, ts, ticket, symbol, event_type, idempotency_key, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (idempotency_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(event.timestamp)
    .bind(ticket)
    .bind(symbol)
    .bind(event.event_type.as_str())
    .bind(&event.idempotency_key)
    .bind(serde_json::to_value(&event.payload)?)
    .execute(&pool.pg)
    .await?;

    Ok(result.rows_affected() > 0)
}
