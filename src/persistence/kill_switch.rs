/// Repository for `kill_switch_events`: persisted transition log only. The
/// live state lives in `killswitch::KillSwitch`; this table is write-once
/// history for audit and the boot-time "was active before restart" check.
use super::Pool;
use crate::error::Result;
use uuid::Uuid;

pub async fn record_transition(
    pool: &Pool,
    account_id: Option<&str>,
    active: bool,
    reasons: &[String],
) -> Result<()> {
    sqlx::query(
        "INSERT INTO kill_switch_events (id, ts, account_id, active, reasons) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(chrono::Utc::now())
    .bind(account_id)
    .bind(active)
    .bind(serde_json::to_value(reasons)?)
    .execute(&pool.pg)
    .await?;

    Ok(())
}
