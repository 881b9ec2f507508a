/// Realized PnL capture and periodic equity snapshots (§4.7). Registered
/// with `OrderEventSink` as a callback for `position_closed` so the two
/// components don't reach back into each other — see the cyclic-reference
/// note in the design section.
use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::warn;

use crate::broker::BrokerClient;
use crate::config::LossStreakConfig;
use crate::persistence::{self, Pool};
use crate::types::{EquitySnapshot, LiveTrade, TradeDirection};

pub struct LivePnL {
    broker: Arc<BrokerClient>,
    pool: Pool,
    display_timezone: chrono_tz::Tz,
    loss_streak: LossStreakConfig,
}

/// Inputs carried by a `position_closed` order event, already parsed out of
/// its `EventPayload` by the webhook handler.
#[derive(Debug, Clone)]
pub struct PositionClosed {
    pub ticket: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub commission: f64,
    pub swap: f64,
    pub profit_gross: f64,
    pub reason: String,
    pub strategy: Option<String>,
}

impl LivePnL {
    pub fn new(broker: Arc<BrokerClient>, pool: Pool, display_timezone: &str, loss_streak: LossStreakConfig) -> Self {
        let tz: chrono_tz::Tz = display_timezone.parse().unwrap_or(chrono_tz::America::New_York);
        LivePnL { broker, pool, display_timezone: tz, loss_streak }
    }

    /// `profitNet = profitGross - |commission| - |swap|`. Dedupe is
    /// enforced by the database's `(ticket, exit_time)` primary key, not
    /// here, so a replayed webhook delivery is a harmless no-op insert.
    pub async fn on_position_closed(&self, closed: PositionClosed) -> crate::error::Result<()> {
        let profit_net = closed.profit_gross - closed.commission.abs() - closed.swap.abs();
        let symbol = closed.symbol.clone();

        let trade = LiveTrade {
            ticket: closed.ticket.clone(),
            position_id: closed.ticket.clone(),
            symbol: closed.symbol,
            strategy: closed.strategy.unwrap_or_else(|| "smc".to_string()),
            direction: closed.direction,
            volume: closed.volume,
            entry_time: closed.entry_time,
            exit_time: closed.exit_time,
            entry_price: closed.entry_price,
            exit_price: closed.exit_price,
            sl: None,
            tp: None,
            commission: closed.commission,
            swap: closed.swap,
            profit_gross: closed.profit_gross,
            profit_net,
            closed_reason: closed.reason,
        };

        persistence::trades::insert(&self.pool, &trade).await?;

        if let Err(e) = self.update_loss_streak(&symbol, profit_net, closed.exit_time).await {
            warn!(symbol = %symbol, error = %e, "failed to update loss streak");
        }

        Ok(())
    }

    /// A loss extends the consecutive/daily counters and, once either
    /// threshold is crossed, pauses the symbol per `LossStreakConfig`; a win
    /// resets the consecutive counter. `losses_today` resets itself the
    /// moment `exit_time` rolls onto a new calendar day.
    async fn update_loss_streak(&self, symbol: &str, profit_net: f64, exit_time: DateTime<Utc>) -> crate::error::Result<()> {
        let mut streak = persistence::loss_streaks::get(&self.pool, symbol).await?;

        if profit_net < 0.0 {
            streak.consecutive_losses += 1;
            streak.losses_today += 1;

            if streak.consecutive_losses >= self.loss_streak.pause_after_consecutive_losses {
                streak.paused_until = Some(exit_time + chrono::Duration::hours(self.loss_streak.pause_duration_hours));
            }

            if streak.losses_today >= self.loss_streak.pause_after_daily_losses {
                let day_end = exit_time.date_naive().and_hms_opt(23, 59, 59).unwrap().and_utc();
                streak.paused_until = Some(match streak.paused_until {
                    Some(existing) if existing > day_end => existing,
                    _ => day_end,
                });
            }
        } else {
            streak.consecutive_losses = 0;
        }

        persistence::loss_streaks::upsert(&self.pool, symbol, &streak).await
    }

    pub async fn run(&self, interval: std::time::Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.snapshot_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Never propagates an error: a broker outage must not crash the
    /// snapshotter, it silently skips this tick.
    async fn snapshot_once(&self) {
        let summary = match self.broker.account_summary().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "broker unavailable, skipping equity snapshot");
                return;
            }
        };

        let now_local = Utc::now().with_timezone(&self.display_timezone);
        let day_start_local = self.display_timezone.with_ymd_and_hms(now_local.year(), now_local.month(), now_local.day(), 0, 0, 0).unwrap();
        let day_start = day_start_local.with_timezone(&Utc);

        let week_start_local = day_start_local - chrono::Duration::days(now_local.weekday().num_days_from_monday() as i64);
        let week_start = week_start_local.with_timezone(&Utc);

        let closed_pnl_today = persistence::trades::closed_pnl_since(&self.pool, day_start).await.unwrap_or(0.0);
        let closed_pnl_week = persistence::trades::closed_pnl_since(&self.pool, week_start).await.unwrap_or(0.0);

        let mut series = persistence::equity::series_since(&self.pool, week_start).await.unwrap_or_default();
        series.push(summary.equity);

        let (max_drawdown_abs, max_drawdown_pct) = running_peak_drawdown(&series);

        let snapshot = EquitySnapshot {
            ts: Utc::now(),
            balance: summary.balance,
            equity: summary.equity,
            floating_pnl: summary.equity - summary.balance,
            closed_pnl_today,
            closed_pnl_week,
            max_drawdown_abs,
            max_drawdown_pct,
        };

        if let Err(e) = persistence::equity::insert(&self.pool, &snapshot).await {
            warn!(error = %e, "failed to persist equity snapshot");
        }
    }
}

/// Walks an equity series maintaining a running peak: `drawdownAbs = max(peak
/// - e)`, `drawdownPct = max((peak - e)/peak * 100)`.
fn running_peak_drawdown(series: &[f64]) -> (f64, f64) {
    let mut peak = f64::MIN;
    let mut max_abs = 0.0;
    let mut max_pct = 0.0;

    for &e in series {
        if e > peak {
            peak = e;
        }
        if peak > 0.0 {
            let drawdown = peak - e;
            let pct = drawdown / peak * 100.0;
            if drawdown > max_abs {
                max_abs = drawdown;
            }
            if pct > max_pct {
                max_pct = pct;
            }
        }
    }

    (max_abs, max_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_tracks_running_peak() {
        let series = vec![100.0, 110.0, 90.0, 95.0, 120.0, 100.0];
        let (abs, pct) = running_peak_drawdown(&series);
        assert_eq!(abs, 20.0);
        assert!((pct - (20.0 / 110.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn monotone_equity_has_zero_drawdown() {
        let series = vec![100.0, 105.0, 110.0, 120.0];
        let (abs, pct) = running_peak_drawdown(&series);
        assert_eq!(abs, 0.0);
        assert_eq!(pct, 0.0);
    }
}
