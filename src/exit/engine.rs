/// Post-entry lifecycle: break-even, partial close, trailing stop, time and
/// commission exits. Runs on a fixed poll tick against the account's
/// `OpenTrades` snapshot, consulting a lazily-loaded `ExitPlan` per ticket.
use std::sync::Arc;
use chrono::Utc;
use tracing::{info, warn};

use crate::broker::BrokerClient;
use crate::config::{Config, SymbolMetaConfig};
use crate::data::OpenTrades;
use crate::events::{Event, EventBus, EventPayload, EventType};
use crate::killswitch::KillSwitch;
use crate::persistence::{self, Pool};
use crate::types::{ExitPlan, OpenTrade, TradeDirection, TrailMode};

pub struct ExitEngine {
    broker: Arc<BrokerClient>,
    open_trades: Arc<OpenTrades>,
    kill_switch: Arc<KillSwitch>,
    event_bus: Arc<EventBus>,
    pool: Pool,
    config: Arc<Config>,
}

impl ExitEngine {
    pub fn new(
        broker: Arc<BrokerClient>,
        open_trades: Arc<OpenTrades>,
        kill_switch: Arc<KillSwitch>,
        event_bus: Arc<EventBus>,
        pool: Pool,
        config: Arc<Config>,
    ) -> Self {
        ExitEngine { broker, open_trades, kill_switch, event_bus, pool, config }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.exit_tick_interval_sec));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub async fn tick(&self) {
        let trades = self.open_trades.all_open_trades().await;
        let ks_active = self.kill_switch.state().await.active;

        for trade in trades {
            if let Err(e) = self.evaluate_trade(&trade, ks_active).await {
                warn!(ticket = %trade.ticket, error = %e, "exit evaluation failed for ticket");
            }
        }
    }

    fn meta(&self, symbol: &str) -> Option<SymbolMetaConfig> {
        self.config.symbol_meta.get(symbol).copied()
    }

    async fn evaluate_trade(&self, trade: &OpenTrade, ks_active: bool) -> crate::error::Result<()> {
        if ks_active {
            self.broker.close_trade(&trade.ticket, Some("kill_switch_forced_exit")).await?;
            self.emit(
                EventType::KillSwitchForcedExit,
                EventPayload::KillSwitchForcedExit { ticket: trade.ticket.clone() },
                &trade.ticket,
            )
            .await;
            persistence::exit_plans::delete(&self.pool, &trade.ticket).await?;
            return Ok(());
        }

        let Some(mut plan) = persistence::exit_plans::find(&self.pool, &trade.ticket).await? else {
            return Ok(());
        };

        let Some(meta) = self.meta(&trade.symbol) else {
            return Ok(());
        };

        let current_price = self.broker.price(&trade.symbol).await?;
        let mark = match trade.direction {
            TradeDirection::Buy => current_price.bid,
            TradeDirection::Sell => current_price.ask,
        };

        let r_unit = plan.r_unit();
        let favorable_move = match trade.direction {
            TradeDirection::Buy => mark - plan.entry,
            TradeDirection::Sell => plan.entry - mark,
        };

        let mut changed = false;

        if self.config.exit.enable_break_even && !plan.be_fired && r_unit > 0.0 && favorable_move / r_unit >= plan.be_trigger_r {
            self.broker.modify_trade(&trade.ticket, Some(plan.entry), None).await?;
            plan.be_fired = true;
            changed = true;
            self.emit(
                EventType::BreakEvenSet,
                EventPayload::BreakEvenSet { ticket: trade.ticket.clone(), new_stop_loss: plan.entry },
                &trade.ticket,
            )
            .await;
            info!(ticket = %trade.ticket, "break-even stop set");
        }

        if self.config.exit.enable_partial_close && !plan.partial_fired {
            if let (Some(tp1), Some(pct)) = (plan.tp1, plan.partial_pct) {
                let hit = match trade.direction {
                    TradeDirection::Buy => mark >= tp1,
                    TradeDirection::Sell => mark <= tp1,
                };
                if hit {
                    self.broker.partial_close(&trade.ticket, pct).await?;
                    plan.partial_fired = true;
                    changed = true;
                    self.emit(
                        EventType::PartialClose,
                        EventPayload::PartialClose { ticket: trade.ticket.clone(), volume_percent: pct },
                        &trade.ticket,
                    )
                    .await;
                    info!(ticket = %trade.ticket, pct, "partial close executed at TP1");
                }
            }
        }

        if self.config.exit.enable_trailing_stop && plan.trail_mode == TrailMode::FixedPips {
            changed |= self.apply_trailing_stop(trade, &mut plan, mark, &meta).await?;
        }

        let age = Utc::now() - plan.opened_at;
        if self.config.exit.enable_time_exit && age > plan.time_limit {
            self.broker.close_trade(&trade.ticket, Some("time_exit")).await?;
            let age_hours = age.num_seconds() as f64 / 3600.0;
            self.emit(
                EventType::TimeExit,
                EventPayload::TimeExit { ticket: trade.ticket.clone(), age_hours },
                &trade.ticket,
            )
            .await;
            persistence::exit_plans::delete(&self.pool, &trade.ticket).await?;
            return Ok(());
        }

        if self.config.exit.enable_commission_exit {
            let commission = trade.commission.unwrap_or(0.0).abs();
            let swap = trade.swap.unwrap_or(0.0).abs();
            let expected_reward = r_unit * self.config.exit.tp_r_multiple;
            if expected_reward > 0.0 && commission + swap >= expected_reward {
                self.broker.close_trade(&trade.ticket, Some("commission_exit")).await?;
                self.emit(
                    EventType::CommissionExit,
                    EventPayload::CommissionExit { ticket: trade.ticket.clone() },
                    &trade.ticket,
                )
                .await;
                persistence::exit_plans::delete(&self.pool, &trade.ticket).await?;
                return Ok(());
            }
        }

        if changed {
            persistence::exit_plans::upsert(&self.pool, &plan).await?;
        }

        Ok(())
    }

    /// `SL = mark ∓ trailPips * pipValue`, only ever advances in the
    /// favorable direction, throttled to `trail_throttle_secs` between
    /// moves, and never retreats past the initial SL.
    async fn apply_trailing_stop(
        &self,
        trade: &OpenTrade,
        plan: &mut ExitPlan,
        mark: f64,
        meta: &SymbolMetaConfig,
    ) -> crate::error::Result<bool> {
        let now = Utc::now();
        if let Some(last_move) = plan.last_trail_move {
            if (now - last_move).num_seconds() < self.config.exit.trail_throttle_secs {
                return Ok(false);
            }
        }

        let trail_distance = plan.trail_value * meta.pip_size;
        let candidate = match trade.direction {
            TradeDirection::Buy => mark - trail_distance,
            TradeDirection::Sell => mark + trail_distance,
        };

        let improved = match (trade.direction, plan.trail_sl) {
            (TradeDirection::Buy, Some(current)) => candidate > current,
            (TradeDirection::Buy, None) => candidate > plan.sl_initial,
            (TradeDirection::Sell, Some(current)) => candidate < current,
            (TradeDirection::Sell, None) => candidate < plan.sl_initial,
        };

        if !improved {
            return Ok(false);
        }

        let bounded = match trade.direction {
            TradeDirection::Buy => candidate.max(plan.sl_initial),
            TradeDirection::Sell => candidate.min(plan.sl_initial),
        };

        self.broker.modify_trade(&trade.ticket, Some(bounded), None).await?;
        plan.trail_sl = Some(bounded);
        plan.last_trail_move = Some(now);
        self.emit(
            EventType::TrailSlMove,
            EventPayload::TrailSlMove { ticket: trade.ticket.clone(), new_stop_loss: bounded },
            &trade.ticket,
        )
        .await;
        Ok(true)
    }

    async fn emit(&self, event_type: EventType, payload: EventPayload, ticket: &str) {
        let idempotency_key = format!("{}|{}|{}", ticket, event_type.as_str(), Utc::now().timestamp_nanos_opt().unwrap_or_default());
        if let Err(e) = self.event_bus.publish(Event::new(event_type, payload, idempotency_key)).await {
            warn!(ticket = %ticket, error = %e, "failed to publish exit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrailMode;

    fn plan(direction_sl_initial: f64) -> ExitPlan {
        ExitPlan {
            ticket: "T1".to_string(),
            entry: 100.0,
            tp1: Some(102.0),
            tp2: None,
            tp3: None,
            sl_initial: direction_sl_initial,
            be_trigger_r: 1.0,
            be_fired: false,
            partial_pct: Some(50.0),
            partial_fired: false,
            trail_mode: TrailMode::FixedPips,
            trail_value: 15.0,
            trail_sl: None,
            last_trail_move: None,
            time_limit: chrono::Duration::hours(48),
            opened_at: Utc::now(),
        }
    }

    #[test]
    fn r_unit_is_distance_from_initial_sl() {
        let p = plan(99.0);
        assert_eq!(p.r_unit(), 1.0);
    }
}
