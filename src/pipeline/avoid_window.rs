/// News avoid-window enforcement (§4.11). On boot and then once per day,
/// loads today's windows from the read-only `daily_news_windows` table.
/// Rather than scheduling a timer pair per window, this follows the rest of
/// the pipeline's fixed-cadence polling style: `tick()` is called on the
/// same cadence as other account-scoped loops and walks the day's windows
/// comparing `now` against each `start_time`/`end_time`, which is
/// observationally equivalent to per-window timers at the tick's
/// resolution and keeps the component's concurrency shape uniform with
/// OrderFlow/OpenTrades/ExitEngine.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::broker::BrokerClient;
use crate::events::{Event, EventBus, EventPayload, EventType};
use crate::persistence::{self, Pool};
use crate::types::{AvoidWindow, OrderKind, TradeDirection};

#[derive(Debug, Clone)]
struct CanceledOrder {
    symbol: String,
    direction: TradeDirection,
    volume: f64,
    entry_price: f64,
    sl: Option<f64>,
    tp: Option<f64>,
}

pub struct AvoidWindowManager {
    broker: Arc<BrokerClient>,
    event_bus: Arc<EventBus>,
    pool: Pool,
    symbols: Vec<String>,
    windows: RwLock<Vec<AvoidWindow>>,
    loaded_date: RwLock<Option<NaiveDate>>,
    started: RwLock<HashSet<usize>>,
    ended: RwLock<HashSet<usize>>,
    canceled: RwLock<HashMap<String, CanceledOrder>>,
}

/// A symbol is "in" a news window's currency if the 6-letter pair code
/// contains that currency, e.g. `EURUSD` matches both `EUR` and `USD`.
fn symbol_matches_currency(symbol: &str, currency: &str) -> bool {
    symbol.to_ascii_uppercase().contains(&currency.to_ascii_uppercase())
}

impl AvoidWindowManager {
    pub fn new(broker: Arc<BrokerClient>, event_bus: Arc<EventBus>, pool: Pool, symbols: Vec<String>) -> Self {
        AvoidWindowManager {
            broker,
            event_bus,
            pool,
            symbols,
            windows: RwLock::new(Vec::new()),
            loaded_date: RwLock::new(None),
            started: RwLock::new(HashSet::new()),
            ended: RwLock::new(HashSet::new()),
            canceled: RwLock::new(HashMap::new()),
        }
    }

    pub async fn run(&self, tick_interval: std::time::Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn reload_if_new_day(&self, now: DateTime<Utc>) {
        let today = now.date_naive();
        let needs_reload = *self.loaded_date.read().await != Some(today);
        if !needs_reload {
            return;
        }

        match persistence::news_windows::today(&self.pool, today).await {
            Ok(windows) => {
                info!(count = windows.len(), "loaded today's avoid windows");
                *self.windows.write().await = windows;
                *self.loaded_date.write().await = Some(today);
                self.started.write().await.clear();
                self.ended.write().await.clear();
            }
            Err(e) => {
                warn!(error = %e, "failed to load avoid windows for today, keeping previous set");
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) {
        self.reload_if_new_day(now).await;

        let windows = self.windows.read().await.clone();
        for (i, window) in windows.iter().enumerate() {
            let already_started = self.started.read().await.contains(&i);
            if now >= window.start_time && !already_started {
                self.on_window_start(window).await;
                self.started.write().await.insert(i);
            }

            let already_ended = self.ended.read().await.contains(&i);
            let started = self.started.read().await.contains(&i);
            if started && now >= window.end_time && !already_ended {
                self.on_window_end(window, now).await;
                self.ended.write().await.insert(i);
            }
        }
    }

    async fn on_window_start(&self, window: &AvoidWindow) {
        let matching: Vec<&String> =
            self.symbols.iter().filter(|s| symbol_matches_currency(s, &window.currency)).collect();

        match self.broker.pending_orders().await {
            Ok(orders) => {
                for order in orders {
                    if !matching.iter().any(|s| s.as_str() == order.symbol) {
                        continue;
                    }
                    if let Err(e) = self.broker.cancel_trade(&order.ticket).await {
                        warn!(ticket = %order.ticket, error = %e, "failed to cancel pending order for avoid window");
                        continue;
                    }
                    self.canceled.write().await.insert(
                        order.ticket.clone(),
                        CanceledOrder {
                            symbol: order.symbol.clone(),
                            direction: order.direction,
                            volume: order.volume,
                            entry_price: order.entry_price,
                            sl: order.sl,
                            tp: order.tp,
                        },
                    );
                    self.emit(
                        EventType::PendingOrderCanceled,
                        EventPayload::PendingOrderCanceled { symbol: order.symbol.clone(), ticket: order.ticket.clone() },
                        &order.ticket,
                    )
                    .await;
                }
            }
            Err(e) => warn!(error = %e, "failed to fetch pending orders for avoid window start"),
        }

        match self.broker.open_positions().await {
            Ok(positions) => {
                for p in positions {
                    if !matching.iter().any(|s| s.as_str() == p.symbol) {
                        continue;
                    }
                    if p.profit.unwrap_or(0.0) >= 0.0 {
                        if let Err(e) = self.broker.close_trade(&p.ticket, Some("entering avoid window")).await {
                            warn!(ticket = %p.ticket, error = %e, "failed to close profitable position for avoid window");
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to fetch open positions for avoid window start"),
        }

        self.emit(
            EventType::AvoidWindowStarted,
            EventPayload::AvoidWindowStarted { currency: window.currency.clone(), event: window.event.clone() },
            &window.currency,
        )
        .await;
    }

    async fn on_window_end(&self, window: &AvoidWindow, now: DateTime<Utc>) {
        let canceled: Vec<(String, CanceledOrder)> = self.canceled.read().await.clone().into_iter().collect();

        for (ticket, order) in canceled {
            if !symbol_matches_currency(&order.symbol, &window.currency) {
                continue;
            }

            let mid = match self.broker.price(&order.symbol).await {
                Ok(q) => (q.bid + q.ask) / 2.0,
                Err(e) => {
                    warn!(symbol = %order.symbol, error = %e, "price unavailable, skipping re-entry check");
                    continue;
                }
            };

            let moved_pct = if order.entry_price != 0.0 {
                ((mid - order.entry_price) / order.entry_price).abs() * 100.0
            } else {
                100.0
            };

            if moved_pct > 1.0 {
                info!(symbol = %order.symbol, moved_pct, "entry condition no longer valid, not resubmitting");
                self.canceled.write().await.remove(&ticket);
                continue;
            }

            let resubmit = self
                .broker
                .open_trade(
                    &order.symbol,
                    order.direction,
                    OrderKind::Limit,
                    order.entry_price,
                    order.volume,
                    order.sl.unwrap_or(order.entry_price),
                    order.tp.unwrap_or(order.entry_price),
                    "smc_avoid_window_resubmit",
                    serde_json::json!({ "original_ticket": ticket }),
                )
                .await;

            match resubmit {
                Ok(resp) => {
                    self.emit(
                        EventType::PendingOrderResubmitted,
                        EventPayload::PendingOrderResubmitted {
                            symbol: order.symbol.clone(),
                            ticket: resp.ticket.unwrap_or(ticket.clone()),
                        },
                        &order.symbol,
                    )
                    .await;
                }
                Err(e) => warn!(symbol = %order.symbol, error = %e, "failed to resubmit order after avoid window"),
            }

            self.canceled.write().await.remove(&ticket);
        }

        let _ = now;
        self.emit(
            EventType::AvoidWindowEnded,
            EventPayload::AvoidWindowEnded { currency: window.currency.clone(), event: window.event.clone() },
            &window.currency,
        )
        .await;
    }

    async fn emit(&self, event_type: EventType, payload: EventPayload, key_suffix: &str) {
        let key = format!("{}|{}|{}", key_suffix, event_type.as_str(), Utc::now().timestamp_nanos_opt().unwrap_or_default());
        if let Err(e) = self.event_bus.publish(Event::new(event_type, payload, key)).await {
            warn!(error = %e, "failed to publish avoid window event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_matches_both_legs_of_pair() {
        assert!(symbol_matches_currency("EURUSD", "USD"));
        assert!(symbol_matches_currency("EURUSD", "EUR"));
        assert!(!symbol_matches_currency("XAUUSD", "GBP"));
    }
}
