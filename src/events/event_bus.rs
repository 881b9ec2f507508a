/// Event bus: pub/sub with idempotency dedupe and an append-only JSONL log.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, warn};

use super::types::{Event, EventType};
use crate::error::{Result, TradingError};

pub type EventHandler =
    Arc<dyn Fn(Event) -> futures_util::future::BoxFuture<'static, Result<()>> + Send + Sync>;

pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<EventType, Vec<EventHandler>>>>,
    tx: mpsc::UnboundedSender<Event>,
    rx: Arc<RwLock<mpsc::UnboundedReceiver<Event>>>,
    /// Dedupe tracker keyed by `idempotency_key`, e.g. `(ticket, exit_time)`
    /// for `position_closed` replays from the webhook.
    processed_events: Arc<RwLock<HashSet<String>>>,
    event_log_path: String,
}

impl EventBus {
    pub fn new(event_log_path: String) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        EventBus {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            tx,
            rx: Arc::new(RwLock::new(rx)),
            processed_events: Arc::new(RwLock::new(HashSet::new())),
            event_log_path,
        }
    }

    pub async fn subscribe(&self, event_type: EventType, handler: EventHandler) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(event_type).or_insert_with(Vec::new).push(handler);
        debug!("subscribed handler to event: {}", event_type.as_str());
    }

    /// Publishes an event to all subscribers. Returns
    /// `TradingError::DuplicateEvent` if `idempotency_key` was already seen,
    /// without re-dispatching to handlers.
    pub async fn publish(&self, event: Event) -> Result<()> {
        {
            let mut processed = self.processed_events.write().await;
            if processed.contains(&event.idempotency_key) {
                warn!(
                    "duplicate event detected: {} ({})",
                    event.event_type.as_str(),
                    event.idempotency_key
                );
                return Err(TradingError::DuplicateEvent(event.idempotency_key.clone()));
            }
            processed.insert(event.idempotency_key.clone());
        }

        self.log_event(&event).await?;

        self.tx
            .send(event)
            .map_err(|e| TradingError::InternalError(format!("event dispatch failed: {}", e)))?;

        Ok(())
    }

    pub async fn start_processing(&self) {
        let subscribers = Arc::clone(&self.subscribers);
        let rx = Arc::clone(&self.rx);

        tokio::spawn(async move {
            let mut rx = rx.write().await;

            while let Some(event) = rx.recv().await {
                let event_type = event.event_type;

                debug!("processing event: {} at {}", event_type.as_str(), event.timestamp);

                let handlers = {
                    let subs = subscribers.read().await;
                    subs.get(&event_type).cloned()
                };

                if let Some(handlers) = handlers {
                    for handler in handlers {
                        let event_clone = event.clone();
                        match handler(event_clone).await {
                            Ok(_) => {
                                debug!("handler executed successfully for: {}", event_type.as_str());
                            }
                            Err(e) => {
                                error!(
                                    "handler failed for event {}: {} ({})",
                                    event_type.as_str(),
                                    e,
                                    e.error_code()
                                );
                            }
                        }
                    }
                } else {
                    debug!("no handlers registered for event: {}", event_type.as_str());
                }
            }
        });
    }

    async fn log_event(&self, event: &Event) -> Result<()> {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let json_line = serde_json::to_string(event)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.event_log_path)
            .await?;

        file.write_all(format!("{}\n", json_line).as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Replays persisted events from `from_timestamp` onward, for recovery
    /// after a restart.
    pub async fn replay_events(&self, from_timestamp: chrono::DateTime<chrono::Utc>) -> Result<Vec<Event>> {
        use tokio::fs::File;
        use tokio::io::{AsyncBufReadExt, BufReader};

        let file = File::open(&self.event_log_path).await?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let mut replayed = Vec::new();
        while let Some(line) = lines.next_line().await? {
            if let Ok(event) = serde_json::from_str::<Event>(&line) {
                if event.timestamp >= from_timestamp {
                    replayed.push(event);
                }
            }
        }

        Ok(replayed)
    }

    pub async fn processed_count(&self) -> usize {
        self.processed_events.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventPayload;

    fn temp_log_path(name: &str) -> String {
        std::env::temp_dir().join(name).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn publish_dispatches_to_subscriber() {
        let path = temp_log_path("smc_core_test_events.jsonl");
        let bus = EventBus::new(path.clone());

        let called = Arc::new(RwLock::new(false));
        let called_clone = Arc::clone(&called);
        let handler: EventHandler = Arc::new(move |_event| {
            let called = Arc::clone(&called_clone);
            Box::pin(async move {
                *called.write().await = true;
                Ok(())
            })
        });

        bus.subscribe(EventType::KillSwitchActivated, handler).await;
        bus.start_processing().await;

        let event = Event::new(
            EventType::KillSwitchActivated,
            EventPayload::KillSwitchActivated { reasons: vec!["daily loss".into()] },
            "ks-1".to_string(),
        );
        bus.publish(event).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(*called.read().await);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_is_rejected() {
        let path = temp_log_path("smc_core_test_idempotency.jsonl");
        let bus = EventBus::new(path.clone());
        bus.start_processing().await;

        let event = Event::new(
            EventType::PositionClosed,
            EventPayload::Error { message: "x".into() },
            "ticket-1|2026-01-01T00:00:00Z".to_string(),
        );

        assert!(bus.publish(event.clone()).await.is_ok());
        assert!(bus.publish(event).await.is_err());

        let _ = std::fs::remove_file(&path);
    }
}
