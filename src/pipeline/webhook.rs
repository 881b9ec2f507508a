/// `POST /api/v1/order-events`: the order-event webhook the broker bridge
/// calls into. Persists every event (deduped on `idempotency_key`) and, for
/// `position_closed`, invokes whatever callbacks were registered at boot —
/// `LivePnL` registers itself here instead of this module reaching back
/// into `LivePnL` directly, breaking the OrderEventSink/LivePnL/Database
/// cycle the same way the strategy/market-data cycle is broken.
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::{Event, EventPayload, EventType};
use crate::persistence::{self, Pool};
use crate::pipeline::live_pnl::PositionClosed;
use crate::types::TradeDirection;

pub type PositionClosedHandler = Arc<dyn Fn(PositionClosed) -> BoxFuture<'static, crate::error::Result<()>> + Send + Sync>;

#[derive(Clone)]
pub struct OrderEventSink {
    pool: Pool,
    on_position_closed: Arc<tokio::sync::RwLock<Vec<PositionClosedHandler>>>,
}

impl OrderEventSink {
    pub fn new(pool: Pool) -> Self {
        OrderEventSink { pool, on_position_closed: Arc::new(tokio::sync::RwLock::new(Vec::new())) }
    }

    pub async fn register_position_closed_handler(&self, handler: PositionClosedHandler) {
        self.on_position_closed.write().await.push(handler);
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/api/v1/order-events", post(handle_order_event)).with_state(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderEventRequest {
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub ticket: Option<String>,
    pub symbol: Option<String>,
    pub direction: Option<TradeDirection>,
    pub volume: Option<f64>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub commission: Option<f64>,
    pub swap: Option<f64>,
    pub profit: Option<f64>,
    pub reason: Option<String>,
    pub strategy: Option<String>,
    pub new_stop_loss: Option<f64>,
    pub volume_percent: Option<f64>,
    pub age_hours: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderEventResponse {
    pub accepted: bool,
    pub duplicate: bool,
}

async fn handle_order_event(
    State(sink): State<Arc<OrderEventSink>>,
    Json(req): Json<OrderEventRequest>,
) -> Result<Json<OrderEventResponse>, (StatusCode, String)> {
    let event_type = EventType::from_wire(&req.event_type)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown event type: {}", req.event_type)))?;

    let payload = build_payload(event_type, &req).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let idempotency_key = format!(
        "{}|{}|{}",
        req.ticket.as_deref().unwrap_or(&req.source),
        req.event_type,
        req.timestamp.timestamp_nanos_opt().unwrap_or_default()
    );

    let mut event = Event::new(event_type, payload.clone(), idempotency_key);
    event.timestamp = req.timestamp;

    let inserted = persistence::order_events::insert(&sink.pool, req.ticket.as_deref(), req.symbol.as_deref(), &event)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if !inserted {
        info!(source = %req.source, event_type = %req.event_type, "duplicate order event, ignoring");
        return Ok(Json(OrderEventResponse { accepted: true, duplicate: true }));
    }

    if event_type == EventType::PositionClosed {
        if let Some(closed) = build_position_closed(&req) {
            let handlers = sink.on_position_closed.read().await;
            for handler in handlers.iter() {
                if let Err(e) = handler(closed.clone()).await {
                    warn!(error = %e, "position_closed handler failed");
                }
            }
        }
    }

    Ok(Json(OrderEventResponse { accepted: true, duplicate: false }))
}

fn build_position_closed(req: &OrderEventRequest) -> Option<PositionClosed> {
    Some(PositionClosed {
        ticket: req.ticket.clone()?,
        symbol: req.symbol.clone()?,
        direction: req.direction?,
        volume: req.volume?,
        entry_price: req.entry_price?,
        exit_price: req.exit_price?,
        entry_time: req.entry_time.unwrap_or(req.timestamp),
        exit_time: req.exit_time.unwrap_or(req.timestamp),
        commission: req.commission.unwrap_or(0.0),
        swap: req.swap.unwrap_or(0.0),
        profit_gross: req.profit.unwrap_or(0.0),
        reason: req.reason.clone().unwrap_or_default(),
        strategy: req.strategy.clone(),
    })
}

/// Maps the flat webhook body onto the event's native payload shape,
/// rejecting requests missing fields their event type requires.
fn build_payload(event_type: EventType, req: &OrderEventRequest) -> Result<EventPayload, String> {
    let ticket = || req.ticket.clone().ok_or_else(|| "missing ticket".to_string());
    let symbol = || req.symbol.clone().ok_or_else(|| "missing symbol".to_string());

    Ok(match event_type {
        EventType::OrderSent => EventPayload::OrderSent {
            ticket: req.ticket.clone(),
            symbol: symbol()?,
            direction: req.direction.ok_or("missing direction")?,
            volume: req.volume.ok_or("missing volume")?,
        },
        EventType::OrderRejected => {
            EventPayload::OrderRejected { symbol: symbol()?, reason: req.reason.clone().unwrap_or_default() }
        }
        EventType::PositionOpened => EventPayload::PositionOpened {
            ticket: ticket()?,
            symbol: symbol()?,
            direction: req.direction.ok_or("missing direction")?,
            volume: req.volume.ok_or("missing volume")?,
            entry_price: req.entry_price.ok_or("missing entry_price")?,
        },
        EventType::PositionModified => {
            EventPayload::PositionModified { ticket: ticket()?, stop_loss: req.new_stop_loss, take_profit: None }
        }
        EventType::PositionClosed => EventPayload::PositionClosed {
            ticket: ticket()?,
            symbol: symbol()?,
            direction: req.direction.ok_or("missing direction")?,
            volume: req.volume.ok_or("missing volume")?,
            entry_price: req.entry_price.ok_or("missing entry_price")?,
            exit_price: req.exit_price.ok_or("missing exit_price")?,
            commission: req.commission.unwrap_or(0.0),
            swap: req.swap.unwrap_or(0.0),
            profit_gross: req.profit.unwrap_or(0.0),
            reason: req.reason.clone().unwrap_or_default(),
            exit_time: req.exit_time.unwrap_or(req.timestamp),
        },
        EventType::SlHit => EventPayload::SlHit { ticket: ticket()? },
        EventType::TpHit => EventPayload::TpHit { ticket: ticket()? },
        EventType::PartialClose => {
            EventPayload::PartialClose { ticket: ticket()?, volume_percent: req.volume_percent.unwrap_or(0.0) }
        }
        EventType::BreakEvenSet => {
            EventPayload::BreakEvenSet { ticket: ticket()?, new_stop_loss: req.new_stop_loss.ok_or("missing new_stop_loss")? }
        }
        EventType::TrailSlMove => {
            EventPayload::TrailSlMove { ticket: ticket()?, new_stop_loss: req.new_stop_loss.ok_or("missing new_stop_loss")? }
        }
        EventType::TimeExit => EventPayload::TimeExit { ticket: ticket()?, age_hours: req.age_hours.unwrap_or(0.0) },
        EventType::CommissionExit => EventPayload::CommissionExit { ticket: ticket()? },
        EventType::KillSwitchForcedExit => EventPayload::KillSwitchForcedExit { ticket: ticket()? },
        EventType::AutoExitStructureBreak => {
            EventPayload::AutoExitStructureBreak { ticket: ticket()?, reason: req.reason.clone().unwrap_or_default() }
        }
        EventType::Error => EventPayload::Error { message: req.message.clone().unwrap_or_default() },
        _ => return Err(format!("event type {:?} is not a valid inbound webhook event", event_type)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_event_type_string_is_rejected() {
        assert!(EventType::from_wire("not_a_real_event").is_none());
    }

    #[test]
    fn known_event_type_round_trips() {
        let parsed = EventType::from_wire("position_closed").unwrap();
        assert_eq!(parsed.as_str(), "position_closed");
    }
}
