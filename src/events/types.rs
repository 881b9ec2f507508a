/// Event definitions for the trading core.
use crate::types::{OrderKind, TradeDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub idempotency_key: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(event_type: EventType, payload: EventPayload, idempotency_key: String) -> Self {
        Event {
            event_type,
            timestamp: Utc::now(),
            idempotency_key,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // Order lifecycle, mirrors the broker's order-event webhook vocabulary.
    OrderSent,
    OrderRejected,
    PositionOpened,
    PositionModified,
    PositionClosed,
    SlHit,
    TpHit,
    PartialClose,
    BreakEvenSet,
    TrailSlMove,
    TimeExit,
    CommissionExit,
    KillSwitchForcedExit,
    AutoExitStructureBreak,
    Error,

    // Decision pipeline
    SignalGenerated,
    SignalSkipped,
    DecisionRecorded,

    // Kill switch
    KillSwitchActivated,
    KillSwitchDeactivated,

    // Avoid window
    AvoidWindowStarted,
    AvoidWindowEnded,
    PendingOrderCanceled,
    PendingOrderResubmitted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderSent => "order_sent",
            EventType::OrderRejected => "order_rejected",
            EventType::PositionOpened => "position_opened",
            EventType::PositionModified => "position_modified",
            EventType::PositionClosed => "position_closed",
            EventType::SlHit => "sl_hit",
            EventType::TpHit => "tp_hit",
            EventType::PartialClose => "partial_close",
            EventType::BreakEvenSet => "break_even_set",
            EventType::TrailSlMove => "trail_sl_move",
            EventType::TimeExit => "time_exit",
            EventType::CommissionExit => "commission_exit",
            EventType::KillSwitchForcedExit => "kill_switch_forced_exit",
            EventType::AutoExitStructureBreak => "auto_exit_structure_break",
            EventType::Error => "error",
            EventType::SignalGenerated => "signal_generated",
            EventType::SignalSkipped => "signal_skipped",
            EventType::DecisionRecorded => "decision_recorded",
            EventType::KillSwitchActivated => "kill_switch_activated",
            EventType::KillSwitchDeactivated => "kill_switch_deactivated",
            EventType::AvoidWindowStarted => "avoid_window_started",
            EventType::AvoidWindowEnded => "avoid_window_ended",
            EventType::PendingOrderCanceled => "pending_order_canceled",
            EventType::PendingOrderResubmitted => "pending_order_resubmitted",
        }
    }

    /// Parses an inbound webhook's `event_type` string. Unknown strings are
    /// rejected by the caller with `TradingError::UnknownEventType`.
    pub fn from_wire(s: &str) -> Option<Self> {
        Some(match s {
            "order_sent" => EventType::OrderSent,
            "order_rejected" => EventType::OrderRejected,
            "position_opened" => EventType::PositionOpened,
            "position_modified" => EventType::PositionModified,
            "position_closed" => EventType::PositionClosed,
            "sl_hit" => EventType::SlHit,
            "tp_hit" => EventType::TpHit,
            "partial_close" => EventType::PartialClose,
            "break_even_set" => EventType::BreakEvenSet,
            "trail_sl_move" => EventType::TrailSlMove,
            "time_exit" => EventType::TimeExit,
            "commission_exit" => EventType::CommissionExit,
            "kill_switch_forced_exit" => EventType::KillSwitchForcedExit,
            "auto_exit_structure_break" => EventType::AutoExitStructureBreak,
            "error" => EventType::Error,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    SignalGenerated {
        symbol: String,
        direction: TradeDirection,
        entry: f64,
        sl: f64,
        tp: f64,
        order_kind: OrderKind,
        confluence_score: f64,
    },
    SignalSkipped {
        symbol: String,
        reasons: Vec<String>,
    },
    DecisionRecorded {
        symbol: String,
        account_id: Option<String>,
        traded: bool,
    },

    OrderSent {
        ticket: Option<String>,
        symbol: String,
        direction: TradeDirection,
        volume: f64,
    },
    OrderRejected {
        symbol: String,
        reason: String,
    },
    PositionOpened {
        ticket: String,
        symbol: String,
        direction: TradeDirection,
        volume: f64,
        entry_price: f64,
    },
    PositionModified {
        ticket: String,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    PositionClosed {
        ticket: String,
        symbol: String,
        direction: TradeDirection,
        volume: f64,
        entry_price: f64,
        exit_price: f64,
        commission: f64,
        swap: f64,
        profit_gross: f64,
        reason: String,
        exit_time: DateTime<Utc>,
    },
    SlHit {
        ticket: String,
    },
    TpHit {
        ticket: String,
    },
    PartialClose {
        ticket: String,
        volume_percent: f64,
    },
    BreakEvenSet {
        ticket: String,
        new_stop_loss: f64,
    },
    TrailSlMove {
        ticket: String,
        new_stop_loss: f64,
    },
    TimeExit {
        ticket: String,
        age_hours: f64,
    },
    CommissionExit {
        ticket: String,
    },
    KillSwitchForcedExit {
        ticket: String,
    },
    AutoExitStructureBreak {
        ticket: String,
        reason: String,
    },
    Error {
        message: String,
    },

    KillSwitchActivated {
        reasons: Vec<String>,
    },
    KillSwitchDeactivated {
        reason: String,
    },

    AvoidWindowStarted {
        currency: String,
        event: String,
    },
    AvoidWindowEnded {
        currency: String,
        event: String,
    },
    PendingOrderCanceled {
        symbol: String,
        ticket: String,
    },
    PendingOrderResubmitted {
        symbol: String,
        ticket: String,
    },
}
