//! The top-level decision pipeline: everything that sits between a strategy
//! signal and a placed (or skipped) order, plus the ambient services around
//! it (news avoid windows, realized PnL, the decision log, the inbound
//! order-event webhook).
pub mod avoid_window;
pub mod decision_log;
pub mod dispatcher;
pub mod execution_filter;
pub mod guardrail;
pub mod live_pnl;
pub mod webhook;

pub use avoid_window::AvoidWindowManager;
pub use decision_log::{DecisionLog, PerformanceReport};
pub use dispatcher::{AccountRuntime, Dispatcher};
pub use execution_filter::{ExecutionContext, ExecutionFilter, ExecutionVerdict};
pub use guardrail::Guardrail;
pub use live_pnl::{LivePnL, PositionClosed};
pub use webhook::{OrderEventSink, PositionClosedHandler};
