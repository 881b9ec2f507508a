pub mod manager;

pub use manager::{RiskContext, RiskDecision, RiskManager};
