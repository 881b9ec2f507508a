pub mod session;

pub use session::{is_trading_day, session_active, within_window};
