pub mod manager;

pub use manager::{KillSwitch, KillSwitchContext, Transition};
