pub mod client;
pub mod guardrail;

pub use client::BrokerClient;
pub use guardrail::GuardrailClient;
