pub mod idempotency;

pub use idempotency::generate_idempotency_key;
