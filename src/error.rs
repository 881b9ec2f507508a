/// Centralized error types for the trading core.
use thiserror::Error;

/// The five-way error taxonomy. Every `TradingError` variant maps to exactly
/// one category via `TradingError::category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    TransientIo,
    InvalidInput,
    BusinessRejection,
    StrategyError,
    FatalStartup,
}

#[derive(Error, Debug)]
pub enum TradingError {
    // Network / broker I/O
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Broker API error: {code} - {message}")]
    BrokerApiError { code: String, message: String },

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    // Data
    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),

    #[error("Invalid candle data: {0}")]
    InvalidCandleData(String),

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),

    // Webhook / inbound validation
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),

    // Orders
    #[error("Order placement failed: {0}")]
    OrderPlacementFailed(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    // Risk / execution filters / kill-switch — business rejections
    #[error("Risk rejected: {0}")]
    RiskRejected(String),

    #[error("Execution filter rejected: {0:?}")]
    ExecutionFilterRejected(Vec<String>),

    #[error("Guardrail blocked: {0}")]
    GuardrailBlocked(String),

    #[error("Kill switch active: {0:?}")]
    KillSwitchActive(Vec<String>),

    // Strategy
    #[error("Strategy evaluation error: {0}")]
    StrategyError(String),

    // Configuration / startup
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Database unavailable: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Fatal startup error: {0}")]
    FatalStartup(String),

    // Generic
    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TradingError>;

impl TradingError {
    pub fn category(&self) -> ErrorCategory {
        use TradingError::*;
        match self {
            HttpError(_) | BrokerApiError { .. } | NetworkTimeout(_) | RateLimitExceeded(_)
            | DatabaseError(_) => ErrorCategory::TransientIo,

            InvalidPayload(_) | UnknownEventType(_) | InvalidCandleData(_) => {
                ErrorCategory::InvalidInput
            }

            RiskRejected(_)
            | ExecutionFilterRejected(_)
            | GuardrailBlocked(_)
            | KillSwitchActive(_)
            | OrderRejected(_)
            | InvalidVolume(_) => ErrorCategory::BusinessRejection,

            StrategyError(_) | InsufficientHistory(_) => ErrorCategory::StrategyError,

            ConfigError(_) | InvalidParameter(_) | FatalStartup(_) => ErrorCategory::FatalStartup,

            _ => ErrorCategory::TransientIo,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::TransientIo)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), ErrorCategory::FatalStartup)
    }

    /// Stable code for logs/monitoring.
    pub fn error_code(&self) -> &'static str {
        match self {
            TradingError::HttpError(_) => "NET_001",
            TradingError::BrokerApiError { .. } => "BROKER_001",
            TradingError::NetworkTimeout(_) => "NET_002",
            TradingError::RateLimitExceeded(_) => "NET_003",
            TradingError::InsufficientHistory(_) => "DATA_001",
            TradingError::InvalidCandleData(_) => "DATA_002",
            TradingError::MissingData(_) => "DATA_003",
            TradingError::DeserializationError(_) => "DATA_004",
            TradingError::InvalidPayload(_) => "WEBHOOK_001",
            TradingError::UnknownEventType(_) => "WEBHOOK_002",
            TradingError::DuplicateEvent(_) => "WEBHOOK_003",
            TradingError::OrderPlacementFailed(_) => "ORDER_001",
            TradingError::OrderRejected(_) => "ORDER_002",
            TradingError::InvalidVolume(_) => "ORDER_003",
            TradingError::RiskRejected(_) => "RISK_001",
            TradingError::ExecutionFilterRejected(_) => "FILTER_001",
            TradingError::GuardrailBlocked(_) => "GUARD_001",
            TradingError::KillSwitchActive(_) => "KILL_001",
            TradingError::StrategyError(_) => "STRAT_001",
            TradingError::ConfigError(_) => "CFG_001",
            TradingError::InvalidParameter(_) => "CFG_002",
            TradingError::DatabaseError(_) => "DB_001",
            TradingError::FileError(_) => "FILE_001",
            TradingError::FatalStartup(_) => "SYS_001",
            TradingError::InternalError(_) => "INT_001",
            TradingError::Other(_) => "GEN_001",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rejections_are_not_recoverable() {
        let e = TradingError::RiskRejected("daily loss cap hit".into());
        assert_eq!(e.category(), ErrorCategory::BusinessRejection);
        assert!(!e.is_recoverable());
        assert!(!e.is_fatal());
    }

    #[test]
    fn fatal_startup_is_marked_fatal() {
        let e = TradingError::ConfigError("missing broker base_url".into());
        assert!(e.is_fatal());
    }

    #[test]
    fn transient_io_is_recoverable() {
        let e = TradingError::NetworkTimeout("price feed".into());
        assert!(e.is_recoverable());
    }
}
