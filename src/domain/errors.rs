use rust_decimal::Decimal;
use thiserror::Error;

/// Failures of the per-symbol decision pipeline. Each variant maps to a fail-closed reaction.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Model contract mismatch for {symbol}: expected {expected} features, got {actual}")]
    ModelContractMismatch {
        symbol: String,
        expected: usize,
        actual: usize,
    },

    #[error("Broker rejected request for {symbol}: {reason}")]
    BrokerRejection { symbol: String, reason: String },

    #[error("Insufficient margin for {symbol}: need {required}, free {available}")]
    MarginInsufficient {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Connectivity lost: {reason}")]
    ConnectivityLoss { reason: String },
}

impl DecisionError {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        DecisionError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and skip reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionError::DataUnavailable { .. } => "data_unavailable",
            DecisionError::ModelContractMismatch { .. } => "model_contract_mismatch",
            DecisionError::BrokerRejection { .. } => "broker_rejection",
            DecisionError::MarginInsufficient { .. } => "margin_insufficient",
            DecisionError::ConnectivityLoss { .. } => "connectivity_loss",
        }
    }
}

/// Rows that cannot be turned into a model input vector.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Feature row is missing field '{name}'")]
    MissingField { name: String },

    #[error("Feature '{name}' is not finite")]
    NonFinite { name: String },

    #[error("Feature schema version mismatch: expected v{expected}, got v{actual}")]
    VersionMismatch { expected: u32, actual: u32 },
}

#[derive(Debug, Error, PartialEq)]
pub enum TargetingError {
    #[error("Stop equals entry, risk is zero")]
    ZeroRisk,

    #[error("Stop is on the wrong side of entry")]
    WrongSide,
}
