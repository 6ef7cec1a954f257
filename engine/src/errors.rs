use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;
use zk_proofs::CircuitError;

/// Engine-wide error taxonomy.
///
/// Validation and business-rule errors are returned synchronously and block
/// job submission entirely; scheduling and execution errors are captured in
/// the job's result slot and mirrored into the proof record's `Failed`
/// status. The engine never retries; retry policy is a caller concern.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request input: {0}")]
    InputValidation(String),

    #[error("unsupported input type for '{key}': expected string, integer, decimal or float")]
    UnsupportedInputType { key: String },

    /// Business refusal, distinct from any technical failure: the system
    /// must never attest to a false solvency claim.
    #[error("insolvent: liabilities {liabilities} exceed assets {assets}")]
    Insolvent { assets: Decimal, liabilities: Decimal },

    #[error(transparent)]
    Circuit(#[from] CircuitError),

    #[error("job queue full")]
    QueueFull,

    #[error("worker pool is shutting down")]
    PoolShuttingDown,

    #[error("proof generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot build a tree from zero accounts")]
    EmptyInput,

    #[error("malformed leaf value: {0}")]
    LeafParse(String),

    #[error("invalid lifecycle transition: {0}")]
    InvalidTransition(String),

    #[error("internal error: {0}")]
    Internal(String),
}
