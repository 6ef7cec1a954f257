//! The capability contract a proving backend must satisfy.
//!
//! The engine addresses circuits by identifier, hands them canonical
//! string-valued input assignments, and treats everything it gets back as
//! opaque data. Backends are interchangeable: a hash-based stand-in, an
//! external proving service, or a real SNARK stack all fit behind these two
//! traits.

use crate::types::{ProofData, VerificationKey, Witness};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("circuit not found: {0}")]
    CircuitNotFound(String),

    #[error("invalid circuit inputs: {0}")]
    InvalidInputs(String),

    #[error("witness construction failed: {0}")]
    Witness(String),

    #[error("prover error: {0}")]
    Prover(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Canonical string-valued input assignment handed to a circuit.
///
/// Keys are unique by construction; iteration order is deterministic.
pub type InputAssignment = BTreeMap<String, String>;

/// One proving circuit, e.g. "balance >= threshold".
pub trait Circuit: Send + Sync + std::fmt::Debug {
    /// Stable identifier, e.g. `balance_threshold_v1`.
    fn identifier(&self) -> &str;

    /// Hash binding the circuit version into generated proofs.
    fn hash(&self) -> &str;

    /// Compile the circuit. Idempotent; backends cache the result.
    fn compile(&self) -> Result<(), CircuitError>;

    /// Check that the assignments carry everything this circuit needs.
    fn validate_inputs(
        &self,
        public: &InputAssignment,
        private: &InputAssignment,
    ) -> Result<(), CircuitError>;

    /// Assemble the witness for one proof.
    fn generate_witness(
        &self,
        public: &InputAssignment,
        private: &InputAssignment,
    ) -> Result<Witness, CircuitError>;

    /// Construct the proof artifact and its verification key.
    fn prove(&self, witness: &Witness) -> Result<(ProofData, VerificationKey), CircuitError>;
}

/// A proving backend: a set of circuits addressable by identifier.
pub trait ProvingBackend: Send + Sync {
    fn get_circuit(&self, id: &str) -> Result<Arc<dyn Circuit>, CircuitError>;
}
