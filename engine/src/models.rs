//! Domain records: accounts, proof requests, lifecycle records, progress.

use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;
use zk_proofs::{ProofData, VerificationKey};

/// Immutable account snapshot fed into commitment-tree construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Exact decimal balance; never a binary float.
    pub balance: Decimal,
    pub currency: String,
    /// Monotonically increasing per-account nonce.
    pub nonce: u64,
}

impl Account {
    pub fn new(
        id: impl Into<String>,
        balance: Decimal,
        currency: impl Into<String>,
        nonce: u64,
    ) -> Self {
        Self { id: id.into(), balance, currency: currency.into(), nonce }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    BalanceThreshold,
    Solvency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Request-level options.
///
/// `priority` is carried on every job but dispatch is strictly queue order;
/// see the pool docs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofOptions {
    /// Lowers the per-job timeout ceiling; never raises it.
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub priority: JobPriority,
    /// Batch-grouping hint for callers that aggregate related proofs.
    pub batch_with: Option<Uuid>,
    /// Offset from generation time after which the proof expires.
    pub expires_in_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRequest {
    pub proof_type: ProofType,
    pub user_id: String,
    pub account_id: String,
    pub public_inputs: BTreeMap<String, Value>,
    pub private_inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub options: ProofOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Pending,
    Generating,
    Generated,
    Failed,
    Verified,
}

impl ProofStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProofStatus::Generated | ProofStatus::Failed | ProofStatus::Verified)
    }
}

/// The lifecycle record tracking one proof from request to terminal outcome.
///
/// Created `Pending` at request-validation time and owned by exactly one job
/// for its lifetime. "Expired" is a computed predicate, never a stored
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZKProof {
    pub id: Uuid,
    pub proof_type: ProofType,
    pub status: ProofStatus,
    pub circuit_id: String,
    pub circuit_hash: String,
    pub public_inputs: BTreeMap<String, Value>,
    pub proof: Option<ProofData>,
    pub verification_key: Option<VerificationKey>,
    pub created_at: DateTime<Utc>,
    pub generated_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub generation_time_ms: Option<u64>,
    pub verification_time_ms: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub account_id: String,
    /// Root the proof is anchored to, when the statement references one.
    pub merkle_root: Option<String>,
    /// Terminal failure reason. Lives here, never in `public_inputs`.
    pub error: Option<String>,
}

impl ZKProof {
    /// Fresh record in `Pending`. Circuit fields are filled in once a
    /// generator completes the attempt.
    pub fn pending(request: &ProofRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            proof_type: request.proof_type,
            status: ProofStatus::Pending,
            circuit_id: String::new(),
            circuit_hash: String::new(),
            public_inputs: request.public_inputs.clone(),
            proof: None,
            verification_key: None,
            created_at: Utc::now(),
            generated_at: None,
            verified_at: None,
            generation_time_ms: None,
            verification_time_ms: None,
            expires_at: None,
            user_id: request.user_id.clone(),
            account_id: request.account_id.clone(),
            merkle_root: None,
            error: None,
        }
    }

    pub fn mark_generating(&mut self) -> Result<(), EngineError> {
        match self.status {
            ProofStatus::Pending => {
                self.status = ProofStatus::Generating;
                Ok(())
            }
            other => Err(EngineError::InvalidTransition(format!("{other:?} -> generating"))),
        }
    }

    /// Fold a generator-produced record into this tracked one, keeping the
    /// identity and creation time established at request time.
    pub fn adopt(self, generated: ZKProof) -> ZKProof {
        ZKProof { id: self.id, created_at: self.created_at, ..generated }
    }

    /// Records the terminal failure reason on the dedicated error field.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = ProofStatus::Failed;
        self.error = Some(reason.into());
    }

    /// Idempotent from `Verified`; valid only from `Generated` otherwise.
    pub fn mark_verified(&mut self, verification_time: Duration) -> Result<(), EngineError> {
        match self.status {
            ProofStatus::Verified => Ok(()),
            ProofStatus::Generated => {
                self.status = ProofStatus::Verified;
                self.verified_at = Some(Utc::now());
                self.verification_time_ms = Some(verification_time.as_millis() as u64);
                Ok(())
            }
            other => Err(EngineError::InvalidTransition(format!("{other:?} -> verified"))),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expired_at(Utc::now())
    }

    pub(crate) fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }

    /// A proof is usable only when generated or verified, carrying both its
    /// artifact and key, and not yet expired.
    pub fn is_valid(&self) -> bool {
        matches!(self.status, ProofStatus::Generated | ProofStatus::Verified)
            && self.proof.is_some()
            && self.verification_key.is_some()
            && !self.is_expired()
    }
}

/// Point-in-time progress snapshot for one proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationProgress {
    pub proof_id: Uuid,
    pub status: ProofStatus,
    /// Fractional completion in [0.0, 1.0].
    pub progress: f64,
    pub stage: String,
    pub eta_secs: Option<u64>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationProgress {
    pub fn new(proof_id: Uuid, status: ProofStatus, progress: f64, stage: impl Into<String>) -> Self {
        Self {
            proof_id,
            status,
            progress: progress.clamp(0.0, 1.0),
            stage: stage.into(),
            eta_secs: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn queued(proof_id: Uuid) -> Self {
        Self::new(proof_id, ProofStatus::Pending, 0.0, "queued")
    }

    pub fn with_eta(mut self, eta: Duration) -> Self {
        self.eta_secs = Some(eta.as_secs());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use zk_proofs::ProvingBackend;

    fn request() -> ProofRequest {
        ProofRequest {
            proof_type: ProofType::BalanceThreshold,
            user_id: "user-1".into(),
            account_id: "acct-1".into(),
            public_inputs: BTreeMap::new(),
            private_inputs: BTreeMap::new(),
            options: ProofOptions::default(),
        }
    }

    #[test]
    fn pending_to_generating_to_failed() {
        let mut proof = ZKProof::pending(&request());
        assert_eq!(proof.status, ProofStatus::Pending);

        proof.mark_generating().unwrap();
        assert_eq!(proof.status, ProofStatus::Generating);
        // Starting twice is a lifecycle bug.
        assert!(proof.mark_generating().is_err());

        proof.mark_failed("prover unreachable");
        assert_eq!(proof.status, ProofStatus::Failed);
        assert_eq!(proof.error.as_deref(), Some("prover unreachable"));
        // The reason never leaks into the circuit inputs.
        assert!(proof.public_inputs.is_empty());
    }

    #[test]
    fn verified_is_idempotent_and_terminal() {
        let mut proof = ZKProof::pending(&request());
        proof.status = ProofStatus::Generated;

        proof.mark_verified(Duration::from_millis(12)).unwrap();
        assert_eq!(proof.status, ProofStatus::Verified);
        let first_verified_at = proof.verified_at;

        proof.mark_verified(Duration::from_millis(99)).unwrap();
        assert_eq!(proof.verified_at, first_verified_at);
        assert_eq!(proof.verification_time_ms, Some(12));

        let mut failed = ZKProof::pending(&request());
        failed.mark_failed("boom");
        assert!(failed.mark_verified(Duration::ZERO).is_err());
    }

    #[test]
    fn expiry_is_computed_not_stored() {
        let mut proof = ZKProof::pending(&request());
        proof.status = ProofStatus::Generated;
        proof.expires_at = Some(Utc::now() + ChronoDuration::hours(1));

        assert!(!proof.is_expired());
        assert!(proof.expired_at(Utc::now() + ChronoDuration::hours(2)));
        // Status is untouched by expiry checks.
        assert_eq!(proof.status, ProofStatus::Generated);
    }

    #[test]
    fn validity_requires_artifact_key_and_freshness() {
        let mut proof = ZKProof::pending(&request());
        assert!(!proof.is_valid());

        proof.status = ProofStatus::Generated;
        assert!(!proof.is_valid(), "artifact and key are still missing");

        let backend = zk_proofs::hashed::HashedBackend::new();
        let circuit = backend.get_circuit(zk_proofs::hashed::BALANCE_CIRCUIT_ID).unwrap();
        let mut public = zk_proofs::InputAssignment::new();
        public.insert("threshold".into(), "1".into());
        let mut private = zk_proofs::InputAssignment::new();
        private.insert("balance".into(), "2".into());
        let witness = circuit.generate_witness(&public, &private).unwrap();
        let (data, key) = circuit.prove(&witness).unwrap();

        proof.proof = Some(data);
        proof.verification_key = Some(key);
        assert!(proof.is_valid());

        proof.expires_at = Some(Utc::now() - ChronoDuration::seconds(1));
        assert!(!proof.is_valid());
    }

    #[test]
    fn progress_fraction_is_clamped() {
        let progress = GenerationProgress::new(Uuid::new_v4(), ProofStatus::Generating, 1.7, "x");
        assert_eq!(progress.progress, 1.0);
        let progress = GenerationProgress::new(Uuid::new_v4(), ProofStatus::Generating, -0.2, "x");
        assert_eq!(progress.progress, 0.0);
    }

    #[test]
    fn account_balances_are_exact_decimals() {
        let account = Account::new("a-1", dec!(0.1) + dec!(0.2), "USD", 0);
        assert_eq!(account.balance, dec!(0.3));
    }
}
