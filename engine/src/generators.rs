//! Witness validators: one generator per proof type.
//!
//! A generator validates and coerces request inputs, enforces business
//! invariants, assembles the witness and delegates proof construction to the
//! proving capability. Validation is exposed separately so that bad requests
//! (including insolvency refusals) are rejected before a job is ever
//! submitted.

use crate::errors::EngineError;
use crate::models::{ProofRequest, ProofStatus, ProofType, ZKProof};
use chrono::{Duration as ChronoDuration, Utc};
use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use zk_proofs::{Circuit, InputAssignment, ProofData, ProvingBackend, VerificationKey};

/// Circuit the balance generator requests from the backend.
pub const BALANCE_CIRCUIT_ID: &str = "balance_threshold_v1";

/// Circuit the solvency generator requests from the backend.
pub const SOLVENCY_CIRCUIT_ID: &str = "solvency_v1";

/// Dispatch table mapping each proof type to its generator.
pub type GeneratorRegistry = HashMap<ProofType, Arc<dyn ProofGenerator>>;

pub trait ProofGenerator: Send + Sync {
    /// Cheap synchronous validation; failures here block submission.
    fn validate_request(&self, request: &ProofRequest) -> Result<(), EngineError>;

    /// Build the witness and delegate to the proving capability.
    fn generate(&self, request: &ProofRequest) -> Result<ZKProof, EngineError>;

    fn supported_types(&self) -> &[ProofType];

    /// Static heuristic bucket, not a measured estimate.
    fn estimate_time(&self, request: &ProofRequest) -> Duration;
}

/// Attests `balance >= threshold` without revealing the balance.
pub struct BalanceGenerator {
    backend: Arc<dyn ProvingBackend>,
}

impl BalanceGenerator {
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self { backend }
    }

    fn coerced(&self, request: &ProofRequest) -> Result<(BigInt, BigInt), EngineError> {
        let threshold =
            coerce_bigint("threshold", required(&request.public_inputs, "threshold", "public")?)?;
        let balance =
            coerce_bigint("balance", required(&request.private_inputs, "balance", "private")?)?;
        Ok((threshold, balance))
    }
}

impl ProofGenerator for BalanceGenerator {
    fn validate_request(&self, request: &ProofRequest) -> Result<(), EngineError> {
        self.coerced(request).map(|_| ())
    }

    fn generate(&self, request: &ProofRequest) -> Result<ZKProof, EngineError> {
        let started = Instant::now();
        let (threshold, balance) = self.coerced(request)?;

        let circuit = self.backend.get_circuit(BALANCE_CIRCUIT_ID)?;
        circuit.compile()?;

        let mut public = InputAssignment::new();
        public.insert("threshold".to_string(), threshold.to_string());
        let mut private = InputAssignment::new();
        private.insert("balance".to_string(), balance.to_string());

        circuit.validate_inputs(&public, &private)?;
        let witness = circuit.generate_witness(&public, &private)?;
        let (proof, key) = circuit.prove(&witness)?;

        Ok(finish_proof(request, circuit.as_ref(), proof, key, None, started))
    }

    fn supported_types(&self) -> &[ProofType] {
        &[ProofType::BalanceThreshold]
    }

    fn estimate_time(&self, _request: &ProofRequest) -> Duration {
        Duration::from_secs(2)
    }
}

/// Attests `total_assets >= total_liabilities` against a committed account
/// set, anchored to the set's merkle root.
pub struct SolvencyGenerator {
    backend: Arc<dyn ProvingBackend>,
}

struct SolvencyInputs {
    merkle_root: String,
    timestamp: String,
    total_assets: Decimal,
    total_liabilities: Decimal,
    asset_proofs: String,
    liability_proofs: String,
}

impl SolvencyGenerator {
    pub fn new(backend: Arc<dyn ProvingBackend>) -> Self {
        Self { backend }
    }

    /// Validate presence of every field and refuse insolvent requests before
    /// the proving capability is ever touched.
    fn coerced(&self, request: &ProofRequest) -> Result<SolvencyInputs, EngineError> {
        let merkle_root =
            canonical_string(required(&request.public_inputs, "merkle_root", "public")?);
        let timestamp = canonical_string(required(&request.public_inputs, "timestamp", "public")?);
        let total_assets = coerce_decimal(
            "total_assets",
            required(&request.private_inputs, "total_assets", "private")?,
        )?;
        let total_liabilities = coerce_decimal(
            "total_liabilities",
            required(&request.private_inputs, "total_liabilities", "private")?,
        )?;
        let asset_proofs =
            canonical_string(required(&request.private_inputs, "asset_proofs", "private")?);
        let liability_proofs =
            canonical_string(required(&request.private_inputs, "liability_proofs", "private")?);

        if total_liabilities > total_assets {
            return Err(EngineError::Insolvent { assets: total_assets, liabilities: total_liabilities });
        }

        Ok(SolvencyInputs {
            merkle_root,
            timestamp,
            total_assets,
            total_liabilities,
            asset_proofs,
            liability_proofs,
        })
    }
}

impl ProofGenerator for SolvencyGenerator {
    fn validate_request(&self, request: &ProofRequest) -> Result<(), EngineError> {
        self.coerced(request).map(|_| ())
    }

    fn generate(&self, request: &ProofRequest) -> Result<ZKProof, EngineError> {
        let started = Instant::now();
        let inputs = self.coerced(request)?;

        let circuit = self.backend.get_circuit(SOLVENCY_CIRCUIT_ID)?;
        circuit.compile()?;

        let mut public = InputAssignment::new();
        public.insert("merkle_root".to_string(), inputs.merkle_root.clone());
        public.insert("timestamp".to_string(), inputs.timestamp);

        // The ownership-proof blobs travel into the witness untouched.
        let mut private = InputAssignment::new();
        private.insert("total_assets".to_string(), inputs.total_assets.normalize().to_string());
        private.insert(
            "total_liabilities".to_string(),
            inputs.total_liabilities.normalize().to_string(),
        );
        private.insert("asset_proofs".to_string(), inputs.asset_proofs);
        private.insert("liability_proofs".to_string(), inputs.liability_proofs);

        circuit.validate_inputs(&public, &private)?;
        let witness = circuit.generate_witness(&public, &private)?;
        let (proof, key) = circuit.prove(&witness)?;

        Ok(finish_proof(request, circuit.as_ref(), proof, key, Some(inputs.merkle_root), started))
    }

    fn supported_types(&self) -> &[ProofType] {
        &[ProofType::Solvency]
    }

    fn estimate_time(&self, _request: &ProofRequest) -> Duration {
        Duration::from_secs(30)
    }
}

/// Wrap a backend artifact into a `Generated` lifecycle record.
fn finish_proof(
    request: &ProofRequest,
    circuit: &dyn Circuit,
    proof: ProofData,
    key: VerificationKey,
    merkle_root: Option<String>,
    started: Instant,
) -> ZKProof {
    let now = Utc::now();
    ZKProof {
        id: Uuid::new_v4(),
        proof_type: request.proof_type,
        status: ProofStatus::Generated,
        circuit_id: circuit.identifier().to_string(),
        circuit_hash: circuit.hash().to_string(),
        public_inputs: request.public_inputs.clone(),
        proof: Some(proof),
        verification_key: Some(key),
        created_at: now,
        generated_at: Some(now),
        verified_at: None,
        generation_time_ms: Some(started.elapsed().as_millis() as u64),
        verification_time_ms: None,
        expires_at: request
            .options
            .expires_in_secs
            .map(|secs| now + ChronoDuration::seconds(secs as i64)),
        user_id: request.user_id.clone(),
        account_id: request.account_id.clone(),
        merkle_root,
        error: None,
    }
}

fn required<'a>(
    map: &'a BTreeMap<String, Value>,
    key: &str,
    which: &str,
) -> Result<&'a Value, EngineError> {
    map.get(key)
        .ok_or_else(|| EngineError::InputValidation(format!("missing {which} input '{key}'")))
}

/// Coerce a JSON value into an arbitrary-precision integer.
///
/// Accepts strings ("42", "42.9"), integers and floats; decimal forms are
/// truncated toward zero. Anything else is an unsupported representation.
fn coerce_bigint(key: &str, value: &Value) -> Result<BigInt, EngineError> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = BigInt::from_str(trimmed) {
                return Ok(int);
            }
            let decimal = Decimal::from_str(trimmed)
                .map_err(|_| EngineError::UnsupportedInputType { key: key.to_string() })?;
            decimal_to_bigint(key, &decimal)
        }
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Ok(BigInt::from(int))
            } else if let Some(int) = number.as_u64() {
                Ok(BigInt::from(int))
            } else if let Some(float) = number.as_f64() {
                let decimal = Decimal::try_from(float)
                    .map_err(|_| EngineError::UnsupportedInputType { key: key.to_string() })?;
                decimal_to_bigint(key, &decimal)
            } else {
                Err(EngineError::UnsupportedInputType { key: key.to_string() })
            }
        }
        _ => Err(EngineError::UnsupportedInputType { key: key.to_string() }),
    }
}

fn decimal_to_bigint(key: &str, decimal: &Decimal) -> Result<BigInt, EngineError> {
    BigInt::from_str(&decimal.trunc().normalize().to_string())
        .map_err(|_| EngineError::UnsupportedInputType { key: key.to_string() })
}

/// Coerce a JSON value into an exact decimal.
fn coerce_decimal(key: &str, value: &Value) -> Result<Decimal, EngineError> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim())
            .map_err(|_| EngineError::UnsupportedInputType { key: key.to_string() }),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Ok(Decimal::from(int))
            } else if let Some(int) = number.as_u64() {
                Ok(Decimal::from(int))
            } else if let Some(float) = number.as_f64() {
                Decimal::try_from(float)
                    .map_err(|_| EngineError::UnsupportedInputType { key: key.to_string() })
            } else {
                Err(EngineError::UnsupportedInputType { key: key.to_string() })
            }
        }
        _ => Err(EngineError::UnsupportedInputType { key: key.to_string() }),
    }
}

/// Pass non-numeric inputs (roots, timestamps, proof blobs) through in a
/// canonical string form.
fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
