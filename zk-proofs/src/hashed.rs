//! Deterministic hash-based development backend.
//!
//! This backend satisfies the proving-capability contract without any
//! constraint system: artifacts are curve points derived from a SHA-256
//! digest of the witness, so a proof binds to its inputs and is stable
//! across runs.
//!
//! SECURITY NOTE: proofs from this backend are commitments, not
//! zero-knowledge proofs. They exist for tests and local development only.

use crate::circuit::{Circuit, CircuitError, InputAssignment, ProvingBackend};
use crate::types::{G1Hex, G2Hex, ProofData, VerificationKey, Witness};
use ark_bn254::{Fr, G1Affine, G2Affine};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::PrimeField;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Circuit identifier for the balance-threshold statement.
pub const BALANCE_CIRCUIT_ID: &str = "balance_threshold_v1";

/// Circuit identifier for the solvency statement.
pub const SOLVENCY_CIRCUIT_ID: &str = "solvency_v1";

/// Development backend serving one hash-based circuit per supported statement.
pub struct HashedBackend {
    circuits: BTreeMap<String, Arc<dyn Circuit>>,
}

impl HashedBackend {
    pub fn new() -> Self {
        let mut circuits: BTreeMap<String, Arc<dyn Circuit>> = BTreeMap::new();
        for circuit in [
            HashedCircuit::new(BALANCE_CIRCUIT_ID, &["threshold"], &["balance"]),
            HashedCircuit::new(
                SOLVENCY_CIRCUIT_ID,
                &["merkle_root", "timestamp"],
                &["total_assets", "total_liabilities", "asset_proofs", "liability_proofs"],
            ),
        ] {
            circuits.insert(circuit.identifier.clone(), Arc::new(circuit));
        }
        Self { circuits }
    }
}

impl Default for HashedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvingBackend for HashedBackend {
    fn get_circuit(&self, id: &str) -> Result<Arc<dyn Circuit>, CircuitError> {
        self.circuits
            .get(id)
            .cloned()
            .ok_or_else(|| CircuitError::CircuitNotFound(id.to_string()))
    }
}

#[derive(Debug)]
struct HashedCircuit {
    identifier: String,
    hash: String,
    required_public: Vec<String>,
    required_private: Vec<String>,
}

impl HashedCircuit {
    fn new(identifier: &str, public: &[&str], private: &[&str]) -> Self {
        // The circuit hash commits to the identifier and the input layout.
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        for key in public {
            hasher.update(b"|pub:");
            hasher.update(key.as_bytes());
        }
        for key in private {
            hasher.update(b"|priv:");
            hasher.update(key.as_bytes());
        }

        Self {
            identifier: identifier.to_string(),
            hash: hex::encode(hasher.finalize()),
            required_public: public.iter().map(|k| k.to_string()).collect(),
            required_private: private.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn witness_digest(&self, witness: &Witness) -> Result<[u8; 32], CircuitError> {
        let bytes =
            serde_json::to_vec(witness).map_err(|e| CircuitError::Serialization(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(self.identifier.as_bytes());
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }

    fn key_seed(&self) -> Result<[u8; 32], CircuitError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(&self.hash, &mut seed)
            .map_err(|e| CircuitError::Serialization(e.to_string()))?;
        Ok(seed)
    }
}

fn derive_scalar(tag: &str, seed: &[u8; 32]) -> Fr {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update(seed);
    let digest: [u8; 32] = hasher.finalize().into();
    Fr::from_le_bytes_mod_order(&digest)
}

fn derive_g1(tag: &str, seed: &[u8; 32]) -> G1Hex {
    G1Hex::from_affine(&(G1Affine::generator() * derive_scalar(tag, seed)).into_affine())
}

fn derive_g2(tag: &str, seed: &[u8; 32]) -> G2Hex {
    G2Hex::from_affine(&(G2Affine::generator() * derive_scalar(tag, seed)).into_affine())
}

impl Circuit for HashedCircuit {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn hash(&self) -> &str {
        &self.hash
    }

    fn compile(&self) -> Result<(), CircuitError> {
        // Nothing to compile for the hash-based stand-in.
        Ok(())
    }

    fn validate_inputs(
        &self,
        public: &InputAssignment,
        private: &InputAssignment,
    ) -> Result<(), CircuitError> {
        for key in &self.required_public {
            if !public.contains_key(key) {
                return Err(CircuitError::InvalidInputs(format!("missing public input '{key}'")));
            }
        }
        for key in &self.required_private {
            if !private.contains_key(key) {
                return Err(CircuitError::InvalidInputs(format!("missing private input '{key}'")));
            }
        }
        Ok(())
    }

    fn generate_witness(
        &self,
        public: &InputAssignment,
        private: &InputAssignment,
    ) -> Result<Witness, CircuitError> {
        self.validate_inputs(public, private)?;
        Ok(Witness { public: public.clone(), private: private.clone() })
    }

    fn prove(&self, witness: &Witness) -> Result<(ProofData, VerificationKey), CircuitError> {
        let digest = self.witness_digest(witness)?;
        let proof = ProofData {
            a: derive_g1("a", &digest),
            b: derive_g2("b", &digest),
            c: derive_g1("c", &digest),
        };

        // The key commits to the circuit, not the witness, so every proof
        // from the same circuit shares a key.
        let seed = self.key_seed()?;
        let mut ic = Vec::with_capacity(witness.public.len() + 1);
        ic.push(derive_g1("ic0", &seed));
        for key in witness.public.keys() {
            ic.push(derive_g1(&format!("ic:{key}"), &seed));
        }

        let key = VerificationKey {
            alpha_g1: derive_g1("alpha", &seed),
            beta_g2: derive_g2("beta", &seed),
            gamma_g2: derive_g2("gamma", &seed),
            delta_g2: derive_g2("delta", &seed),
            ic,
        };

        Ok((proof, key))
    }
}
