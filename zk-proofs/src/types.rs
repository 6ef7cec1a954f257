//! Types shared between proving backends and the host-side engine.

use ark_bn254::{G1Affine, G2Affine};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON-friendly representation of a BN254 G1 point.
///
/// Points are exposed as hex strings of the canonical compressed encoding so
/// all components agree without interpreting curve arithmetic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct G1Hex {
    pub hex: String,
}

impl G1Hex {
    pub fn from_affine(point: &G1Affine) -> Self {
        let mut bytes = Vec::new();
        point
            .serialize_compressed(&mut bytes)
            .expect("in-memory serialization");
        Self { hex: hex::encode(bytes) }
    }

    pub fn to_affine(&self) -> Result<G1Affine, String> {
        let bytes = hex::decode(&self.hex).map_err(|e| format!("invalid hex: {e}"))?;
        G1Affine::deserialize_compressed(&bytes[..]).map_err(|e| format!("invalid point bytes: {e}"))
    }
}

/// JSON-friendly representation of a BN254 G2 point. See [`G1Hex`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct G2Hex {
    pub hex: String,
}

impl G2Hex {
    pub fn from_affine(point: &G2Affine) -> Self {
        let mut bytes = Vec::new();
        point
            .serialize_compressed(&mut bytes)
            .expect("in-memory serialization");
        Self { hex: hex::encode(bytes) }
    }

    pub fn to_affine(&self) -> Result<G2Affine, String> {
        let bytes = hex::decode(&self.hex).map_err(|e| format!("invalid hex: {e}"))?;
        G2Affine::deserialize_compressed(&bytes[..]).map_err(|e| format!("invalid point bytes: {e}"))
    }
}

/// The combined public/private input assignment a circuit proves against.
///
/// Values are canonical strings. Both maps iterate in key order, so the
/// serialized form of a witness is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub public: BTreeMap<String, String>,
    pub private: BTreeMap<String, String>,
}

/// Opaque proof artifact: two G1 points (A, C) and one G2 point (B).
///
/// The engine stores and transports this; it never inspects the points.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofData {
    pub a: G1Hex,
    pub b: G2Hex,
    pub c: G1Hex,
}

/// Public artifact needed to check a proof without the private witness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey {
    pub alpha_g1: G1Hex,
    pub beta_g2: G2Hex,
    pub gamma_g2: G2Hex,
    pub delta_g2: G2Hex,
    /// Ordered input-commitment points, one per public input plus one.
    pub ic: Vec<G1Hex>,
}

/// Encode a proof artifact for transport.
pub fn encode_proof(proof: &ProofData) -> Result<String, String> {
    let bytes = serde_json::to_vec(proof).map_err(|e| format!("encode proof: {e}"))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub fn decode_proof(encoded: &str) -> Result<ProofData, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid proof bytes: {e}"))
}

/// Encode a verification key for transport.
pub fn encode_verification_key(key: &VerificationKey) -> Result<String, String> {
    let bytes = serde_json::to_vec(key).map_err(|e| format!("encode key: {e}"))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub fn decode_verification_key(encoded: &str) -> Result<VerificationKey, String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("invalid base64: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid key bytes: {e}"))
}
