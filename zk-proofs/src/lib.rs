//! Proving-capability boundary for the attestation engine.
//!
//! This crate contains:
//! - The `Circuit` / `ProvingBackend` contract the engine consumes.
//! - Opaque proof-artifact and verification-key types (BN254 group points).
//! - Serialization helpers for transporting proofs and keys.
//! - A deterministic hash-based development backend for tests and local runs.
//!
//! The engine never interprets curve arithmetic: everything it sees through
//! this crate is an identifier, a witness, or an encoded point.

pub mod circuit;
pub mod hashed;
pub mod types;

pub use circuit::{Circuit, CircuitError, InputAssignment, ProvingBackend};
pub use types::{G1Hex, G2Hex, ProofData, VerificationKey, Witness};
