//! Core engine for privacy-preserving attestations.
//!
//! This crate contains:
//! - The account commitment tree: deterministic roots and verifiable
//!   inclusion proofs over a set of accounts.
//! - Witness validators for balance-threshold and solvency statements.
//! - The job scheduler / worker pool that turns a proof request into a
//!   tracked, cancellable, timeout-bounded unit of work.
//! - Proof lifecycle records and progress reporting.
//!
//! The actual proving math lives behind the `zk-proofs` capability contract;
//! this crate never interprets curve arithmetic.

pub mod errors;
pub mod generators;
pub mod merkle;
pub mod models;
pub mod pool;
pub mod service;

pub use errors::EngineError;
pub use merkle::{MerkleProof, MerkleTree};
pub use models::{
    Account, GenerationProgress, ProofOptions, ProofRequest, ProofStatus, ProofType, ZKProof,
};
pub use pool::{Job, JobHandle, PoolConfig, WorkerPool};
pub use service::ProofService;
