//! Proof service: the seam between callers and the scheduling core.
//!
//! The service owns the generator registry and the worker pool. Requests are
//! validated synchronously — malformed inputs and business refusals never
//! reach the queue — then wrapped into a tracked job whose handle the caller
//! keeps for the result and for progress polling.

use crate::errors::EngineError;
use crate::generators::{BalanceGenerator, GeneratorRegistry, ProofGenerator, SolvencyGenerator};
use crate::models::{GenerationProgress, ProofRequest, ZKProof};
use crate::pool::{Job, JobHandle, PoolConfig, WorkerPool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;
use zk_proofs::ProvingBackend;

pub struct ProofService {
    pool: WorkerPool,
    registry: Arc<GeneratorRegistry>,
    progress: RwLock<HashMap<Uuid, watch::Receiver<GenerationProgress>>>,
}

impl ProofService {
    /// Build the default generator set against `backend` and start the pool.
    pub fn start(backend: Arc<dyn ProvingBackend>, config: PoolConfig) -> Self {
        let generators: Vec<Arc<dyn ProofGenerator>> = vec![
            Arc::new(BalanceGenerator::new(backend.clone())),
            Arc::new(SolvencyGenerator::new(backend)),
        ];

        let mut registry = GeneratorRegistry::new();
        for generator in generators {
            for proof_type in generator.supported_types() {
                registry.insert(*proof_type, generator.clone());
            }
        }
        let registry = Arc::new(registry);

        let mut pool = WorkerPool::new(config, registry.clone());
        pool.start();

        Self { pool, registry, progress: RwLock::new(HashMap::new()) }
    }

    /// Validate, create the `Pending` record, submit the job.
    ///
    /// Validation and business-rule failures (including insolvency) are
    /// returned here and nothing is submitted; queue backpressure surfaces
    /// as `QueueFull` without blocking.
    pub fn request_proof(&self, request: ProofRequest) -> Result<JobHandle, EngineError> {
        let generator = self.registry.get(&request.proof_type).ok_or_else(|| {
            EngineError::InputValidation(format!(
                "unsupported proof type: {:?}",
                request.proof_type
            ))
        })?;
        generator.validate_request(&request)?;

        let proof = ZKProof::pending(&request);
        let (job, handle) = Job::new(proof, request);
        self.pool.submit(job)?;

        self.progress_map().insert(handle.proof_id, handle.progress.clone());
        info!(proof_id = %handle.proof_id, job_id = %handle.job_id, "proof job submitted");
        Ok(handle)
    }

    /// Latest progress snapshot for a proof, if tracked. Terminal snapshots
    /// are pruned once observed, so the map stays bounded by in-flight work.
    pub fn progress(&self, proof_id: Uuid) -> Option<GenerationProgress> {
        let mut map = self.progress_map();
        let snapshot = map.get(&proof_id).map(|rx| rx.borrow().clone())?;
        if snapshot.status.is_terminal() {
            map.remove(&proof_id);
        }
        Some(snapshot)
    }

    /// Stop the pool. Queued-but-unstarted jobs are abandoned.
    pub async fn shutdown(mut self) {
        self.pool.stop().await;
    }

    fn progress_map(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, watch::Receiver<GenerationProgress>>> {
        // A poisoned lock only means a panicking reader; the map is still
        // usable.
        self.progress.write().unwrap_or_else(|e| e.into_inner())
    }
}
