//! Job scheduler / worker pool.
//!
//! A fixed set of N workers drains one bounded queue of capacity 2N.
//! Submission is non-blocking (fail-fast backpressure), dispatch is strictly
//! queue order, and every job execution is wrapped in its own timeout
//! independent of pool-wide cancellation. Progress delivery is latest-wins
//! and lossy by design: a single-slot channel that drops older snapshots
//! under load rather than growing without bound.

use crate::errors::EngineError;
use crate::generators::GeneratorRegistry;
use crate::models::{GenerationProgress, JobPriority, ProofRequest, ProofStatus, ZKProof};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hard ceiling on a single proof-generation attempt.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent workers. The queue holds twice as many jobs.
    pub workers: usize,
    /// Per-job ceiling; request options may lower it, never raise it.
    pub job_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 4, job_timeout: DEFAULT_JOB_TIMEOUT }
    }
}

/// One tracked, cancellable unit of proving work.
///
/// The job exclusively owns its proof record from submission to terminal
/// outcome. `priority` is carried for callers but the pool dispatches in
/// queue order only.
pub struct Job {
    pub id: Uuid,
    pub proof: ZKProof,
    pub request: ProofRequest,
    pub priority: JobPriority,
    progress: watch::Sender<GenerationProgress>,
    result: oneshot::Sender<Result<ZKProof, EngineError>>,
}

/// Caller-side view of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub proof_id: Uuid,
    /// Latest-wins progress snapshots; intermediate updates may be dropped.
    pub progress: watch::Receiver<GenerationProgress>,
    /// Resolves at most once with the terminal outcome. Dropped without a
    /// value when the pool abandons the job during shutdown.
    pub result: oneshot::Receiver<Result<ZKProof, EngineError>>,
}

impl Job {
    pub fn new(proof: ZKProof, request: ProofRequest) -> (Self, JobHandle) {
        let (progress_tx, progress_rx) = watch::channel(GenerationProgress::queued(proof.id));
        let (result_tx, result_rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let priority = request.options.priority;

        let handle =
            JobHandle { job_id: id, proof_id: proof.id, progress: progress_rx, result: result_rx };
        let job = Job { id, proof, request, priority, progress: progress_tx, result: result_tx };
        (job, handle)
    }
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

pub struct WorkerPool {
    config: PoolConfig,
    queue_tx: mpsc::Sender<Job>,
    queue_rx: SharedQueue,
    cancel_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
    generators: Arc<GeneratorRegistry>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, generators: Arc<GeneratorRegistry>) -> Self {
        let workers = config.workers.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(workers * 2);
        let (cancel_tx, _) = watch::channel(false);

        Self {
            config: PoolConfig { workers, ..config },
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            cancel_tx,
            shutting_down: AtomicBool::new(false),
            generators,
            workers: Vec::new(),
        }
    }

    /// Launch the workers. Call once.
    pub fn start(&mut self) {
        for worker_id in 0..self.config.workers {
            let worker = Worker {
                worker_id,
                queue: self.queue_rx.clone(),
                cancel: self.cancel_tx.subscribe(),
                generators: self.generators.clone(),
                timeout_ceiling: self.config.job_timeout,
            };
            self.workers.push(tokio::spawn(worker.run()));
        }
        info!(workers = self.config.workers, "worker pool started");
    }

    /// Non-blocking enqueue. Fails fast when the queue is at capacity or the
    /// pool has begun stopping; never blocks the submitter.
    pub fn submit(&self, job: Job) -> Result<(), EngineError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(EngineError::PoolShuttingDown);
        }
        self.queue_tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EngineError::PoolShuttingDown,
        })
    }

    /// Stop accepting work, cancel the workers, and wait for them to exit.
    ///
    /// No job execution begins after this returns. Jobs still queued are
    /// abandoned: not executed, not reported — their handles observe closed
    /// channels.
    pub async fn stop(&mut self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let _ = self.cancel_tx.send(true);
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!("worker pool stopped");
    }
}

struct Worker {
    worker_id: usize,
    queue: SharedQueue,
    cancel: watch::Receiver<bool>,
    generators: Arc<GeneratorRegistry>,
    timeout_ceiling: Duration,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let job = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => break,
                job = next_job(&self.queue) => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.process(job).await;
        }
        debug!(worker_id = self.worker_id, "worker exited");
    }

    async fn process(&mut self, job: Job) {
        let Job { id, mut proof, request, priority: _, progress, result } = job;

        if let Err(err) = proof.mark_generating() {
            warn!(job_id = %id, proof_id = %proof.id, %err, "job skipped");
            return;
        }

        let Some(generator) = self.generators.get(&request.proof_type).cloned() else {
            let err = EngineError::InputValidation(format!(
                "no generator registered for proof type {:?}",
                request.proof_type
            ));
            proof.mark_failed(err.to_string());
            let _ = progress.send(
                GenerationProgress::new(proof.id, ProofStatus::Failed, 1.0, "failed")
                    .with_error(err.to_string()),
            );
            self.deliver(result, Err(err));
            return;
        };

        let _ = progress.send(
            GenerationProgress::new(proof.id, ProofStatus::Generating, 0.1, "starting")
                .with_eta(generator.estimate_time(&request)),
        );
        debug!(job_id = %id, proof_id = %proof.id, worker_id = self.worker_id, "job started");

        let timeout = job_timeout(self.timeout_ceiling, &request);
        let attempt_request = request.clone();
        let attempt = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || generator.generate(&attempt_request)),
        );

        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => {
                // Pool shutdown wins: the blocking attempt keeps running
                // detached and its result is discarded unreported.
                warn!(job_id = %id, proof_id = %proof.id, "job abandoned by pool shutdown");
                return;
            }
            attempt = attempt => match attempt {
                Err(_) => Err(EngineError::Timeout(timeout)),
                Ok(Err(join_err)) => Err(EngineError::Internal(format!("proving task failed: {join_err}"))),
                Ok(Ok(generated)) => generated,
            },
        };

        match outcome {
            Ok(generated) => {
                let completed = proof.adopt(generated);
                let _ = progress.send(GenerationProgress::new(
                    completed.id,
                    ProofStatus::Generated,
                    1.0,
                    "complete",
                ));
                debug!(job_id = %id, proof_id = %completed.id, "job complete");
                self.deliver(result, Ok(completed));
            }
            Err(err) => {
                proof.mark_failed(err.to_string());
                let _ = progress.send(
                    GenerationProgress::new(proof.id, ProofStatus::Failed, 1.0, "failed")
                        .with_error(err.to_string()),
                );
                warn!(job_id = %id, proof_id = %proof.id, %err, "job failed");
                self.deliver(result, Err(err));
            }
        }
    }

    /// Result delivery honors cancellation: once shutdown fires, outcomes
    /// are dropped rather than reported.
    fn deliver(&self, slot: oneshot::Sender<Result<ZKProof, EngineError>>, outcome: Result<ZKProof, EngineError>) {
        if *self.cancel.borrow() {
            return;
        }
        let _ = slot.send(outcome);
    }
}

/// Resolves once the cancellation flag flips to true (or the pool is gone).
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow_and_update() {
        if cancel.changed().await.is_err() {
            break;
        }
    }
}

async fn next_job(queue: &SharedQueue) -> Option<Job> {
    queue.lock().await.recv().await
}

fn job_timeout(ceiling: Duration, request: &ProofRequest) -> Duration {
    match request.options.timeout_secs {
        Some(secs) => ceiling.min(Duration::from_secs(secs)),
        None => ceiling,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{BalanceGenerator, ProofGenerator, SolvencyGenerator};
    use crate::models::{ProofOptions, ProofRequest, ProofType};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use zk_proofs::hashed::HashedBackend;

    fn registry() -> Arc<GeneratorRegistry> {
        let backend = Arc::new(HashedBackend::new());
        let mut registry = GeneratorRegistry::new();
        registry.insert(
            ProofType::BalanceThreshold,
            Arc::new(BalanceGenerator::new(backend.clone())) as Arc<dyn ProofGenerator>,
        );
        registry.insert(
            ProofType::Solvency,
            Arc::new(SolvencyGenerator::new(backend)) as Arc<dyn ProofGenerator>,
        );
        Arc::new(registry)
    }

    fn balance_request() -> ProofRequest {
        let mut public = BTreeMap::new();
        public.insert("threshold".to_string(), json!("1000"));
        let mut private = BTreeMap::new();
        private.insert("balance".to_string(), json!("2500"));
        ProofRequest {
            proof_type: ProofType::BalanceThreshold,
            user_id: "user-1".into(),
            account_id: "acct-1".into(),
            public_inputs: public,
            private_inputs: private,
            options: ProofOptions::default(),
        }
    }

    fn make_job() -> (Job, JobHandle) {
        let request = balance_request();
        Job::new(ZKProof::pending(&request), request)
    }

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        // Workers not started: 2N slots fill, the (2N+1)th submission fails.
        let pool = WorkerPool::new(
            PoolConfig { workers: 2, ..PoolConfig::default() },
            registry(),
        );

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (job, handle) = make_job();
            pool.submit(job).unwrap();
            handles.push(handle);
        }

        let (job, _handle) = make_job();
        assert!(matches!(pool.submit(job), Err(EngineError::QueueFull)));
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let mut pool = WorkerPool::new(PoolConfig::default(), registry());
        pool.start();
        pool.stop().await;

        let (job, _handle) = make_job();
        assert!(matches!(pool.submit(job), Err(EngineError::PoolShuttingDown)));
    }

    #[tokio::test]
    async fn jobs_execute_and_deliver_results() {
        let mut pool = WorkerPool::new(
            PoolConfig { workers: 2, ..PoolConfig::default() },
            registry(),
        );
        pool.start();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (job, handle) = make_job();
            pool.submit(job).unwrap();
            handles.push(handle);
        }

        for handle in handles {
            let proof = handle.result.await.expect("delivered").expect("generated");
            assert_eq!(proof.id, handle.proof_id);
            assert_eq!(proof.status, ProofStatus::Generated);
            assert!(proof.is_valid());
        }

        pool.stop().await;
    }

    #[tokio::test]
    async fn progress_converges_to_the_terminal_snapshot() {
        let mut pool = WorkerPool::new(
            PoolConfig { workers: 1, ..PoolConfig::default() },
            registry(),
        );
        pool.start();

        let (job, mut handle) = make_job();
        pool.submit(job).unwrap();

        let snapshot = handle
            .progress
            .wait_for(|p| p.status.is_terminal())
            .await
            .expect("progress channel open")
            .clone();
        assert_eq!(snapshot.status, ProofStatus::Generated);
        assert_eq!(snapshot.progress, 1.0);
        assert_eq!(snapshot.stage, "complete");
        assert!(snapshot.error.is_none());

        pool.stop().await;
    }

    #[tokio::test]
    async fn failed_generation_is_reported_with_its_reason() {
        let mut pool = WorkerPool::new(
            PoolConfig { workers: 1, ..PoolConfig::default() },
            registry(),
        );
        pool.start();

        // Valid enough to pass synchronous checks the pool never runs, but
        // the generator rejects it during execution.
        let mut request = balance_request();
        request.private_inputs.clear();
        let (job, mut handle) = Job::new(ZKProof::pending(&request), request);
        pool.submit(job).unwrap();

        let err = handle.result.await.expect("delivered").unwrap_err();
        assert!(matches!(err, EngineError::InputValidation(_)));

        let snapshot = handle
            .progress
            .wait_for(|p| p.status.is_terminal())
            .await
            .expect("progress channel open")
            .clone();
        assert_eq!(snapshot.status, ProofStatus::Failed);
        assert!(snapshot.error.is_some());

        pool.stop().await;
    }

    #[tokio::test]
    async fn slow_jobs_hit_the_per_job_timeout() {
        struct SlowGenerator;
        impl ProofGenerator for SlowGenerator {
            fn validate_request(&self, _request: &ProofRequest) -> Result<(), EngineError> {
                Ok(())
            }
            fn generate(&self, _request: &ProofRequest) -> Result<ZKProof, EngineError> {
                std::thread::sleep(Duration::from_millis(300));
                Err(EngineError::Internal("unreachable".into()))
            }
            fn supported_types(&self) -> &[ProofType] {
                &[ProofType::BalanceThreshold]
            }
            fn estimate_time(&self, _request: &ProofRequest) -> Duration {
                Duration::ZERO
            }
        }

        let mut registry = GeneratorRegistry::new();
        registry.insert(ProofType::BalanceThreshold, Arc::new(SlowGenerator) as Arc<dyn ProofGenerator>);

        let mut pool = WorkerPool::new(
            PoolConfig { workers: 1, job_timeout: Duration::from_millis(50) },
            Arc::new(registry),
        );
        pool.start();

        let (job, handle) = make_job();
        pool.submit(job).unwrap();

        let err = handle.result.await.expect("delivered").unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));

        pool.stop().await;
    }

    #[tokio::test]
    async fn request_timeout_option_lowers_but_never_raises_the_ceiling() {
        let mut request = balance_request();
        request.options.timeout_secs = Some(10);
        assert_eq!(job_timeout(DEFAULT_JOB_TIMEOUT, &request), Duration::from_secs(10));

        request.options.timeout_secs = Some(9_000);
        assert_eq!(job_timeout(DEFAULT_JOB_TIMEOUT, &request), DEFAULT_JOB_TIMEOUT);

        request.options.timeout_secs = None;
        assert_eq!(job_timeout(DEFAULT_JOB_TIMEOUT, &request), DEFAULT_JOB_TIMEOUT);
    }

    /// Blocks inside `generate` until the test releases it, counting every
    /// invocation.
    struct GateGenerator {
        started: Arc<AtomicUsize>,
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ProofGenerator for GateGenerator {
        fn validate_request(&self, _request: &ProofRequest) -> Result<(), EngineError> {
            Ok(())
        }
        fn generate(&self, _request: &ProofRequest) -> Result<ZKProof, EngineError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.lock().unwrap().recv();
            Err(EngineError::Internal("released".into()))
        }
        fn supported_types(&self) -> &[ProofType] {
            &[ProofType::BalanceThreshold]
        }
        fn estimate_time(&self, _request: &ProofRequest) -> Duration {
            Duration::ZERO
        }
    }

    #[tokio::test]
    async fn stop_abandons_queued_jobs_unexecuted_and_unreported() {
        let started = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = std::sync::mpsc::channel();

        let mut registry = GeneratorRegistry::new();
        registry.insert(
            ProofType::BalanceThreshold,
            Arc::new(GateGenerator {
                started: started.clone(),
                gate: std::sync::Mutex::new(release_rx),
            }) as Arc<dyn ProofGenerator>,
        );

        let mut pool = WorkerPool::new(
            PoolConfig { workers: 1, ..PoolConfig::default() },
            Arc::new(registry),
        );
        pool.start();

        let (first, first_handle) = make_job();
        pool.submit(first).unwrap();

        // Wait until the single worker is inside the first job.
        while started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (queued, queued_handle) = make_job();
        pool.submit(queued).unwrap();

        pool.stop().await;
        drop(pool);
        let _ = release_tx.send(());

        // The in-flight job was abandoned at delivery, the queued one never
        // ran at all; neither handle sees a result.
        assert!(first_handle.result.await.is_err());
        assert!(queued_handle.result.await.is_err());
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}
