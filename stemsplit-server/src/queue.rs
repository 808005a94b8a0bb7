//! Separation queue
//!
//! Serializes access to the model. Jobs are taken in FIFO order by a fixed
//! pool of workers (default 1); each worker runs separate, package and
//! store for one job, then replies to the submitter. The number of workers
//! is the upper bound on concurrent model calls.
//!
//! Job lifecycle: `Queued -> Running -> Completed | Failed`. Failed jobs
//! are reported to their submitter and never retried.
//!
//! Shutdown stops new submissions immediately; jobs already queued are
//! drained before the workers exit.

use crate::error::{Result, SeparationError};
use crate::model::{validate_stems, SeparationModel};
use crate::packager::ResultPackager;
use crate::storage::{FileKind, StorageGateway, StorageLocation};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use stemsplit_common::config::QueueConfig;
use stemsplit_common::NormalizedAudio;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Successful job result
#[derive(Debug, Clone)]
pub struct JobOutput {
    pub job_id: Uuid,
    /// Where the stems archive was stored
    pub location: StorageLocation,
    /// Archive entry order
    pub stems: Vec<String>,
    pub archive_bytes: usize,
    pub completed_at: DateTime<Utc>,
}

struct SeparationJob {
    id: Uuid,
    audio: NormalizedAudio,
    submitted_at: Instant,
    reply: oneshot::Sender<Result<JobOutput>>,
}

#[derive(Debug, Default)]
struct QueueCounters {
    queued: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time queue statistics
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub workers: usize,
    pub capacity: Option<usize>,
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Everything a worker needs to run one job
struct JobRunner {
    model: Arc<dyn SeparationModel>,
    packager: ResultPackager,
    storage: Arc<dyn StorageGateway>,
}

/// Cloneable submission side of the queue
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<SeparationJob>,
    counters: Arc<QueueCounters>,
    workers: usize,
    capacity: Option<usize>,
    shutdown: CancellationToken,
}

impl QueueHandle {
    /// Enqueue audio and wait for its job to finish.
    ///
    /// # Errors
    /// * `QueueClosed` - the queue is shutting down
    /// * `QueueFull` - the configured number of waiting jobs is reached
    /// * any error the job itself failed with
    pub async fn submit(&self, audio: NormalizedAudio) -> Result<JobOutput> {
        if self.shutdown.is_cancelled() {
            return Err(SeparationError::QueueClosed);
        }

        let waiting = self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if let Some(capacity) = self.capacity {
            if waiting >= capacity {
                self.counters.queued.fetch_sub(1, Ordering::SeqCst);
                warn!(capacity, "Rejecting job: separation queue full");
                return Err(SeparationError::QueueFull(capacity));
            }
        }

        let (reply, response) = oneshot::channel();
        let job = SeparationJob {
            id: Uuid::new_v4(),
            audio,
            submitted_at: Instant::now(),
            reply,
        };
        let job_id = job.id;
        let frames = job.audio.frames();

        if self.tx.send(job).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(SeparationError::QueueClosed);
        }

        info!(
            job_id = %job_id,
            state = %JobState::Queued,
            frames,
            waiting = waiting + 1,
            "Job queued"
        );

        response.await.map_err(|_| {
            SeparationError::ModelFailure(format!("job {} was dropped by its worker", job_id))
        })?
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            workers: self.workers,
            capacity: self.capacity,
            queued: self.counters.queued.load(Ordering::SeqCst),
            running: self.counters.running.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Owner of the worker pool
pub struct SeparationQueue {
    handle: QueueHandle,
    workers: Vec<JoinHandle<()>>,
}

impl SeparationQueue {
    /// Spawn `config.workers` workers sharing one FIFO.
    pub fn start(
        config: &QueueConfig,
        model: Arc<dyn SeparationModel>,
        packager: ResultPackager,
        storage: Arc<dyn StorageGateway>,
    ) -> Self {
        let worker_count = config.workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(QueueCounters::default());
        let shutdown = CancellationToken::new();
        let runner = Arc::new(JobRunner {
            model,
            packager,
            storage,
        });

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&runner),
                    Arc::clone(&counters),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            workers = worker_count,
            capacity = ?config.capacity,
            "Separation queue started"
        );

        Self {
            handle: QueueHandle {
                tx,
                counters,
                workers: worker_count,
                capacity: config.capacity,
                shutdown,
            },
            workers,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.handle.stats()
    }

    /// Stop accepting jobs, finish the ones already queued, and wait for
    /// every worker to exit.
    pub async fn shutdown(self) {
        let pending = self.handle.counters.queued.load(Ordering::SeqCst);
        info!(pending, "Separation queue shutting down");
        self.handle.shutdown.cancel();

        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Separation worker panicked: {}", e);
            }
        }
        info!("Separation queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<SeparationJob>>>,
    runner: Arc<JobRunner>,
    counters: Arc<QueueCounters>,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Separation worker started");

    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                job = rx.recv() => job,
                _ = shutdown.cancelled() => {
                    // Close intake, then keep draining what is already queued
                    rx.close();
                    rx.recv().await
                }
            }
        };

        let Some(job) = next else {
            break;
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.running.fetch_add(1, Ordering::SeqCst);

        let job_id = job.id;
        let waited_ms = job.submitted_at.elapsed().as_millis() as u64;
        info!(job_id = %job_id, worker_id, state = %JobState::Running, waited_ms, "Job started");

        let started = Instant::now();
        let result = run_job(&runner, job_id, job.audio).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        counters.running.fetch_sub(1, Ordering::SeqCst);
        match &result {
            Ok(output) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
                info!(
                    job_id = %job_id,
                    state = %JobState::Completed,
                    elapsed_ms,
                    archive_bytes = output.archive_bytes,
                    "Job completed: {}",
                    output.location
                );
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(
                    job_id = %job_id,
                    state = %JobState::Failed,
                    elapsed_ms,
                    code = e.code(),
                    "Job failed: {}",
                    e
                );
            }
        }

        if job.reply.send(result).is_err() {
            debug!(job_id = %job_id, "Submitter went away before job finished");
        }
    }

    debug!(worker_id, "Separation worker exiting");
}

/// Separate, package and store one job.
async fn run_job(runner: &JobRunner, job_id: Uuid, audio: NormalizedAudio) -> Result<JobOutput> {
    let model = Arc::clone(&runner.model);
    let packager = runner.packager.clone();

    // Model and zip encoding are both CPU-bound
    let (archive, stems) = tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, Vec<String>)> {
        let raw = model.separate(&audio)?;
        let stems = validate_stems(model.sources(), &audio, raw)?;
        let archive = packager.package(&stems, model.sources())?;
        Ok((archive, stems.into_iter().map(|s| s.name).collect()))
    })
    .await
    .map_err(|e| SeparationError::ModelFailure(format!("job {} panicked: {}", job_id, e)))??;

    let archive_bytes = archive.len();
    let location = runner.storage.store(archive, FileKind::Archive, true).await?;

    Ok(JobOutput {
        job_id,
        location,
        stems,
        archive_bytes,
        completed_at: Utc::now(),
    })
}
