//! Dispatch control loop.
//!
//! Each worker repeatedly admits one job against the latest resource snapshot
//! and the capacity ledger, runs it through the retry manager, and routes the
//! terminal outcome. Lock order is queue, then ledger; the two are never held
//! together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{DispatcherConfig, RetryPolicy};
use crate::core::events::{EventSink, SchedulerEvent};
use crate::core::executor::{ExecutionContext, JobExecutor};
use crate::core::job::{Job, JobStatus};
use crate::core::job_queue::JobQueue;
use crate::core::repository::JobRepository;
use crate::core::resource::{ResourceMonitor, ResourceState};
use crate::core::retry::{RecoveryStrategy, RetryFailure, RetryManager};
use crate::util::clock::now_ms;
use crate::util::serde::{JobId, ResourceUnits};

/// What one dispatch pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Admission is paused by device state.
    Paused(ResourceState),
    /// Nothing pending.
    Idle,
    /// Every scanned job was deferred for lack of capacity.
    Deferred(usize),
    /// A job ran to success.
    Completed(JobId),
    /// A job failed permanently.
    Failed(JobId),
    /// A job was cancelled.
    Cancelled(JobId),
}

/// Dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Jobs that passed admission.
    pub admitted: u64,
    /// Jobs requeued for lack of capacity.
    pub deferred: u64,
    /// Passes skipped because the device was critical or unavailable.
    pub paused: u64,
    /// Successful jobs.
    pub completed: u64,
    /// Permanently failed jobs.
    pub failed: u64,
    /// Cancelled jobs.
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    deferred: AtomicU64,
    paused: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            paused: self.paused.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

enum Admission {
    Paused(ResourceState),
    Idle,
    Deferred(usize),
    Admitted {
        job: Job,
        cost: ResourceUnits,
        multiplier: f64,
        token: CancellationToken,
    },
}

/// Ledger units a job of `cost` reserves under `multiplier`, rounded up.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn admitted_cost(cost: ResourceUnits, multiplier: f64) -> ResourceUnits {
    let multiplier = if multiplier.is_finite() {
        multiplier.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (cost as f64 * multiplier).ceil() as ResourceUnits
}

/// Whether a job of `cost` fits a ledger of `capacity` in the most throttled admitting state.
#[must_use]
pub fn can_ever_fit(cost: ResourceUnits, capacity: ResourceUnits) -> bool {
    admitted_cost(cost, ResourceState::lowest_admitting_multiplier()) <= capacity
}

/// Admission control plus execution for queued jobs.
pub struct Dispatcher<E: JobExecutor> {
    queue: Arc<JobQueue>,
    monitor: Arc<ResourceMonitor>,
    retry: Arc<RetryManager>,
    repository: Arc<dyn JobRepository>,
    events: Arc<dyn EventSink>,
    executor: E,
    config: DispatcherConfig,
    retry_defaults: RetryPolicy,
    shutdown: CancellationToken,
    inflight: Mutex<HashMap<JobId, CancellationToken>>,
    counters: Counters,
}

impl<E: JobExecutor> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.config.worker_count)
            .field("in_flight", &self.inflight.lock().len())
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl<E: JobExecutor> Dispatcher<E> {
    /// Wire a dispatcher. `shutdown` stops the workers and cancels in-flight jobs.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        queue: Arc<JobQueue>,
        monitor: Arc<ResourceMonitor>,
        retry: Arc<RetryManager>,
        repository: Arc<dyn JobRepository>,
        events: Arc<dyn EventSink>,
        executor: E,
        config: DispatcherConfig,
        retry_defaults: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            monitor,
            retry,
            repository,
            events,
            executor,
            config,
            retry_defaults,
            shutdown,
            inflight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Jobs currently admitted and executing.
    #[must_use]
    pub fn in_flight(&self) -> Vec<JobId> {
        self.inflight.lock().keys().copied().collect()
    }

    /// Request cancellation of an in-flight job.
    ///
    /// A job caught between dequeue and admission gets a pre-cancelled token
    /// and stops before its first attempt. A running attempt is not
    /// interrupted; the job ends at its next attempt boundary. Returns `false`
    /// when the job is not in flight.
    pub fn cancel_in_flight(&self, id: &JobId) -> bool {
        if !self.queue.is_in_flight(id) {
            return false;
        }
        self.inflight
            .lock()
            .entry(*id)
            .or_insert_with(|| self.shutdown.child_token())
            .cancel();
        // The job may have finished or gone back to pending meanwhile.
        if !self.queue.is_in_flight(id) {
            self.inflight.lock().remove(id);
            return false;
        }
        info!(job_id = %id, "cancellation requested");
        true
    }

    fn take_cancel_request(&self, id: &JobId) -> bool {
        let mut inflight = self.inflight.lock();
        match inflight.get(id) {
            Some(token) if token.is_cancelled() => {
                inflight.remove(id);
                true
            }
            _ => false,
        }
    }

    fn admit(&self) -> Admission {
        let snapshot = self.monitor.latest();
        if snapshot.state.blocks_admission() {
            self.counters.paused.fetch_add(1, Ordering::Relaxed);
            return Admission::Paused(snapshot.state);
        }
        let multiplier = snapshot.throttle_multiplier;
        let ledger = self.monitor.ledger();

        let mut deferred: Vec<Job> = Vec::new();
        let mut admission = None;
        while deferred.len() < self.config.max_admission_scan {
            let Some(job) = self.queue.dequeue_next() else {
                break;
            };
            let cost = admitted_cost(job.estimated_resource_cost, multiplier);
            match ledger.try_allocate(&job.consumer_id(), cost) {
                Ok(()) => {
                    let token = self
                        .inflight
                        .lock()
                        .entry(job.id)
                        .or_insert_with(|| self.shutdown.child_token())
                        .clone();
                    admission = Some(Admission::Admitted {
                        job,
                        cost,
                        multiplier,
                        token,
                    });
                    break;
                }
                Err(err) => {
                    debug!(job_id = %job.id, cost, %err, "job deferred");
                    deferred.push(job);
                }
            }
        }

        let deferred_count = deferred.len();
        for job in deferred {
            let id = job.id;
            if let Err(err) = self.queue.requeue(job) {
                error!(job_id = %id, %err, "failed to requeue deferred job");
                continue;
            }
            // Requeue first so a cancel arriving now finds the job pending.
            if self.take_cancel_request(&id) {
                if let Some(job) = self.queue.remove(&id) {
                    self.finish_cancelled_sync(job);
                }
            }
        }
        if deferred_count > 0 {
            self.counters
                .deferred
                .fetch_add(deferred_count as u64, Ordering::Relaxed);
        }

        admission.unwrap_or(if deferred_count > 0 {
            Admission::Deferred(deferred_count)
        } else {
            Admission::Idle
        })
    }

    fn finish_cancelled_sync(&self, mut job: Job) {
        let now = now_ms();
        if let Err(err) = job.transition(JobStatus::Cancelled, now) {
            error!(job_id = %job.id, %err, "cannot cancel deferred job");
            return;
        }
        self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        self.events.publish(SchedulerEvent::JobCancelled {
            job_id: job.id,
            at_ms: now,
        });
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            if let Err(err) = repository.put(&job).await {
                warn!(job_id = %job.id, %err, "failed to persist cancelled job");
            }
        });
    }

    /// Run one admission and, if a job was admitted, execute it to a terminal outcome.
    pub async fn dispatch_once(&self, worker_id: usize) -> DispatchStatus {
        match self.admit() {
            Admission::Paused(state) => {
                debug!(worker_id, %state, "admission paused");
                DispatchStatus::Paused(state)
            }
            Admission::Idle => DispatchStatus::Idle,
            Admission::Deferred(n) => DispatchStatus::Deferred(n),
            Admission::Admitted {
                job,
                cost,
                multiplier,
                token,
            } => {
                self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                self.execute(worker_id, job, cost, multiplier, token).await
            }
        }
    }

    async fn execute(
        &self,
        worker_id: usize,
        mut job: Job,
        cost: ResourceUnits,
        multiplier: f64,
        token: CancellationToken,
    ) -> DispatchStatus {
        let started = now_ms();
        if let Err(err) = job.transition(JobStatus::Running, started) {
            error!(job_id = %job.id, %err, "admitted job was not dispatched");
        }
        self.persist(&job).await;
        self.events.publish(SchedulerEvent::JobProgress {
            job_id: job.id,
            worker_id,
            admitted_cost: cost,
            at_ms: started,
        });
        info!(job_id = %job.id, worker_id, cost, multiplier, "job started");

        let policy = job.retry_policy.clone().unwrap_or_else(|| {
            self.retry_defaults
                .clone()
                .with_max_retries(job.max_retries)
        });
        let name = format!("job:{}", job.id);
        let outcome = {
            let executor = &self.executor;
            let job_ref = &job;
            self.retry
                .retry_with_backoff(&name, &policy, &token, move |attempt| {
                    executor.execute(
                        job_ref,
                        ExecutionContext {
                            throttle_multiplier: multiplier,
                            admitted_cost: cost,
                            attempt,
                            worker_id,
                        },
                    )
                })
                .await
        };

        self.monitor.ledger().deallocate(&job.consumer_id());

        let now = now_ms();
        job.retry_count = outcome.history.retries().min(job.max_retries);
        let attempts = outcome.attempts();
        let status = match outcome.result {
            Ok(result) => {
                job.last_error = None;
                self.set_terminal(&mut job, JobStatus::Completed, now);
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(job_id = %job.id, worker_id, attempts, "job completed");
                self.events.publish(SchedulerEvent::JobCompleted {
                    job_id: job.id,
                    attempts,
                    result,
                    at_ms: now,
                });
                DispatchStatus::Completed(job.id)
            }
            Err(RetryFailure::Cancelled { last_error }) => {
                job.last_error = last_error.map(|e| e.to_string());
                self.set_terminal(&mut job, JobStatus::Cancelled, now);
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                info!(job_id = %job.id, worker_id, attempts, "job cancelled");
                self.events.publish(SchedulerEvent::JobCancelled {
                    job_id: job.id,
                    at_ms: now,
                });
                DispatchStatus::Cancelled(job.id)
            }
            Err(failure) => {
                let message = failure
                    .error()
                    .map_or_else(|| failure.to_string(), ToString::to_string);
                if let RetryFailure::NotRetryable { classification, .. }
                | RetryFailure::Exhausted { classification, .. } = &failure
                {
                    if classification.strategy == RecoveryStrategy::HaltSystem {
                        error!(
                            job_id = %job.id,
                            category = %classification.category,
                            "failure requires operator attention"
                        );
                    }
                }
                job.last_error = Some(message.clone());
                self.set_terminal(&mut job, JobStatus::Failed, now);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(job_id = %job.id, worker_id, attempts, error = %message, "job failed");
                self.events.publish(SchedulerEvent::JobFailed {
                    job_id: job.id,
                    error: message,
                    retry_count: job.retry_count,
                    at_ms: now,
                });
                DispatchStatus::Failed(job.id)
            }
        };
        self.persist(&job).await;
        // Finish before dropping the token so a late cancel sees the job gone.
        self.queue.finish(&job.id);
        self.inflight.lock().remove(&job.id);
        status
    }

    fn set_terminal(&self, job: &mut Job, status: JobStatus, now: u128) {
        if let Err(err) = job.transition(status, now) {
            error!(job_id = %job.id, %err, "terminal transition rejected");
        }
    }

    async fn persist(&self, job: &Job) {
        if let Err(err) = self.repository.put(job).await {
            warn!(job_id = %job.id, %err, "failed to persist job");
        }
    }

    /// Worker loop; runs until the shutdown token fires.
    pub async fn run_worker(self: Arc<Self>, worker_id: usize) {
        info!(worker_id, "dispatch worker started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let pause = match self.dispatch_once(worker_id).await {
                DispatchStatus::Paused(_) => Some(self.config.cooldown()),
                DispatchStatus::Idle | DispatchStatus::Deferred(_) => Some(self.config.idle_poll()),
                _ => None,
            };
            if let Some(pause) = pause {
                if !self.sleep_or_shutdown(pause).await {
                    break;
                }
            }
        }
        info!(worker_id, "dispatch worker stopped");
    }

    async fn sleep_or_shutdown(&self, pause: Duration) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = tokio::time::sleep(pause) => true,
        }
    }

    /// Spawn `worker_count` workers on the current tokio runtime.
    #[must_use]
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|worker_id| tokio::spawn(Arc::clone(self).run_worker(worker_id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admitted_cost_rounds_up() {
        assert_eq!(admitted_cost(1_000, 1.0), 1_000);
        assert_eq!(admitted_cost(1_000, 0.8), 800);
        assert_eq!(admitted_cost(1_001, 0.5), 501);
        assert_eq!(admitted_cost(1_000, 0.0), 0);
        assert_eq!(admitted_cost(1_000, f64::NAN), 0);
        assert_eq!(admitted_cost(1_000, 3.0), 1_000);
    }

    #[test]
    fn test_can_ever_fit_uses_throttled_floor() {
        // 5632 units of capacity admit up to 11264 nominal units at 0.5.
        assert!(can_ever_fit(6_000, 5_632));
        assert!(can_ever_fit(11_264, 5_632));
        assert!(!can_ever_fit(11_265, 5_632));
        assert!(!can_ever_fit(12_000, 5_632));
    }
}
