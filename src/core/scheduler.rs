//! Scheduler facade: wires queue, monitor, retry manager, and dispatcher.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SchedulerConfig, StarvationConfig};
use crate::core::dispatcher::{
    admitted_cost, can_ever_fit, DispatchStats, DispatchStatus, Dispatcher,
};
use crate::core::events::{EventSink, SchedulerEvent};
use crate::core::executor::JobExecutor;
use crate::core::job::{Job, JobStatus};
use crate::core::job_queue::{JobQueue, QueueDistribution};
use crate::core::priority::PriorityCalculator;
use crate::core::repository::JobRepository;
use crate::core::resource::{
    ResourceMonitor, ResourceSnapshot, ResourceState, TelemetrySource, TrendMetric, TrendSummary,
};
use crate::core::retry::{RetryHistory, RetryManager, RetryStats};
use crate::core::SchedulerError;
use crate::util::clock::now_ms;
use crate::util::serde::{JobId, Priority, ResourceUnits};

/// Queue and dispatcher summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Pending jobs by priority and related figures.
    pub distribution: QueueDistribution,
    /// Dispatcher counters.
    pub dispatch: DispatchStats,
}

/// Device snapshot plus ledger figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Latest snapshot.
    pub snapshot: ResourceSnapshot,
    /// Units reservable by jobs (`limit - reserve`).
    pub capacity: ResourceUnits,
    /// Units currently reserved.
    pub allocated: ResourceUnits,
    /// Units still available.
    pub available: ResourceUnits,
    /// Number of active reservations.
    pub allocations: usize,
}

/// Resource-aware priority job scheduler.
pub struct JobScheduler<E: JobExecutor> {
    config: SchedulerConfig,
    queue: Arc<JobQueue>,
    monitor: Arc<ResourceMonitor>,
    retry: Arc<RetryManager>,
    dispatcher: Arc<Dispatcher<E>>,
    repository: Arc<dyn JobRepository>,
    events: Arc<dyn EventSink>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: JobExecutor> std::fmt::Debug for JobScheduler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("queue", &self.queue)
            .field("monitor", &self.monitor)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl<E: JobExecutor> JobScheduler<E> {
    /// Build a scheduler. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: SchedulerConfig,
        executor: E,
        telemetry: Arc<dyn TelemetrySource>,
        repository: Arc<dyn JobRepository>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let calculator = PriorityCalculator::new(config.priority.clone())?;
        let queue = Arc::new(JobQueue::new(calculator, config.dispatcher.max_queue_depth));
        let monitor = Arc::new(ResourceMonitor::new(
            config.resources.clone(),
            telemetry,
            Arc::clone(&events),
        )?);
        let retry = Arc::new(RetryManager::new(config.retry_defaults.history_capacity));
        let shutdown = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&monitor),
            Arc::clone(&retry),
            Arc::clone(&repository),
            Arc::clone(&events),
            executor,
            config.dispatcher.clone(),
            config.retry_defaults.clone(),
            shutdown.clone(),
        ));
        Ok(Self {
            config,
            queue,
            monitor,
            retry,
            dispatcher,
            repository,
            events,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Underlying queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Underlying resource monitor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    /// Underlying dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher<E>> {
        &self.dispatcher
    }

    /// Start the monitor, dispatch workers, and maintenance task.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("scheduler already started");
            return;
        }
        if self.shutdown.is_cancelled() {
            warn!("scheduler was shut down and cannot be restarted");
            return;
        }
        tasks.push(self.monitor.spawn(self.shutdown.clone()));
        tasks.extend(self.dispatcher.spawn_workers());
        tasks.push(tokio::spawn(maintenance(
            Arc::clone(&self.queue),
            self.config.starvation.clone(),
            self.config.dispatcher.rebalance_interval(),
            self.shutdown.clone(),
        )));
        info!(
            workers = self.config.dispatcher.worker_count,
            device_id = %self.config.resources.device_id,
            "scheduler started"
        );
    }

    /// Stop all background tasks and cancel in-flight jobs, waiting for them to wind down.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(%err, "background task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }

    /// Score, persist, and enqueue a job. Returns its id.
    ///
    /// A job whose cost exceeds ledger capacity even at the most throttled
    /// admitting multiplier is refused with `ResourceExhausted`.
    pub async fn submit(&self, mut job: Job) -> Result<JobId, SchedulerError> {
        let capacity = self.monitor.ledger().capacity();
        if !can_ever_fit(job.estimated_resource_cost, capacity) {
            let requested = admitted_cost(
                job.estimated_resource_cost,
                ResourceState::lowest_admitting_multiplier(),
            );
            warn!(job_id = %job.id, requested, capacity, "job can never be admitted");
            return Err(SchedulerError::ResourceExhausted {
                requested,
                available: capacity,
            });
        }
        let now = now_ms();
        job.priority = self.queue.score(&job, now);
        self.repository.put(&job).await?;
        if let Err(err) = self.queue.enqueue(job.clone()) {
            if let Err(cleanup) = self.repository.delete(job.id).await {
                warn!(job_id = %job.id, %cleanup, "failed to drop rejected job record");
            }
            return Err(err);
        }
        info!(job_id = %job.id, work_item = %job.work_item_id, priority = %job.priority, "job submitted");
        self.events.publish(SchedulerEvent::JobCreated {
            job_id: job.id,
            work_item_id: job.work_item_id.clone(),
            priority: job.priority,
            at_ms: now,
        });
        Ok(job.id)
    }

    /// Pin a pending job's priority. See [`JobQueue::adjust_priority`].
    pub fn adjust_priority(&self, id: JobId, priority: i64) -> Result<Priority, SchedulerError> {
        self.queue.adjust_priority(&id, priority)
    }

    /// Cancel a job.
    ///
    /// Pending jobs are cancelled at once. In-flight jobs are signalled and
    /// reach `cancelled` once their current attempt stops.
    pub async fn cancel(&self, id: JobId) -> Result<(), SchedulerError> {
        // A job may be moving between pending and in flight; look twice.
        for _ in 0..2 {
            if let Some(mut job) = self.queue.remove(&id) {
                let now = now_ms();
                job.transition(JobStatus::Cancelled, now)?;
                self.repository.put(&job).await?;
                self.events.publish(SchedulerEvent::JobCancelled { job_id: id, at_ms: now });
                info!(job_id = %id, "pending job cancelled");
                return Ok(());
            }
            if self.dispatcher.cancel_in_flight(&id) {
                return Ok(());
            }
        }
        match self.repository.get(id).await? {
            Some(job) => Err(SchedulerError::InvalidTransition {
                job_id: id,
                from: job.status,
                to: JobStatus::Cancelled,
            }),
            None => Err(SchedulerError::NotFound(id)),
        }
    }

    /// Current state of a job: the live queue copy if pending, else the stored record.
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>, SchedulerError> {
        if let Some(job) = self.queue.get(&id) {
            return Ok(Some(job));
        }
        self.repository.get(id).await
    }

    /// Queue distribution plus dispatcher counters.
    #[must_use]
    pub fn get_queue_status(&self) -> QueueStatus {
        QueueStatus {
            distribution: self.queue.get_distribution(now_ms()),
            dispatch: self.dispatcher.stats(),
        }
    }

    /// Latest resource snapshot and ledger figures.
    #[must_use]
    pub fn get_resource_status(&self) -> ResourceStatus {
        let ledger = self.monitor.ledger();
        ResourceStatus {
            snapshot: self.monitor.latest().as_ref().clone(),
            capacity: ledger.capacity(),
            allocated: ledger.allocated(),
            available: ledger.available(),
            allocations: ledger.allocations().len(),
        }
    }

    /// Trend of `metric` over the trailing `window`.
    #[must_use]
    pub fn resource_trend(&self, metric: TrendMetric, window: Duration) -> Option<TrendSummary> {
        self.monitor.trend(metric, window, now_ms())
    }

    /// Raise every pending job of `session_id` by `delta`. Returns how many were boosted.
    pub fn boost_session(&self, session_id: &str, delta: u8) -> usize {
        self.queue.boost_session(session_id, delta)
    }

    /// Pending jobs older than `threshold_hours`, oldest first.
    #[must_use]
    pub fn get_starvation_candidates(&self, threshold_hours: f64) -> Vec<Job> {
        self.queue.get_starvation_candidates(threshold_hours, now_ms())
    }

    /// Apply the configured starvation floor now.
    pub fn auto_boost_starving(&self) -> Vec<JobId> {
        boost_starving(&self.queue, &self.config.starvation, now_ms())
    }

    /// Recompute all pending priorities now.
    pub fn rebalance(&self) -> usize {
        self.queue.rebalance(now_ms())
    }

    /// Run a single dispatch pass on the caller's task.
    pub async fn dispatch_once(&self) -> DispatchStatus {
        self.dispatcher.dispatch_once(0).await
    }

    /// Retry counters.
    #[must_use]
    pub fn retry_stats(&self) -> RetryStats {
        self.retry.stats()
    }

    /// Recently finalized retry histories.
    #[must_use]
    pub fn recent_retry_histories(&self) -> Vec<RetryHistory> {
        self.retry.recent_histories()
    }
}

fn boost_starving(queue: &JobQueue, cfg: &StarvationConfig, now: u128) -> Vec<JobId> {
    let floor = Priority::new(i64::from(cfg.starvation_floor_priority));
    queue.auto_boost_starving(cfg.starvation_threshold_hours, floor, now)
}

async fn maintenance(
    queue: Arc<JobQueue>,
    starvation: StarvationConfig,
    rebalance_every: Duration,
    shutdown: CancellationToken,
) {
    let starvation_every = starvation.check_interval();
    let mut rebalance = interval_at(Instant::now() + rebalance_every, rebalance_every);
    let mut starving = interval_at(Instant::now() + starvation_every, starvation_every);
    rebalance.set_missed_tick_behavior(MissedTickBehavior::Delay);
    starving.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = rebalance.tick() => {
                let moved = queue.rebalance(now_ms());
                debug!(moved, "periodic rebalance");
            }
            _ = starving.tick() => {
                let boosted = boost_starving(&queue, &starvation, now_ms());
                if !boosted.is_empty() {
                    info!(count = boosted.len(), "starving jobs boosted");
                }
            }
        }
    }
    debug!("maintenance task stopped");
}
