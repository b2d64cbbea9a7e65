//! Priority-ordered pending job queue.
//!
//! Pending jobs are indexed by `(priority desc, insertion seq asc)` in a
//! `BTreeMap`, giving O(log n) insert, pop, and reposition. The insertion
//! sequence is kept across dispatch so a requeued job returns to its original
//! rank among equal-priority peers.
//!
//! All state sits behind one `parking_lot::Mutex`. Callers must not hold any
//! other scheduler lock (in particular the ledger lock) while calling in here.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::core::job::{Job, JobStatus};
use crate::core::priority::PriorityCalculator;
use crate::core::SchedulerError;
use crate::util::clock::{hours_between, now_ms};
use crate::util::serde::{JobId, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: Reverse<Priority>,
    seq: u64,
}

#[derive(Debug)]
struct PendingEntry {
    job: Job,
    seq: u64,
}

impl PendingEntry {
    const fn key(&self) -> QueueKey {
        QueueKey {
            rank: Reverse(self.job.priority),
            seq: self.seq,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    order: BTreeMap<QueueKey, JobId>,
    pending: HashMap<JobId, PendingEntry>,
    /// Dispatched or running jobs, with the seq they held while pending.
    in_flight: HashMap<JobId, u64>,
    next_seq: u64,
}

impl QueueState {
    fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn insert(&mut self, job: Job, seq: u64) {
        let entry = PendingEntry { job, seq };
        self.order.insert(entry.key(), entry.job.id);
        self.pending.insert(entry.job.id, entry);
    }

    fn take(&mut self, id: &JobId) -> Option<PendingEntry> {
        let entry = self.pending.remove(id)?;
        self.order.remove(&entry.key());
        Some(entry)
    }

    /// Move a pending job to `priority`. Returns whether anything changed.
    fn reposition(&mut self, id: &JobId, priority: Priority) -> bool {
        let Some(entry) = self.pending.get_mut(id) else {
            return false;
        };
        if entry.job.priority == priority {
            return false;
        }
        self.order.remove(&entry.key());
        entry.job.priority = priority;
        self.order.insert(entry.key(), *id);
        true
    }

    fn contains(&self, id: &JobId) -> bool {
        self.pending.contains_key(id) || self.in_flight.contains_key(id)
    }
}

/// Priority histogram and summary for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueDistribution {
    /// Pending job count per priority value.
    pub by_priority: BTreeMap<u8, usize>,
    /// Pending jobs.
    pub pending: usize,
    /// Dispatched or running jobs.
    pub in_flight: usize,
    /// Mean priority of pending jobs; 0 when empty.
    pub average_priority: f64,
    /// Age of the oldest pending job in hours.
    pub oldest_pending_age_hours: Option<f64>,
}

/// Priority-ordered collection of pending jobs.
#[derive(Debug)]
pub struct JobQueue {
    calculator: PriorityCalculator,
    max_depth: usize,
    state: Mutex<QueueState>,
}

impl JobQueue {
    /// Create a queue holding at most `max_depth` pending jobs.
    #[must_use]
    pub fn new(calculator: PriorityCalculator, max_depth: usize) -> Self {
        Self {
            calculator,
            max_depth,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Calculator used for scoring and rebalancing.
    #[must_use]
    pub const fn calculator(&self) -> &PriorityCalculator {
        &self.calculator
    }

    /// Maximum pending depth.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Effective priority of `job` at `now_ms`: formula, then session boost and floor.
    #[must_use]
    pub fn score(&self, job: &Job, now_ms: u128) -> Priority {
        job.effective_priority(self.calculator.calculate(&job.priority_input(now_ms)))
    }

    /// Insert a pending job at its current `priority`. Ties keep insertion order.
    pub fn enqueue(&self, job: Job) -> Result<(), SchedulerError> {
        if job.status != JobStatus::Pending {
            return Err(SchedulerError::InvalidTransition {
                job_id: job.id,
                from: job.status,
                to: JobStatus::Pending,
            });
        }
        let mut state = self.state.lock();
        if state.pending.len() >= self.max_depth {
            return Err(SchedulerError::QueueFull(format!(
                "max queue depth {} reached",
                self.max_depth
            )));
        }
        if state.contains(&job.id) {
            return Err(SchedulerError::DuplicateJob(job.id));
        }
        let seq = state.allocate_seq();
        debug!(job_id = %job.id, priority = %job.priority, seq, "job enqueued");
        state.insert(job, seq);
        Ok(())
    }

    /// Score `job` at `now_ms`, then enqueue it. Returns the assigned priority.
    pub fn enqueue_prioritized(&self, mut job: Job, now_ms: u128) -> Result<Priority, SchedulerError> {
        job.priority = self.score(&job, now_ms);
        let priority = job.priority;
        self.enqueue(job)?;
        Ok(priority)
    }

    /// Atomically pop the highest-priority, earliest-enqueued job and mark it dispatched.
    pub fn dequeue_next(&self) -> Option<Job> {
        let mut state = self.state.lock();
        let (_, id) = state.order.pop_first()?;
        let Some(PendingEntry { mut job, seq }) = state.pending.remove(&id) else {
            error!(job_id = %id, "queue index referenced a missing job");
            return None;
        };
        if let Err(err) = job.transition(JobStatus::Dispatched, now_ms()) {
            error!(job_id = %id, %err, "queued job was not pending");
        }
        state.in_flight.insert(id, seq);
        Some(job)
    }

    /// Return an in-flight job to pending, keeping its original insertion rank.
    pub fn requeue(&self, mut job: Job) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let Some(seq) = state.in_flight.remove(&job.id) else {
            return Err(SchedulerError::NotFound(job.id));
        };
        if let Err(err) = job.transition(JobStatus::Pending, now_ms()) {
            state.in_flight.insert(job.id, seq);
            return Err(err);
        }
        debug!(job_id = %job.id, seq, "job requeued");
        state.insert(job, seq);
        Ok(())
    }

    /// Forget an in-flight job after its terminal outcome.
    pub fn finish(&self, id: &JobId) -> bool {
        self.state.lock().in_flight.remove(id).is_some()
    }

    /// Remove a pending job, e.g. for cancellation.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.state.lock().take(id).map(|entry| entry.job)
    }

    /// Set a pending job's priority manually.
    ///
    /// The value is stored as an override so later rebalances keep it; earlier
    /// session boosts and starvation floors are discarded. Fails with
    /// `NotFound` when the job is absent or already dispatched.
    pub fn adjust_priority(&self, id: &JobId, priority: i64) -> Result<Priority, SchedulerError> {
        let priority = Priority::new(priority);
        let mut state = self.state.lock();
        let Some(entry) = state.pending.get_mut(id) else {
            return Err(SchedulerError::NotFound(*id));
        };
        entry.job.priority_override = Some(priority);
        entry.job.session_boost = 0;
        entry.job.priority_floor = None;
        state.reposition(id, priority);
        info!(job_id = %id, %priority, "priority adjusted");
        Ok(priority)
    }

    /// Recompute every pending job's priority at `now_ms`. Returns how many moved.
    ///
    /// Takes the queue lock for the whole pass; run it periodically, not per dispatch.
    pub fn rebalance(&self, now_ms: u128) -> usize {
        let mut state = self.state.lock();
        let changes: Vec<(JobId, Priority)> = state
            .pending
            .values()
            .filter_map(|entry| {
                let next = self.score(&entry.job, now_ms);
                (next != entry.job.priority).then_some((entry.job.id, next))
            })
            .collect();
        for (id, priority) in &changes {
            state.reposition(id, *priority);
        }
        if !changes.is_empty() {
            info!(changed = changes.len(), pending = state.pending.len(), "queue rebalanced");
        }
        changes.len()
    }

    /// Add `delta` to every pending job of `session_id`, clipped to 10.
    ///
    /// Never decreases a priority. Returns the number of session jobs touched.
    pub fn boost_session(&self, session_id: &str, delta: u8) -> usize {
        if delta == 0 {
            return 0;
        }
        let mut state = self.state.lock();
        let boosted: Vec<(JobId, Priority)> = state
            .pending
            .values_mut()
            .filter(|entry| entry.job.session_id.as_deref() == Some(session_id))
            .map(|entry| {
                entry.job.session_boost = entry.job.session_boost.saturating_add(delta);
                (entry.job.id, entry.job.priority.saturating_boost(delta))
            })
            .collect();
        for (id, priority) in &boosted {
            state.reposition(id, *priority);
        }
        info!(session_id, delta, jobs = boosted.len(), "session boosted");
        boosted.len()
    }

    /// Pending jobs waiting longer than `threshold_hours`, oldest first.
    #[must_use]
    pub fn get_starvation_candidates(&self, threshold_hours: f64, now_ms: u128) -> Vec<Job> {
        let state = self.state.lock();
        let mut starving: Vec<&PendingEntry> = state
            .pending
            .values()
            .filter(|entry| entry.job.age_hours(now_ms) > threshold_hours)
            .collect();
        starving.sort_by_key(|entry| (entry.job.created_at_ms, entry.seq));
        starving.into_iter().map(|entry| entry.job.clone()).collect()
    }

    /// Raise starving jobs to at least `floor`. Returns the ids whose priority rose.
    ///
    /// The floor is remembered on the job so rebalancing cannot undo it.
    pub fn auto_boost_starving(&self, threshold_hours: f64, floor: Priority, now_ms: u128) -> Vec<JobId> {
        let mut state = self.state.lock();
        let mut raised = Vec::new();
        let starving: Vec<JobId> = state
            .pending
            .values_mut()
            .filter(|entry| entry.job.age_hours(now_ms) > threshold_hours)
            .map(|entry| {
                let job = &mut entry.job;
                job.priority_floor = Some(job.priority_floor.map_or(floor, |f| f.max(floor)));
                job.id
            })
            .collect();
        for id in starving {
            let current = state.pending.get(&id).map(|entry| entry.job.priority);
            if let Some(current) = current {
                if current < floor && state.reposition(&id, floor) {
                    raised.push(id);
                }
            }
        }
        if !raised.is_empty() {
            info!(raised = raised.len(), floor = %floor, "starving jobs boosted");
        }
        raised
    }

    /// Priority histogram plus summary figures.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get_distribution(&self, now_ms: u128) -> QueueDistribution {
        let state = self.state.lock();
        let mut by_priority = BTreeMap::new();
        let mut sum = 0u64;
        let mut oldest: Option<u128> = None;
        for entry in state.pending.values() {
            *by_priority.entry(entry.job.priority.value()).or_insert(0) += 1;
            sum += u64::from(entry.job.priority.value());
            oldest = Some(oldest.map_or(entry.job.created_at_ms, |o| o.min(entry.job.created_at_ms)));
        }
        let pending = state.pending.len();
        QueueDistribution {
            by_priority,
            pending,
            in_flight: state.in_flight.len(),
            average_priority: if pending == 0 {
                0.0
            } else {
                sum as f64 / pending as f64
            },
            oldest_pending_age_hours: oldest.map(|created| hours_between(created, now_ms)),
        }
    }

    /// Clone of a pending job.
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.state.lock().pending.get(id).map(|entry| entry.job.clone())
    }

    /// Whether the job is dispatched or running.
    #[must_use]
    pub fn is_in_flight(&self, id: &JobId) -> bool {
        self.state.lock().in_flight.contains_key(id)
    }

    /// Pending jobs in dequeue order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Job> {
        let state = self.state.lock();
        state
            .order
            .values()
            .filter_map(|id| state.pending.get(id).map(|entry| entry.job.clone()))
            .collect()
    }

    /// Number of pending jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no job is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
