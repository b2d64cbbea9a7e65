//! Capacity ledger for a bounded resource such as accelerator memory.
//!
//! Invariant: `allocated + reserve <= limit` before and after every call.
//! Allocation is all-or-nothing and keyed by a plain consumer id string, so
//! the ledger never points back into job records.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::SchedulerError;
use crate::util::serde::ResourceUnits;

#[derive(Debug, Default)]
struct LedgerState {
    allocations: HashMap<String, ResourceUnits>,
    allocated: ResourceUnits,
}

/// Map of consumer id to reserved units, guarded by its own lock.
#[derive(Debug)]
pub struct MemoryLedger {
    limit: ResourceUnits,
    reserve: ResourceUnits,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Create a ledger. `reserve` is never handed out.
    pub fn new(limit: ResourceUnits, reserve: ResourceUnits) -> Result<Self, SchedulerError> {
        if reserve > limit {
            return Err(SchedulerError::InvalidConfig(format!(
                "memory_reserve ({reserve}) exceeds memory_limit ({limit})"
            )));
        }
        Ok(Self {
            limit,
            reserve,
            state: Mutex::new(LedgerState::default()),
        })
    }

    /// Total capacity.
    #[must_use]
    pub const fn limit(&self) -> ResourceUnits {
        self.limit
    }

    /// Units held back from allocation.
    #[must_use]
    pub const fn reserve(&self) -> ResourceUnits {
        self.reserve
    }

    /// Largest single allocation that could ever succeed.
    #[must_use]
    pub const fn capacity(&self) -> ResourceUnits {
        self.limit - self.reserve
    }

    /// Reserve `amount` for `consumer_id`, or fail without any effect.
    pub fn try_allocate(&self, consumer_id: &str, amount: ResourceUnits) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        let available = self.capacity() - state.allocated;
        if state.allocations.contains_key(consumer_id) {
            warn!(consumer_id, "consumer already holds an allocation");
            return Err(SchedulerError::ResourceExhausted {
                requested: amount,
                available,
            });
        }
        if amount > available {
            debug!(consumer_id, amount, available, "allocation refused");
            return Err(SchedulerError::ResourceExhausted {
                requested: amount,
                available,
            });
        }
        state.allocated += amount;
        state.allocations.insert(consumer_id.to_string(), amount);
        debug!(consumer_id, amount, allocated = state.allocated, "allocation granted");
        Ok(())
    }

    /// Boolean form of [`try_allocate`](Self::try_allocate).
    pub fn allocate(&self, consumer_id: &str, amount: ResourceUnits) -> bool {
        self.try_allocate(consumer_id, amount).is_ok()
    }

    /// Release whatever `consumer_id` holds. Returns the released amount.
    pub fn deallocate(&self, consumer_id: &str) -> Option<ResourceUnits> {
        let mut state = self.state.lock();
        let amount = state.allocations.remove(consumer_id)?;
        state.allocated -= amount;
        debug!(consumer_id, amount, allocated = state.allocated, "allocation released");
        Some(amount)
    }

    /// `limit - reserve - allocated`.
    #[must_use]
    pub fn available(&self) -> ResourceUnits {
        self.capacity() - self.state.lock().allocated
    }

    /// Sum of current allocations.
    #[must_use]
    pub fn allocated(&self) -> ResourceUnits {
        self.state.lock().allocated
    }

    /// Units held by one consumer.
    #[must_use]
    pub fn allocation(&self, consumer_id: &str) -> Option<ResourceUnits> {
        self.state.lock().allocations.get(consumer_id).copied()
    }

    /// Copy of every allocation.
    #[must_use]
    pub fn allocations(&self) -> HashMap<String, ResourceUnits> {
        self.state.lock().allocations.clone()
    }
}
