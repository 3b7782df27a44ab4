//! Finite slot namespace handed out to workers.
//!
//! Slots are integer identities in `[1, total]`, split into an `OTHERS` range
//! (`[1, others]`) and a `DEDICATED` range (`[others + 1, others + dedicated]`).
//! Released slots go to a LIFO recycle pool and are reused before any untouched index
//! is minted, which keeps numbering dense.
//!
//! Every operation runs inside one `parking_lot::Mutex` critical section, so two
//! concurrent `allocate` calls can never observe the same slot.

use crate::config::SlotsConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// Which reservation a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotClass {
    Others,
    Dedicated,
}

impl SlotClass {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Others => "others",
            Self::Dedicated => "dedicated",
        }
    }
}

/// Errors returned by the slot allocator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error(
        "slot pool exhausted: {allocated}/{total} slots allocated and the recycle pool is empty; \
         increase slots.others/slots.dedicated or check for callers that never release their slot"
    )]
    Exhausted { allocated: usize, total: u32 },

    #[error("slot {0} is outside the configured slot range")]
    OutOfRange(u32),

    #[error("slot {slot} is held by worker '{holder}'")]
    Held { slot: u32, holder: String },
}

#[derive(Debug, Clone)]
struct SlotLease {
    worker_id: Arc<str>,
    allocated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct AllocatorState {
    recycled: Vec<u32>,
    next_fresh: u32,
    allocated: HashMap<u32, SlotLease>,
    peak_concurrent: usize,
    exhausted_errors: u64,
    total_allocations: u64,
    total_releases: u64,
}

/// Point-in-time allocator counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlotStats {
    pub total_slots: u32,
    pub allocated: usize,
    pub pooled: usize,
    /// Next index that would be minted (may exceed `total_slots` once the range is used up).
    pub next_fresh: u32,
    pub peak_concurrent: usize,
    pub exhausted_errors: u64,
    pub others_allocated: usize,
    pub dedicated_allocated: usize,
    pub total_allocations: u64,
    pub total_releases: u64,
}

/// Hands out slot identities to workers.
pub struct SlotAllocator {
    others: u32,
    total: u32,
    state: Mutex<AllocatorState>,
}

impl SlotAllocator {
    #[must_use]
    pub fn new(config: &SlotsConfig) -> Self {
        Self {
            others: config.others,
            total: config.total(),
            state: Mutex::new(AllocatorState {
                recycled: Vec::new(),
                next_fresh: 1,
                allocated: HashMap::new(),
                peak_concurrent: 0,
                exhausted_errors: 0,
                total_allocations: 0,
                total_releases: 0,
            }),
        }
    }

    /// Total number of slot identities.
    #[must_use]
    pub fn total_slots(&self) -> u32 {
        self.total
    }

    /// Returns `true` if `slot` is a valid identity in `[1, total]`.
    #[must_use]
    pub fn contains(&self, slot: u32) -> bool {
        (1..=self.total).contains(&slot)
    }

    /// Reservation of a slot, or `None` for an index outside the namespace.
    #[must_use]
    pub fn class_of(&self, slot: u32) -> Option<SlotClass> {
        if !self.contains(slot) {
            None
        } else if slot <= self.others {
            Some(SlotClass::Others)
        } else {
            Some(SlotClass::Dedicated)
        }
    }

    /// Allocates a slot for `worker_id`, preferring recycled indices.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Exhausted`] when every slot is held and none has been released.
    pub fn allocate(&self, worker_id: &str) -> Result<u32, SlotError> {
        let mut state = self.state.lock();

        // reserved slots ahead of the fresh cursor are skipped
        while state.next_fresh <= self.total && state.allocated.contains_key(&state.next_fresh) {
            state.next_fresh += 1;
        }

        let slot = if let Some(slot) = state.recycled.pop() {
            slot
        } else if state.next_fresh <= self.total {
            let slot = state.next_fresh;
            state.next_fresh += 1;
            slot
        } else {
            state.exhausted_errors += 1;
            let allocated = state.allocated.len();
            drop(state);
            warn!(worker_id, allocated, total = self.total, "slot pool exhausted");
            return Err(SlotError::Exhausted { allocated, total: self.total });
        };

        state.allocated.insert(
            slot,
            SlotLease { worker_id: Arc::from(worker_id), allocated_at: Utc::now() },
        );
        state.total_allocations += 1;
        state.peak_concurrent = state.peak_concurrent.max(state.allocated.len());

        debug!(slot, worker_id, "slot allocated");
        Ok(slot)
    }

    /// Takes a specific slot out of circulation for `worker_id`.
    ///
    /// `allocate` never hands out a reserved slot; [`SlotAllocator::release`] returns it.
    ///
    /// # Errors
    ///
    /// [`SlotError::OutOfRange`] for indices outside the namespace, [`SlotError::Held`] when
    /// the slot is already allocated.
    pub fn reserve(&self, slot: u32, worker_id: &str) -> Result<(), SlotError> {
        if !self.contains(slot) {
            return Err(SlotError::OutOfRange(slot));
        }

        let mut state = self.state.lock();
        if let Some(lease) = state.allocated.get(&slot) {
            return Err(SlotError::Held { slot, holder: lease.worker_id.to_string() });
        }

        state.recycled.retain(|pooled| *pooled != slot);
        state.allocated.insert(
            slot,
            SlotLease { worker_id: Arc::from(worker_id), allocated_at: Utc::now() },
        );
        state.total_allocations += 1;
        state.peak_concurrent = state.peak_concurrent.max(state.allocated.len());

        debug!(slot, worker_id, "slot reserved");
        Ok(())
    }

    /// Returns a slot to the recycle pool.
    ///
    /// Releasing a slot that is not currently allocated is logged and ignored.
    pub fn release(&self, slot: u32) {
        let mut state = self.state.lock();

        match state.allocated.remove(&slot) {
            Some(lease) => {
                // a reserved slot the cursor has not reached yet is minted later instead
                if slot < state.next_fresh {
                    state.recycled.push(slot);
                }
                state.total_releases += 1;
                debug!(slot, worker_id = %lease.worker_id, "slot released");
            }
            None => {
                drop(state);
                warn!(slot, "release of a slot that is not allocated; ignoring");
            }
        }
    }

    /// Worker currently holding `slot`.
    #[must_use]
    pub fn holder(&self, slot: u32) -> Option<Arc<str>> {
        self.state.lock().allocated.get(&slot).map(|lease| Arc::clone(&lease.worker_id))
    }

    /// Time at which `slot` was handed out.
    #[must_use]
    pub fn allocated_at(&self, slot: u32) -> Option<DateTime<Utc>> {
        self.state.lock().allocated.get(&slot).map(|lease| lease.allocated_at)
    }

    #[must_use]
    pub fn is_allocated(&self, slot: u32) -> bool {
        self.state.lock().allocated.contains_key(&slot)
    }

    #[must_use]
    pub fn stats(&self) -> SlotStats {
        let state = self.state.lock();
        let others_allocated = state.allocated.keys().filter(|slot| **slot <= self.others).count();

        SlotStats {
            total_slots: self.total,
            allocated: state.allocated.len(),
            pooled: state.recycled.len(),
            next_fresh: state.next_fresh,
            peak_concurrent: state.peak_concurrent,
            exhausted_errors: state.exhausted_errors,
            others_allocated,
            dedicated_allocated: state.allocated.len() - others_allocated,
            total_allocations: state.total_allocations,
            total_releases: state.total_releases,
        }
    }
}
