//! # Capacity Quota
//!
//! Bounds concurrent subscriptions per caller and process-wide.
//!
//! A successful [`CapacityLimiter::try_acquire`] returns a [`CapacitySlot`]
//! that releases both counters when dropped, so every teardown path (normal
//! exit, error, panic unwinding) gives the slot back. The limiter keeps its
//! own locking and never touches the subscription registry.

use super::errors::CapacityError;
use crate::constants::{DEFAULT_GLOBAL_SUBSCRIPTION_LIMIT, DEFAULT_PER_CALLER_SUBSCRIPTION_LIMIT};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct CapacityLimiter {
    per_caller_limit: usize,
    global_limit: usize,
    global: AtomicUsize,
    per_caller: Mutex<HashMap<String, usize>>,
}

impl Default for CapacityLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PER_CALLER_SUBSCRIPTION_LIMIT, DEFAULT_GLOBAL_SUBSCRIPTION_LIMIT)
    }
}

impl CapacityLimiter {
    pub fn new(per_caller_limit: usize, global_limit: usize) -> Self {
        Self {
            per_caller_limit,
            global_limit,
            global: AtomicUsize::new(0),
            per_caller: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve one slot for `caller`
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::GlobalLimit`] or [`CapacityError::CallerLimit`]
    /// when the respective quota is exhausted. Nothing is reserved on error.
    pub fn try_acquire(self: &Arc<Self>, caller: &str) -> Result<CapacitySlot, CapacityError> {
        let global_limit = self.global_limit;
        self.global
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < global_limit).then_some(current + 1)
            })
            .map_err(|_current| CapacityError::GlobalLimit {
                limit: global_limit,
            })?;

        let caller_result = {
            let mut per_caller = self.lock_per_caller();
            let held = per_caller.entry(caller.to_string()).or_insert(0);
            if *held < self.per_caller_limit {
                *held += 1;
                Ok(())
            } else {
                Err(CapacityError::CallerLimit {
                    caller: caller.to_string(),
                    limit: self.per_caller_limit,
                })
            }
        };

        if let Err(e) = caller_result {
            self.global.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }

        Ok(CapacitySlot {
            limiter: Arc::clone(self),
            caller: caller.to_string(),
        })
    }

    /// Slots currently held across all callers
    pub fn in_use(&self) -> usize {
        self.global.load(Ordering::Acquire)
    }

    /// Slots currently held by one caller
    pub fn in_use_by(&self, caller: &str) -> usize {
        self.lock_per_caller().get(caller).copied().unwrap_or(0)
    }

    // A poisoned map still holds consistent counts
    fn lock_per_caller(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.per_caller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, caller: &str) {
        {
            let mut per_caller = self.lock_per_caller();
            if let Some(held) = per_caller.get_mut(caller) {
                *held = held.saturating_sub(1);
                if *held == 0 {
                    per_caller.remove(caller);
                }
            }
        }
        self.global.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One reserved subscription slot; released on drop
#[derive(Debug)]
pub struct CapacitySlot {
    limiter: Arc<CapacityLimiter>,
    caller: String,
}

impl CapacitySlot {
    pub fn caller(&self) -> &str {
        &self.caller
    }
}

impl Drop for CapacitySlot {
    fn drop(&mut self) {
        self.limiter.release(&self.caller);
    }
}
