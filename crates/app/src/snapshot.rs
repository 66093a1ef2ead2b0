//! Copy-on-write snapshot cell.
//!
//! Readers clone the current `Arc` under a short read lock and work on it
//! without holding any lock; writers build a complete new value and swap the
//! `Arc`. A reader therefore sees either the old value or the new one in full.

use std::sync::{Arc, PoisonError, RwLock};

/// A value replaced wholesale, never mutated in place.
#[derive(Debug, Default)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// The value currently in effect.
    pub fn load(&self) -> Arc<T> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Replace the value; returns the previous one.
    pub fn store(&self, value: Arc<T>) -> Arc<T> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }
}
