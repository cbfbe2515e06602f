//! A consumer-side view bound to one scope at a time.
//!
//! Switching the selected scope supersedes any load still in flight for the
//! previous one: its result is dropped on arrival instead of being shown
//! under the new selection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::cache::DerivedValue;
use crate::coordinator::{Coordinator, ReadOptions};
use crate::error::EngineError;
use crate::scope::{CacheKey, ScopeKey};

pub struct ScopedView {
    coordinator: Coordinator,
    options: ReadOptions,
    selected: Mutex<Option<ScopeKey>>,
    epoch: AtomicU64,
}

impl ScopedView {
    pub fn new(coordinator: Coordinator, options: ReadOptions) -> Self {
        Self {
            coordinator,
            options,
            selected: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Point the view at `scope`. Returns the new selection epoch.
    pub fn select(&self, scope: ScopeKey) -> u64 {
        let mut selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
        *selected = Some(scope);
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn selected(&self) -> Option<ScopeKey> {
        self.selected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Load the selected scope.
    ///
    /// `Ok(None)` when nothing is selected or the selection changed while
    /// the load was running.
    pub async fn load(&self) -> Result<Option<DerivedValue>, EngineError> {
        let (epoch, scope) = {
            let selected = self.selected.lock().unwrap_or_else(|e| e.into_inner());
            (self.epoch.load(Ordering::SeqCst), selected.clone())
        };
        let Some(scope) = scope else {
            return Ok(None);
        };

        let key = CacheKey {
            scope,
            variant: self.options.variant,
        };
        let value = self.coordinator.read(&key, self.options.policy).await?;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(%key, "selection changed during load, discarding result");
            return Ok(None);
        }
        Ok(Some(value))
    }
}
