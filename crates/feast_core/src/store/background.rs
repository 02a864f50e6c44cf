//! Background-task tokens that keep the process alive while a cascade runs.
//!
//! # Invariants
//! - A token is released exactly once, when its guard is dropped.
//! - `active()` counts tokens that have begun and not yet been released.

use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Registry of currently held background tokens.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: AtomicU64,
    active: Mutex<BTreeMap<u64, String>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires a named token; it ends when the returned guard drops.
    pub fn begin(&self, name: impl Into<String>) -> BackgroundTask {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let name = name.into();
        self.lock().insert(id, name.clone());
        debug!("event=background_task module=store status=start task_id={id} name={name}");
        BackgroundTask {
            id,
            name,
            started_at: Instant::now(),
            registry: self.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    pub fn active_names(&self) -> Vec<String> {
        self.lock().values().cloned().collect()
    }

    fn end(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, String>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Held token; dropping it ends the background task.
#[derive(Debug)]
pub struct BackgroundTask {
    id: u64,
    name: String,
    started_at: Instant,
    registry: BackgroundTasks,
}

impl BackgroundTask {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.registry.end(self.id);
        debug!(
            "event=background_task module=store status=end task_id={} name={} duration_ms={}",
            self.id,
            self.name,
            self.started_at.elapsed().as_millis()
        );
    }
}
