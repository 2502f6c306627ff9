use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, CaytError};

/// Cancellation flag of one job, checked at chunk and batch boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RegistryState {
    tasks: HashMap<String, CancelToken>,
    /// item id -> task id of the job running it
    items: HashMap<String, String>,
}

/// Active jobs, addressable by task id or item id
#[derive(Default)]
pub struct CancellationRegistry {
    state: Mutex<RegistryState>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and hand out its token. A task id that is still
    /// registered is rejected.
    pub fn register(&self, task_id: &str, item_id: &str) -> Result<CancelToken> {
        let mut state = self.state.lock();
        if state.tasks.contains_key(task_id) {
            warn!("Task id {} is already registered", task_id);
            return Err(CaytError::DuplicateInFlight(format!("task {}", task_id)));
        }

        let token = CancelToken::new();
        state.tasks.insert(task_id.to_string(), token.clone());
        state.items.insert(item_id.to_string(), task_id.to_string());
        Ok(token)
    }

    pub fn unregister(&self, task_id: &str, item_id: &str) {
        let mut state = self.state.lock();
        state.tasks.remove(task_id);
        if state.items.get(item_id).is_some_and(|owner| owner == task_id) {
            state.items.remove(item_id);
        }
    }

    /// Flag the job matching `task_id` or `item_id`. Returns whether an
    /// active job was found.
    pub fn cancel(&self, task_id: Option<&str>, item_id: Option<&str>) -> bool {
        let state = self.state.lock();
        let mut found = false;

        if let Some(token) = task_id.and_then(|id| state.tasks.get(id)) {
            token.cancel();
            found = true;
        }

        if let Some(token) = item_id
            .and_then(|id| state.items.get(id))
            .and_then(|task| state.tasks.get(task))
        {
            token.cancel();
            found = true;
        }

        if found {
            info!("Cancellation requested (task: {:?}, item: {:?})", task_id, item_id);
        }
        found
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_by_task_and_item() {
        let registry = CancellationRegistry::new();
        let first = registry.register("task-1", "item-a").unwrap();
        let second = registry.register("task-2", "item-b").unwrap();

        assert!(registry.cancel(Some("task-1"), None));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        assert!(registry.cancel(None, Some("item-b")));
        assert!(second.is_cancelled());
    }

    #[test]
    fn test_unknown_ids_report_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel(Some("missing"), Some("missing")));
        assert!(!registry.cancel(None, None));
    }

    #[test]
    fn test_unregister_forgets_job() {
        let registry = CancellationRegistry::new();
        let token = registry.register("task-1", "item-a").unwrap();
        registry.unregister("task-1", "item-a");

        assert_eq!(registry.active_count(), 0);
        assert!(!registry.cancel(Some("task-1"), Some("item-a")));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_unregister_keeps_newer_item_owner() {
        let registry = CancellationRegistry::new();
        registry.register("old", "item-a").unwrap();
        let newer = registry.register("new", "item-a").unwrap();
        registry.unregister("old", "item-a");

        assert!(registry.cancel(None, Some("item-a")));
        assert!(newer.is_cancelled());
    }

    #[test]
    fn test_reused_task_id_is_rejected() {
        let registry = CancellationRegistry::new();
        let first = registry.register("task-1", "item-a").unwrap();

        let reused = registry.register("task-1", "item-b");
        assert!(matches!(reused, Err(CaytError::DuplicateInFlight(_))));
        assert_eq!(registry.active_count(), 1);

        assert!(registry.cancel(Some("task-1"), None));
        assert!(first.is_cancelled());
        assert!(!registry.cancel(None, Some("item-b")));

        registry.unregister("task-1", "item-a");
        assert!(registry.register("task-1", "item-b").is_ok());
    }
}
