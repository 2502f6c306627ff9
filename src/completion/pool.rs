use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Result, CaytError};
use super::{CompletionRequest, CompletionService};

/// Bounded worker pool for completion calls.
///
/// Each submission runs as its own task and waits for one of `size` permits,
/// so independent jobs progress concurrently without unbounded fan-out.
/// Callers await their handles in order; reply order never depends on which
/// call finishes first.
#[derive(Clone)]
pub struct CompletionPool {
    service: Arc<dyn CompletionService>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl CompletionPool {
    pub fn new(service: Arc<dyn CompletionService>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            service,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running call
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Submit one call; the handle resolves to the reply
    pub fn submit(&self, request: CompletionRequest) -> JoinHandle<Result<String>> {
        let service = Arc::clone(&self.service);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| CaytError::Completion("completion pool closed".to_string()))?;
            service.complete(request).await
        })
    }

    /// Submit and wait
    pub async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.submit(request)
            .await
            .map_err(|e| CaytError::Completion(format!("completion task aborted: {}", e)))?
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.service.list_models().await
    }

    pub async fn check_reachable(&self) -> bool {
        self.service.check_reachable().await
    }
}
