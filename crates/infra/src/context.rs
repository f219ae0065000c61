//! Per-call state threaded through the command pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::metadata::DomainMetadataManager;
use crate::pipeline::PipelineError;

/// Cancels the call it was taken from. Cloneable and usable from any task.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Explicit request scope: identity metadata plus cancellation and deadline.
///
/// Every pipeline stage receives `&mut CallContext` and calls
/// [`CallContext::ensure_active`] before doing work.
#[derive(Debug, Default)]
pub struct CallContext {
    metadata: DomainMetadataManager,
    deadline: Option<Instant>,
    cancel: CancelHandle,
}

impl CallContext {
    pub fn new(metadata: DomainMetadataManager) -> Self {
        Self {
            metadata,
            deadline: None,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn metadata(&self) -> &DomainMetadataManager {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut DomainMetadataManager {
        &mut self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn ensure_active(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(PipelineError::DeadlineExceeded);
        }
        Ok(())
    }
}
