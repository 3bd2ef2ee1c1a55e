//! Lifecycle hooks run after successful mutations.
//!
//! Every method has a no-op default, so an implementation only overrides
//! the events it cares about. A hook runs after the mutation has been
//! committed and never undoes the write. Errors from [`LifecycleHooks`] are
//! returned to the caller; errors from [`BindingHooks`] are only logged.

use std::fmt;

use async_trait::async_trait;

use crate::domain::WorkloadRecord;
use crate::error::RegistryError;

/// Hooks for the primary record surface.
#[async_trait]
pub trait LifecycleHooks: fmt::Debug + Send + Sync {
    /// Runs after an update has been stored. `record` carries the new
    /// version.
    async fn after_update(&self, _record: &WorkloadRecord) -> Result<(), RegistryError> {
        Ok(())
    }

    /// Runs after a record has been removed. `record` is its final state.
    async fn after_delete(&self, _record: &WorkloadRecord) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Hooks for the binding protocol.
#[async_trait]
pub trait BindingHooks: fmt::Debug + Send + Sync {
    /// Runs after a workload has been assigned to its host. An error is
    /// logged and the bind still succeeds.
    async fn after_bind(&self, _record: &WorkloadRecord) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLifecycle;

impl LifecycleHooks for NoopLifecycle {}

impl BindingHooks for NoopLifecycle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_hooks_succeed() {
        let record = WorkloadRecord::new("default", "web-0");
        assert!(NoopLifecycle.after_update(&record).await.is_ok());
        assert!(NoopLifecycle.after_delete(&record).await.is_ok());
        assert!(NoopLifecycle.after_bind(&record).await.is_ok());
    }
}
