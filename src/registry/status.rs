//! Status-only update surface.

use std::sync::Arc;

use crate::domain::WorkloadRecord;
use crate::error::RegistryError;
use crate::registry::generic::RecordStore;
use crate::registry::policy::StatusPolicy;
use crate::store::StorageBackend;

/// Updates only the `status` of a workload.
///
/// A copy of the primary [`RecordStore`] whose update policy is
/// [`StatusPolicy`]: spec and metadata are always taken from the stored
/// record, status from the caller, and `status.host` may not change.
#[derive(Debug)]
pub struct StatusSurface<B: StorageBackend> {
    records: RecordStore<B>,
}

impl<B: StorageBackend> Clone for StatusSurface<B> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<B: StorageBackend> StatusSurface<B> {
    /// Derives the status surface from the primary store.
    pub fn new(primary: &RecordStore<B>) -> Self {
        let resource = format!("{}/status", primary.resource());
        Self {
            records: primary
                .clone()
                .with_resource(resource)
                .with_update_policy(Arc::new(StatusPolicy)),
        }
    }

    /// Stores `record.status` on the existing record.
    ///
    /// Same precondition and error rules as
    /// [`RecordStore::update`].
    pub async fn update(&self, record: WorkloadRecord) -> Result<WorkloadRecord, RegistryError> {
        self.records.update(record).await
    }
}
