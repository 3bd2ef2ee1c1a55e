//! The exactly-once host assignment protocol.
//!
//! [`BindingCoordinator::bind`] assigns a workload to an execution host by
//! writing `spec.host` and `status.host` in one compare-and-swap. The
//! mutation is the pure function [`assign_host`]: it only succeeds while
//! both fields still hold their expected prior value, the empty string.
//! When several binders race on the same workload the store serializes
//! them; exactly one write lands and every other binder re-reads the record,
//! sees the host, and fails with [`RegistryError::Conflict`].
//!
//! No in-process locks are taken. Correctness relies only on the store's
//! version check.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{BINDING_RESOURCE, WORKLOAD_RESOURCE};
use crate::domain::{BindingRequest, WorkloadRecord};
use crate::error::RegistryError;
use crate::registry::accessor::RecordAccessor;
use crate::registry::hooks::{BindingHooks, NoopLifecycle};
use crate::store::{StorageBackend, StorageError, UpdateError, VersionedStore};

/// Host value a workload must hold before its first assignment.
const UNASSIGNED: &str = "";

/// Rejection raised by [`assign_host`] when the workload already holds a
/// host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("already assigned to host {current:?}")]
pub struct AssignmentRejected {
    /// The host found on the record.
    pub current: String,
}

/// Assigns `host` to `record` if it is still unassigned.
///
/// Both `spec.host` and `status.host` must equal the empty string.
/// On success both are set to `host` and `annotations` are merged into the
/// record's annotations, overwriting existing keys.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use workload_registry::domain::WorkloadRecord;
/// use workload_registry::registry::binding::assign_host;
///
/// let record = WorkloadRecord::new("default", "web-0");
/// let bound = assign_host(record, "node-1", &BTreeMap::new()).unwrap();
/// assert_eq!(bound.spec.host, "node-1");
/// assert_eq!(bound.status.host, "node-1");
///
/// let err = assign_host(bound, "node-2", &BTreeMap::new()).unwrap_err();
/// assert_eq!(err.current, "node-1");
/// ```
pub fn assign_host(
    mut record: WorkloadRecord,
    host: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<WorkloadRecord, AssignmentRejected> {
    for current in [&record.spec.host, &record.status.host] {
        if current != UNASSIGNED {
            return Err(AssignmentRejected {
                current: current.clone(),
            });
        }
    }

    record.spec.host = host.to_string();
    record.status.host = host.to_string();
    record
        .metadata
        .annotations
        .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(record)
}

/// Performs the binding protocol against a shared store.
///
/// Stateless per call; clones share the store and hooks.
pub struct BindingCoordinator<B: StorageBackend> {
    store: Arc<VersionedStore<B>>,
    accessor: RecordAccessor,
    hooks: Arc<dyn BindingHooks>,
}

impl<B: StorageBackend> Clone for BindingCoordinator<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            accessor: self.accessor.clone(),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<B: StorageBackend> fmt::Debug for BindingCoordinator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingCoordinator")
            .field("accessor", &self.accessor)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> BindingCoordinator<B> {
    /// Creates a coordinator with no-op hooks.
    pub fn new(store: Arc<VersionedStore<B>>, accessor: RecordAccessor) -> Self {
        Self {
            store,
            accessor,
            hooks: Arc::new(NoopLifecycle),
        }
    }

    /// Sets the hooks run after a successful bind.
    pub fn with_hooks(mut self, hooks: Arc<dyn BindingHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Assigns workload `request.name` in `namespace` to `request.target`.
    ///
    /// Returns the bound record with its new version.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Invalid`] if the request is malformed; the store is
    ///   not touched
    /// - [`RegistryError::NotFound`] if the workload does not exist or its
    ///   key cannot be derived
    /// - [`RegistryError::Conflict`] if the workload already has a host, or
    ///   the version race could not be won
    /// - [`RegistryError::Unavailable`] if the store timed out; the
    ///   assignment may or may not have been applied
    pub async fn bind(
        &self,
        namespace: &str,
        request: &BindingRequest,
    ) -> Result<WorkloadRecord, RegistryError> {
        let name = request.name.as_str();
        let host = request.target.name.as_str();

        let errors = request.validate();
        if !errors.is_empty() {
            return Err(RegistryError::invalid(BINDING_RESOURCE, name, errors));
        }

        let key = self.accessor.record_key(namespace, name).map_err(|err| {
            tracing::debug!(namespace, name, error = %err, "binding target has no valid key");
            RegistryError::not_found(WORKLOAD_RESOURCE, name)
        })?;

        let result = self
            .store
            .update_if_unchanged(&key, None, |record: WorkloadRecord| {
                assign_host(record, host, &request.annotations)
            })
            .await;

        match result {
            Ok((mut record, version)) => {
                record.metadata.version = version;
                tracing::info!(namespace, name, host, version, "workload bound");
                if let Err(err) = self.hooks.after_bind(&record).await {
                    tracing::error!(namespace, name, host, error = %err, "after_bind hook failed");
                }
                Ok(record)
            },
            Err(UpdateError::Rejected(rejected)) => {
                tracing::warn!(namespace, name, host, current = rejected.current.as_str(), "binding rejected");
                Err(RegistryError::conflict(
                    BINDING_RESOURCE,
                    name,
                    format!("workload {name} is already assigned to host {:?}", rejected.current),
                ))
            },
            Err(UpdateError::Storage(err)) => Err(binding_storage_error(name, host, err)),
        }
    }
}

fn binding_storage_error(name: &str, host: &str, err: StorageError) -> RegistryError {
    match err {
        StorageError::NotFound { .. } => RegistryError::not_found(WORKLOAD_RESOURCE, name),
        err if err.is_transient() => {
            tracing::warn!(name, host, error = %err, "binding outcome unknown");
            RegistryError::Unavailable {
                message: err.to_string(),
            }
        },
        err @ StorageError::VersionConflict { .. } => {
            tracing::warn!(name, host, error = %err, "binding lost every version race");
            RegistryError::conflict(
                BINDING_RESOURCE,
                name,
                format!("workload {name} could not be assigned to host {host:?}: {err}"),
            )
        },
        err => RegistryError::conflict(BINDING_RESOURCE, name, err.to_string()),
    }
}

/// Acknowledgement returned by [`BindingSurface::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingStatus {
    /// Namespace of the bound workload.
    pub namespace: String,

    /// Name of the bound workload.
    pub name: String,

    /// Host the workload was assigned to.
    pub host: String,

    /// Record version written by the binding.
    pub version: u64,
}

/// Create-only surface for binding requests.
#[derive(Debug)]
pub struct BindingSurface<B: StorageBackend> {
    coordinator: BindingCoordinator<B>,
}

impl<B: StorageBackend> Clone for BindingSurface<B> {
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<B: StorageBackend> BindingSurface<B> {
    /// Wraps a coordinator.
    pub fn new(coordinator: BindingCoordinator<B>) -> Self {
        Self { coordinator }
    }

    /// An empty request, as a template for callers.
    pub fn new_request(&self) -> BindingRequest {
        BindingRequest::default()
    }

    /// The coordinator requests are delegated to.
    pub fn coordinator(&self) -> &BindingCoordinator<B> {
        &self.coordinator
    }

    /// Binds and acknowledges. Errors are those of
    /// [`BindingCoordinator::bind`].
    pub async fn create(
        &self,
        namespace: &str,
        request: &BindingRequest,
    ) -> Result<BindingStatus, RegistryError> {
        let record = self.coordinator.bind(namespace, request).await?;
        Ok(BindingStatus {
            namespace: record.metadata.namespace,
            name: record.metadata.name,
            host: record.spec.host,
            version: record.metadata.version,
        })
    }
}
