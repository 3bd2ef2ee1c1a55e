//! Generic CRUD over workload records.
//!
//! [`RecordStore`] implements create, get, list, update and delete on top of
//! a shared [`VersionedStore`]. What a surface may change is decided by its
//! policies, what happens afterwards by its hooks. The status surface is a
//! copy of the primary store with a different update policy.
//!
//! # CAS Semantics
//!
//! Updates go through [`VersionedStore::update_if_unchanged`]. A record that
//! carries a non-zero `metadata.version` is written only if the stored
//! version still matches; a mismatch surfaces as
//! [`RegistryError::Conflict`] and is not retried.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::constants::WORKLOAD_RESOURCE;
use crate::domain::{WorkloadList, WorkloadRecord};
use crate::error::{FieldError, RegistryError};
use crate::registry::accessor::RecordAccessor;
use crate::registry::hooks::{LifecycleHooks, NoopLifecycle};
use crate::registry::policy::{CreatePolicy, DeletePolicy, UpdatePolicy, WorkloadPolicy};
use crate::store::backend::directory_prefix;
use crate::store::{StorageBackend, StorageError, UpdateError, VersionedStore};

/// Selects records returned by [`RecordStore::list`].
///
/// A record matches when every requested label is present with an equal
/// value and, if `host` is set, its `spec.host` equals it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Labels every returned record must carry.
    pub labels: BTreeMap<String, String>,

    /// Only records assigned to this host.
    pub host: Option<String>,
}

impl ListOptions {
    /// Requires label `key` with value `value`.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Requires assignment to `host`.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Returns `true` if `record` is selected.
    pub fn matches(&self, record: &WorkloadRecord) -> bool {
        let labels_match = self
            .labels
            .iter()
            .all(|(k, v)| record.metadata.labels.get(k) == Some(v));
        let host_match = self
            .host
            .as_deref()
            .map_or(true, |host| record.spec.host == host);
        labels_match && host_match
    }
}

/// Outcome of [`RecordStore::delete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    /// The final state of the removed record.
    Deleted(WorkloadRecord),

    /// The record was removed; its final state is not returned.
    Acknowledged {
        /// Namespace of the removed record.
        namespace: String,
        /// Name of the removed record.
        name: String,
    },
}

impl DeleteResult {
    /// The removed record, if this store returns it.
    pub fn into_record(self) -> Option<WorkloadRecord> {
        match self {
            Self::Deleted(record) => Some(record),
            Self::Acknowledged { .. } => None,
        }
    }
}

/// Translates a storage failure on `name` into a registry error.
pub(crate) fn storage_error(resource: &str, name: &str, err: StorageError) -> RegistryError {
    match err {
        StorageError::NotFound { .. } => RegistryError::not_found(resource, name),
        StorageError::AlreadyExists { .. } => RegistryError::AlreadyExists {
            resource: resource.to_string(),
            name: name.to_string(),
        },
        StorageError::VersionConflict {
            expected, actual, ..
        } => RegistryError::conflict(
            resource,
            name,
            format!(
                "the record has been modified (expected version {expected}, found {actual}); \
                 apply your changes to the latest version and try again"
            ),
        ),
        err @ (StorageError::Timeout { .. } | StorageError::Backend { .. }) => {
            RegistryError::Unavailable {
                message: err.to_string(),
            }
        },
        err @ StorageError::Codec { .. } => RegistryError::Internal(err.to_string()),
    }
}

/// CRUD surface over workload records.
///
/// Cloning is cheap: the underlying store, policies and hooks are shared.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use workload_registry::domain::WorkloadRecord;
/// use workload_registry::registry::{ListOptions, RecordAccessor, RecordStore};
/// use workload_registry::store::memory::InMemoryBackend;
/// use workload_registry::store::VersionedStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(VersionedStore::new(InMemoryBackend::new()));
/// let records = RecordStore::new(store, RecordAccessor::default());
///
/// let created = records
///     .create(WorkloadRecord::new("default", "web-0").with_container("app", "nginx"))
///     .await
///     .unwrap();
/// assert!(created.version() > 0);
///
/// let list = records.list("default", &ListOptions::default()).await.unwrap();
/// assert_eq!(list.items.len(), 1);
/// # }
/// ```
pub struct RecordStore<B: StorageBackend> {
    store: Arc<VersionedStore<B>>,
    accessor: RecordAccessor,
    resource: String,
    create_policy: Arc<dyn CreatePolicy>,
    update_policy: Arc<dyn UpdatePolicy>,
    delete_policy: Arc<dyn DeletePolicy>,
    hooks: Arc<dyn LifecycleHooks>,
    return_deleted: bool,
}

impl<B: StorageBackend> Clone for RecordStore<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            accessor: self.accessor.clone(),
            resource: self.resource.clone(),
            create_policy: Arc::clone(&self.create_policy),
            update_policy: Arc::clone(&self.update_policy),
            delete_policy: Arc::clone(&self.delete_policy),
            hooks: Arc::clone(&self.hooks),
            return_deleted: self.return_deleted,
        }
    }
}

impl<B: StorageBackend> fmt::Debug for RecordStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("accessor", &self.accessor)
            .field("resource", &self.resource)
            .field("create_policy", &self.create_policy)
            .field("update_policy", &self.update_policy)
            .field("delete_policy", &self.delete_policy)
            .field("hooks", &self.hooks)
            .field("return_deleted", &self.return_deleted)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> RecordStore<B> {
    /// Creates a store with [`WorkloadPolicy`], no-op hooks, and deletes that
    /// return the removed record.
    pub fn new(store: Arc<VersionedStore<B>>, accessor: RecordAccessor) -> Self {
        Self {
            store,
            accessor,
            resource: WORKLOAD_RESOURCE.to_string(),
            create_policy: Arc::new(WorkloadPolicy),
            update_policy: Arc::new(WorkloadPolicy),
            delete_policy: Arc::new(WorkloadPolicy),
            hooks: Arc::new(NoopLifecycle),
            return_deleted: true,
        }
    }

    /// Sets the resource name used in errors.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Sets the create policy.
    pub fn with_create_policy(mut self, policy: Arc<dyn CreatePolicy>) -> Self {
        self.create_policy = policy;
        self
    }

    /// Sets the update policy.
    pub fn with_update_policy(mut self, policy: Arc<dyn UpdatePolicy>) -> Self {
        self.update_policy = policy;
        self
    }

    /// Sets the delete policy.
    pub fn with_delete_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.delete_policy = policy;
        self
    }

    /// Sets the lifecycle hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Whether delete returns the removed record.
    pub fn with_return_deleted(mut self, return_deleted: bool) -> Self {
        self.return_deleted = return_deleted;
        self
    }

    /// The shared versioned store.
    pub fn store(&self) -> &Arc<VersionedStore<B>> {
        &self.store
    }

    /// The key accessor.
    pub fn accessor(&self) -> &RecordAccessor {
        &self.accessor
    }

    /// Resource name used in errors.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn invalid(&self, name: &str, errors: Vec<FieldError>) -> RegistryError {
        RegistryError::invalid(self.resource.as_str(), name, errors)
    }

    /// Stores a new record.
    ///
    /// The create policy assigns identity and resets status before
    /// validation. Returns the stored record with its version.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Invalid`] if validation fails
    /// - [`RegistryError::AlreadyExists`] if the name is taken
    /// - [`RegistryError::Unavailable`] if the store timed out
    pub async fn create(&self, mut record: WorkloadRecord) -> Result<WorkloadRecord, RegistryError> {
        self.create_policy.prepare_for_create(&mut record);
        let errors = self.create_policy.validate(&record);
        if !errors.is_empty() {
            return Err(self.invalid(record.name(), errors));
        }

        let key = self.accessor.record_key(record.namespace(), record.name())?;
        let version = self
            .store
            .create(&key, &record)
            .await
            .map_err(|e| storage_error(&self.resource, record.name(), e))?;
        record.metadata.version = version;

        tracing::info!(
            namespace = record.namespace(),
            name = record.name(),
            version,
            "workload created"
        );
        Ok(record)
    }

    /// Reads one record.
    pub async fn get(&self, namespace: &str, name: &str) -> Result<WorkloadRecord, RegistryError> {
        let key = self.accessor.record_key(namespace, name)?;
        let (mut record, version): (WorkloadRecord, u64) = self
            .store
            .get(&key)
            .await
            .map_err(|e| storage_error(&self.resource, name, e))?;
        record.metadata.version = version;
        Ok(record)
    }

    /// Lists records in `namespace` (every namespace when empty) that match
    /// `options`, sorted by namespace and name.
    ///
    /// The list version is the highest version among the returned records.
    pub async fn list(
        &self,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<WorkloadList, RegistryError> {
        let prefix = directory_prefix(&self.accessor.root_key(namespace));
        let entries = self
            .store
            .list::<WorkloadRecord>(&prefix)
            .await
            .map_err(|e| storage_error(&self.resource, namespace, e))?;

        let mut list = self.accessor.empty_list();
        for (_, mut record, version) in entries {
            record.metadata.version = version;
            if options.matches(&record) {
                list.version = list.version.max(version);
                list.items.push(record);
            }
        }
        list.items.sort_by(|a, b| {
            (a.namespace(), a.name()).cmp(&(b.namespace(), b.name()))
        });

        tracing::debug!(namespace, count = list.items.len(), "listed workloads");
        Ok(list)
    }

    /// Replaces a record through the update policy.
    ///
    /// A non-zero `record.metadata.version` makes the write conditional on
    /// that version. The policy's `prepare_for_update` and
    /// `validate_update` run against the freshly read record on every
    /// compare-and-swap attempt. The `after_update` hook runs once the write
    /// succeeded.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the record does not exist
    /// - [`RegistryError::Invalid`] if the policy rejects the change
    /// - [`RegistryError::Conflict`] if the version precondition failed or
    ///   the version race could not be won
    /// - [`RegistryError::Unavailable`] if the store timed out
    pub async fn update(&self, record: WorkloadRecord) -> Result<WorkloadRecord, RegistryError> {
        let key = self.accessor.record_key(record.namespace(), record.name())?;
        let name = record.name().to_string();

        let precondition = match record.version() {
            0 if !self.update_policy.allow_unconditional_update() => {
                return Err(self.invalid(
                    &name,
                    vec![FieldError::required("metadata.version")],
                ));
            },
            0 => None,
            version => Some(version),
        };

        let policy = Arc::clone(&self.update_policy);
        let result = self
            .store
            .update_if_unchanged(&key, precondition, |old: WorkloadRecord| {
                let mut new = record.clone();
                policy.prepare_for_update(&mut new, &old);
                let errors = policy.validate_update(&new, &old);
                if errors.is_empty() {
                    Ok(new)
                } else {
                    Err(errors)
                }
            })
            .await;

        let (mut updated, version) = match result {
            Ok(stored) => stored,
            Err(UpdateError::Rejected(errors)) => return Err(self.invalid(&name, errors)),
            Err(UpdateError::Storage(err)) => {
                if err.is_version_conflict() {
                    tracing::warn!(key = key.as_str(), error = %err, "update conflict");
                }
                return Err(storage_error(&self.resource, &name, err));
            },
        };
        updated.metadata.version = version;

        tracing::debug!(key = key.as_str(), version, resource = self.resource.as_str(), "record updated");
        self.hooks.after_update(&updated).await?;
        Ok(updated)
    }

    /// Removes a record.
    ///
    /// Runs the `after_delete` hook with the record's final state, then
    /// returns that state or an acknowledgement, depending on
    /// [`with_return_deleted`](Self::with_return_deleted).
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteResult, RegistryError> {
        let key = self.accessor.record_key(namespace, name)?;
        let errors = self.delete_policy.validate_delete(namespace, name);
        if !errors.is_empty() {
            return Err(self.invalid(name, errors));
        }

        let (mut record, version): (WorkloadRecord, u64) = self
            .store
            .delete(&key)
            .await
            .map_err(|e| storage_error(&self.resource, name, e))?;
        record.metadata.version = version;

        tracing::info!(namespace, name, "workload deleted");
        self.hooks.after_delete(&record).await?;

        if self.return_deleted {
            Ok(DeleteResult::Deleted(record))
        } else {
            Ok(DeleteResult::Acknowledged {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        }
    }
}
