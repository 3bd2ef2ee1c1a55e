//! Assembly of every surface of the workload resource.

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::registry::accessor::RecordAccessor;
use crate::registry::binding::{BindingCoordinator, BindingSurface};
use crate::registry::generic::RecordStore;
use crate::registry::hooks::{BindingHooks, LifecycleHooks, NoopLifecycle};
use crate::registry::location::{LocationResolver, LogSurface, ProxySurface};
use crate::registry::status::StatusSurface;
use crate::store::{StorageBackend, VersionedStore};

/// The primary workload surface plus its binding, status, log and proxy
/// sub-resources.
///
/// Every surface shares one [`VersionedStore`] and one [`RecordAccessor`],
/// so they all observe the same records.
///
/// # Examples
///
/// ```
/// use workload_registry::config::RegistryConfig;
/// use workload_registry::domain::{BindingRequest, WorkloadRecord};
/// use workload_registry::registry::{LogOptions, WorkloadStorage};
/// use workload_registry::store::memory::InMemoryBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let storage = WorkloadStorage::new(InMemoryBackend::new(), &RegistryConfig::default());
/// storage
///     .workloads
///     .create(WorkloadRecord::new("default", "web-0").with_container("app", "nginx"))
///     .await
///     .unwrap();
///
/// storage
///     .binding
///     .create("default", &BindingRequest::new("web-0", "node-1"))
///     .await
///     .unwrap();
///
/// let location = storage
///     .log
///     .resolve_location("default", "web-0", &LogOptions::default())
///     .await
///     .unwrap();
/// assert_eq!(
///     location.url.as_str(),
///     "http://node-1:10250/containerLogs/default/web-0/app"
/// );
/// # }
/// ```
#[derive(Debug)]
pub struct WorkloadStorage<B: StorageBackend> {
    /// Create, get, list, update and delete.
    pub workloads: RecordStore<B>,

    /// Host assignment.
    pub binding: BindingSurface<B>,

    /// Status-only updates.
    pub status: StatusSurface<B>,

    /// Container log location.
    pub log: LogSurface<B>,

    /// Proxy location.
    pub proxy: ProxySurface<B>,
}

impl<B: StorageBackend> WorkloadStorage<B> {
    /// Assembles every surface over `backend` with no-op hooks.
    pub fn new(backend: B, config: &RegistryConfig) -> Self {
        Self::with_hooks(backend, config, Arc::new(NoopLifecycle), Arc::new(NoopLifecycle))
    }

    /// Assembles every surface over `backend` with the given hooks.
    pub fn with_hooks(
        backend: B,
        config: &RegistryConfig,
        lifecycle: Arc<dyn LifecycleHooks>,
        binding_hooks: Arc<dyn BindingHooks>,
    ) -> Self {
        let store = Arc::new(VersionedStore::new(backend).with_config(config.store.clone()));
        let accessor = RecordAccessor::new(config.key_prefix.as_str());

        let workloads = RecordStore::new(Arc::clone(&store), accessor.clone()).with_hooks(lifecycle);
        let status = StatusSurface::new(&workloads);
        let binding = BindingSurface::new(
            BindingCoordinator::new(Arc::clone(&store), accessor.clone()).with_hooks(binding_hooks),
        );
        let resolver = LocationResolver::new(store, accessor, config.agent.clone());

        tracing::debug!(key_prefix = config.key_prefix.as_str(), "workload storage assembled");
        Self {
            workloads,
            binding,
            status,
            log: LogSurface::new(resolver.clone()),
            proxy: ProxySurface::new(resolver),
        }
    }

    /// The store every surface shares.
    pub fn store(&self) -> &Arc<VersionedStore<B>> {
        self.workloads.store()
    }
}
