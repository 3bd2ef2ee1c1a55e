//! Integration tests for the binding protocol.
//!
//! Covers exactly-once assignment under concurrent binders, request
//! validation without store access, annotation merging, and the translation
//! of store failures (missing records, lost races, timeouts).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use workload_registry::config::{RegistryConfig, StoreConfig};
use workload_registry::domain::{BindingRequest, WorkloadRecord};
use workload_registry::registry::{BindingHooks, LifecycleHooks, NoopLifecycle, WorkloadStorage};
use workload_registry::store::memory::InMemoryBackend;
use workload_registry::store::{StorageBackend, StorageError, VersionedRecord};
use workload_registry::RegistryError;

fn workload(name: &str) -> WorkloadRecord {
    WorkloadRecord::new("default", name).with_container("app", "nginx:1.27")
}

async fn storage_with(name: &str) -> WorkloadStorage<InMemoryBackend> {
    let storage = WorkloadStorage::new(InMemoryBackend::new(), &RegistryConfig::default());
    storage.workloads.create(workload(name)).await.unwrap();
    storage
}

/// Backend that counts every call before delegating.
#[derive(Debug, Default)]
struct CountingBackend {
    inner: InMemoryBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        self.tick();
        self.inner.get(key).await
    }
    async fn create(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        self.tick();
        self.inner.create(key, data).await
    }
    async fn put_if_version(&self, key: &str, data: &[u8], expected: u64) -> Result<u64, StorageError> {
        self.tick();
        self.inner.put_if_version(key, data, expected).await
    }
    async fn delete(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        self.tick();
        self.inner.delete(key).await
    }
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
        self.tick();
        self.inner.list_by_prefix(prefix).await
    }
}

/// Backend whose compare-and-swap either never completes or always loses.
#[derive(Debug, Default)]
struct FaultyWrites {
    inner: InMemoryBackend,
    stall: bool,
}

#[async_trait]
impl StorageBackend for FaultyWrites {
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        self.inner.get(key).await
    }
    async fn create(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        self.inner.create(key, data).await
    }
    async fn put_if_version(&self, key: &str, _data: &[u8], expected: u64) -> Result<u64, StorageError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        Err(StorageError::VersionConflict {
            key: key.to_string(),
            expected,
            actual: expected + 1,
        })
    }
    async fn delete(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        self.inner.delete(key).await
    }
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
        self.inner.list_by_prefix(prefix).await
    }
}

/// Hooks that record which events fired.
#[derive(Debug, Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
    fail_bind: bool,
}

impl RecordingHooks {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl BindingHooks for RecordingHooks {
    async fn after_bind(&self, record: &WorkloadRecord) -> Result<(), RegistryError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("bind {} {}", record.name(), record.spec.host));
        if self.fail_bind {
            return Err(RegistryError::Internal("hook failed".to_string()));
        }
        Ok(())
    }
}

// ─── Exactly-Once Tests ─────────────────────────────────────────────────────

mod exactly_once_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_bind_sets_both_hosts() {
        let storage = storage_with("web-0").await;
        let ack = storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap();
        assert_eq!(ack.host, "node-1");

        let record = storage.workloads.get("default", "web-0").await.unwrap();
        assert_eq!(record.spec.host, "node-1");
        assert_eq!(record.status.host, "node-1");
        assert_eq!(record.version(), ack.version);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_binders_exactly_one_wins() {
        let storage = Arc::new(storage_with("web-0").await);

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                let host = format!("node-{i}");
                let result = storage
                    .binding
                    .create("default", &BindingRequest::new("web-0", host.as_str()))
                    .await;
                (host, result)
            }));
        }

        let outcomes: Vec<(String, Result<_, RegistryError>)> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let winners: Vec<&String> = outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(host, _)| host)
            .collect();
        assert_eq!(winners.len(), 1, "exactly one binder must win");
        for (_, result) in outcomes.iter().filter(|(_, r)| r.is_err()) {
            assert!(matches!(result, Err(RegistryError::Conflict { .. })));
        }

        let record = storage.workloads.get("default", "web-0").await.unwrap();
        assert_eq!(&record.spec.host, winners[0]);
        assert_eq!(record.status.host, record.spec.host);
    }

    #[tokio::test]
    async fn test_rebind_to_same_host_conflicts() {
        let storage = storage_with("web-0").await;
        let request = BindingRequest::new("web-0", "node-1");
        storage.binding.create("default", &request).await.unwrap();

        let err = storage.binding.create("default", &request).await.unwrap_err();
        match err {
            RegistryError::Conflict { reason, .. } => {
                assert!(reason.contains("already assigned to host \"node-1\""), "{reason}");
            },
            other => panic!("expected Conflict, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_rebind_to_other_host_leaves_record_unchanged() {
        let storage = storage_with("web-0").await;
        storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap();
        let before = storage.workloads.get("default", "web-0").await.unwrap();

        let err = storage
            .binding
            .create(
                "default",
                &BindingRequest::new("web-0", "node-2").with_annotation("late", "yes"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::CONFLICT);

        let after = storage.workloads.get("default", "web-0").await.unwrap();
        assert_eq!(after, before);
    }
}

// ─── Validation Tests ───────────────────────────────────────────────────────

mod validation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unknown_kind_is_invalid_without_store_access() {
        let storage = WorkloadStorage::new(CountingBackend::default(), &RegistryConfig::default());
        storage.workloads.create(workload("web-0")).await.unwrap();
        let before = storage.store().backend().calls();

        let err = storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1").with_kind("Pod"))
            .await
            .unwrap_err();
        match err {
            RegistryError::Invalid { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field(), "target.kind");
            },
            other => panic!("expected Invalid, got {other}"),
        }
        assert_eq!(storage.store().backend().calls(), before);
    }

    #[tokio::test]
    async fn test_empty_target_is_invalid() {
        let storage = WorkloadStorage::new(CountingBackend::default(), &RegistryConfig::default());
        let err = storage
            .binding
            .create("default", &BindingRequest::new("web-0", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { .. }));
        assert_eq!(storage.store().backend().calls(), 0);
    }

    #[tokio::test]
    async fn test_host_kind_aliases_accepted() {
        let storage = storage_with("web-0").await;
        storage.workloads.create(workload("web-1")).await.unwrap();

        storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1").with_kind("Node"))
            .await
            .unwrap();
        storage
            .binding
            .create("default", &BindingRequest::new("web-1", "node-1").with_kind("Minion"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_workload_is_not_found() {
        let storage = storage_with("web-0").await;
        let err = storage
            .binding
            .create("default", &BindingRequest::new("web-9", "node-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_underivable_key_is_not_found() {
        let storage = storage_with("web-0").await;
        for (namespace, name) in [("default", "a/b"), ("", "web-0"), ("default", "..")] {
            let err = storage
                .binding
                .create(namespace, &BindingRequest::new(name, "node-1"))
                .await
                .unwrap_err();
            assert!(matches!(err, RegistryError::NotFound { .. }), "{namespace:?}/{name:?}");
        }
    }
}

// ─── Annotation Tests ───────────────────────────────────────────────────────

mod annotation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_annotations_merge_on_bind() {
        let storage = WorkloadStorage::new(InMemoryBackend::new(), &RegistryConfig::default());
        storage
            .workloads
            .create(workload("web-0").with_annotation("a", "1").with_annotation("b", "old"))
            .await
            .unwrap();

        storage
            .binding
            .create(
                "default",
                &BindingRequest::new("web-0", "node-1")
                    .with_annotation("b", "new")
                    .with_annotation("c", "3"),
            )
            .await
            .unwrap();

        let record = storage.workloads.get("default", "web-0").await.unwrap();
        let expected: BTreeMap<String, String> = [("a", "1"), ("b", "new"), ("c", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(record.metadata.annotations, expected);
    }
}

// ─── Failure Translation Tests ──────────────────────────────────────────────

mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn faulty_storage(stall: bool) -> WorkloadStorage<FaultyWrites> {
        let config = RegistryConfig {
            store: StoreConfig {
                max_update_attempts: 3,
                request_timeout_ms: 100,
            },
            ..RegistryConfig::default()
        };
        WorkloadStorage::new(
            FaultyWrites {
                inner: InMemoryBackend::new(),
                stall,
            },
            &config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_unavailable_not_conflict() {
        let storage = faulty_storage(true);
        storage.workloads.create(workload("web-0")).await.unwrap();

        let err = storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unavailable { .. }), "{err}");
        assert!(err.is_transient());
        assert_eq!(err.status_code(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_conflict() {
        let storage = faulty_storage(false);
        storage.workloads.create(workload("web-0")).await.unwrap();

        let err = storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap_err();
        match err {
            RegistryError::Conflict { reason, .. } => {
                assert!(reason.contains("could not be assigned to host \"node-1\""), "{reason}");
            },
            other => panic!("expected Conflict, got {other}"),
        }
    }
}

// ─── Hook Tests ─────────────────────────────────────────────────────────────

mod hook_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hooked(hooks: Arc<RecordingHooks>) -> WorkloadStorage<InMemoryBackend> {
        let lifecycle: Arc<dyn LifecycleHooks> = Arc::new(NoopLifecycle);
        WorkloadStorage::with_hooks(InMemoryBackend::new(), &RegistryConfig::default(), lifecycle, hooks)
    }

    #[tokio::test]
    async fn test_after_bind_runs_once_on_success() {
        let hooks = Arc::new(RecordingHooks::default());
        let storage = hooked(Arc::clone(&hooks));
        storage.workloads.create(workload("web-0")).await.unwrap();

        let request = BindingRequest::new("web-0", "node-1");
        storage.binding.create("default", &request).await.unwrap();
        let _ = storage.binding.create("default", &request).await;

        assert_eq!(hooks.events(), vec!["bind web-0 node-1".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_hook_still_reports_committed_binding() {
        let hooks = Arc::new(RecordingHooks {
            fail_bind: true,
            ..RecordingHooks::default()
        });
        let storage = hooked(Arc::clone(&hooks));
        storage.workloads.create(workload("web-0")).await.unwrap();

        let status = storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap();
        assert_eq!(status.host, "node-1");
        assert_eq!(hooks.events(), vec!["bind web-0 node-1".to_string()]);

        let record = storage.workloads.get("default", "web-0").await.unwrap();
        assert_eq!(record.assigned_host(), Some("node-1"));
        assert_eq!(record.version(), status.version);
    }
}
