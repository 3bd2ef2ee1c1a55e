//! Integration tests for the surfaces sharing one workload record.
//!
//! Organized into module blocks per surface: primary CRUD, status, log and
//! proxy location, and configuration wiring.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::Method;
use workload_registry::config::RegistryConfig;
use workload_registry::domain::{BindingRequest, WorkloadPhase, WorkloadRecord};
use workload_registry::registry::{
    BindingHooks, DeleteResult, LifecycleHooks, ListOptions, LogOptions, NoopLifecycle,
    WorkloadStorage,
};
use workload_registry::store::memory::InMemoryBackend;
use workload_registry::store::StorageBackend;
use workload_registry::RegistryError;

fn storage() -> WorkloadStorage<InMemoryBackend> {
    WorkloadStorage::new(InMemoryBackend::new(), &RegistryConfig::default())
}

fn workload(name: &str) -> WorkloadRecord {
    WorkloadRecord::new("default", name).with_container("app", "nginx:1.27")
}

async fn bound(storage: &WorkloadStorage<InMemoryBackend>, record: WorkloadRecord, host: &str) {
    let name = record.name().to_string();
    let namespace = record.namespace().to_string();
    storage.workloads.create(record).await.unwrap();
    storage
        .binding
        .create(&namespace, &BindingRequest::new(name, host))
        .await
        .unwrap();
}

/// Lifecycle hooks that record which events fired.
#[derive(Debug, Default)]
struct RecordingLifecycle {
    events: Mutex<Vec<String>>,
}

impl RecordingLifecycle {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl LifecycleHooks for RecordingLifecycle {
    async fn after_update(&self, record: &WorkloadRecord) -> Result<(), RegistryError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("update {}", record.name()));
        Ok(())
    }

    async fn after_delete(&self, record: &WorkloadRecord) -> Result<(), RegistryError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("delete {}", record.name()));
        Ok(())
    }
}

// ─── Primary Surface Tests ──────────────────────────────────────────────────

mod primary_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_resets_status_and_assigns_identity() {
        let storage = storage();
        let mut record = workload("web-0");
        record.status.phase = WorkloadPhase::Running;
        record.status.message = Some("lying".to_string());

        let created = storage.workloads.create(record).await.unwrap();
        assert_eq!(created.status.phase, WorkloadPhase::Pending);
        assert_eq!(created.status.message, None);
        assert!(uuid::Uuid::parse_str(&created.metadata.uid).is_ok());
        assert!(created.metadata.creation_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_create_with_host_is_invalid() {
        let storage = storage();
        let mut record = workload("web-0");
        record.spec.host = "node-1".to_string();
        let err = storage.workloads.create(record).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_update_cannot_change_host() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let mut record = storage.workloads.get("default", "web-0").await.unwrap();
        record.spec.host = "node-2".to_string();
        let err = storage.workloads.update(record).await.unwrap_err();
        match err {
            RegistryError::Invalid { errors, .. } => {
                assert!(errors.iter().any(|e| e.field() == "spec.host"));
            },
            other => panic!("expected Invalid, got {other}"),
        }

        let record = storage.workloads.get("default", "web-0").await.unwrap();
        assert_eq!(record.assigned_host(), Some("node-1"));
    }

    #[tokio::test]
    async fn test_update_keeps_status() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let mut record = storage.workloads.get("default", "web-0").await.unwrap();
        record.status.host = String::new();
        record.spec.containers[0].image = "nginx:1.28".to_string();
        let updated = storage.workloads.update(record).await.unwrap();
        assert_eq!(updated.status.host, "node-1");
        assert_eq!(updated.spec.containers[0].image, "nginx:1.28");
    }

    #[tokio::test]
    async fn test_delete_returns_final_record_and_runs_hook() {
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let binding_hooks: Arc<dyn BindingHooks> = Arc::new(NoopLifecycle);
        let storage = WorkloadStorage::with_hooks(
            InMemoryBackend::new(),
            &RegistryConfig::default(),
            lifecycle.clone(),
            binding_hooks,
        );
        bound(&storage, workload("web-0"), "node-1").await;

        let mut record = storage.workloads.get("default", "web-0").await.unwrap();
        record.metadata.labels.insert("tier".to_string(), "web".to_string());
        storage.workloads.update(record).await.unwrap();

        let deleted = storage.workloads.delete("default", "web-0").await.unwrap();
        let record = match deleted {
            DeleteResult::Deleted(record) => record,
            other => panic!("expected the deleted record, got {other:?}"),
        };
        assert_eq!(record.assigned_host(), Some("node-1"));
        assert_eq!(record.metadata.labels.get("tier").map(String::as_str), Some("web"));

        assert_eq!(lifecycle.events(), vec!["update web-0", "delete web-0"]);
        assert!(matches!(
            storage.workloads.get("default", "web-0").await,
            Err(RegistryError::NotFound { .. })
        ));
        assert!(matches!(
            storage.workloads.delete("default", "web-0").await,
            Err(RegistryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_recreated_record_never_reuses_version() {
        let storage = storage();
        let first = storage.workloads.create(workload("web-0")).await.unwrap();
        storage.workloads.delete("default", "web-0").await.unwrap();
        let second = storage.workloads.create(workload("web-0")).await.unwrap();
        assert!(second.version() > first.version());
        assert_ne!(second.metadata.uid, first.metadata.uid);
    }

    #[tokio::test]
    async fn test_list_filters_by_label_and_host() {
        let storage = storage();
        bound(&storage, workload("web-0").with_label("tier", "web"), "node-1").await;
        bound(&storage, workload("web-1").with_label("tier", "web"), "node-2").await;
        storage
            .workloads
            .create(workload("db-0").with_label("tier", "db"))
            .await
            .unwrap();
        storage
            .workloads
            .create(
                WorkloadRecord::new("other", "web-9")
                    .with_container("app", "nginx")
                    .with_label("tier", "web"),
            )
            .await
            .unwrap();

        let names = |list: workload_registry::domain::WorkloadList| -> Vec<String> {
            list.items.into_iter().map(|r| r.metadata.name).collect()
        };

        let web = storage
            .workloads
            .list("default", &ListOptions::default().with_label("tier", "web"))
            .await
            .unwrap();
        assert_eq!(names(web), vec!["web-0", "web-1"]);

        let on_node_2 = storage
            .workloads
            .list("", &ListOptions::default().with_host("node-2"))
            .await
            .unwrap();
        assert_eq!(names(on_node_2), vec!["web-1"]);

        let everything = storage.workloads.list("", &ListOptions::default()).await.unwrap();
        assert_eq!(everything.items.len(), 4);
        assert_eq!(
            everything.version,
            everything.items.iter().map(WorkloadRecord::version).max().unwrap()
        );
    }
}

// ─── Status Surface Tests ───────────────────────────────────────────────────

mod status_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_status_update_cannot_touch_spec_or_metadata() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;
        let original = storage.workloads.get("default", "web-0").await.unwrap();

        let mut change = original.clone();
        change.spec.containers[0].image = "evil:latest".to_string();
        change.metadata.labels.insert("sneaky".to_string(), "yes".to_string());
        change.status.phase = WorkloadPhase::Running;
        change.status.workload_ip = Some("10.1.0.4".to_string());

        let updated = storage.status.update(change).await.unwrap();
        assert_eq!(updated.spec, original.spec);
        assert_eq!(updated.metadata.labels, original.metadata.labels);
        assert_eq!(updated.status.phase, WorkloadPhase::Running);
        assert_eq!(updated.status.workload_ip.as_deref(), Some("10.1.0.4"));
        assert!(updated.version() > original.version());
    }

    #[tokio::test]
    async fn test_status_update_cannot_change_host() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let mut change = storage.workloads.get("default", "web-0").await.unwrap();
        change.status.host = "node-2".to_string();
        let err = storage.status.update(change).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_status_update_with_stale_version_conflicts() {
        let storage = storage();
        let created = storage.workloads.create(workload("web-0")).await.unwrap();
        storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap();

        let mut stale = created;
        stale.status.phase = WorkloadPhase::Failed;
        let err = storage.status.update(stale).await.unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }
}

// ─── Location Tests ─────────────────────────────────────────────────────────

mod location_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unassigned_then_resolved_after_binding() {
        let storage = storage();
        storage.workloads.create(workload("web-0")).await.unwrap();

        let err = storage
            .proxy
            .resolve_location("default", "web-0", "/")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Unassigned { .. }));

        storage
            .binding
            .create("default", &BindingRequest::new("web-0", "node-1"))
            .await
            .unwrap();

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "/")
            .await
            .unwrap();
        assert_eq!(location.host, "node-1");
        assert_eq!(location.url.host_str(), Some("node-1"));
        assert_eq!(location.url.port(), Some(10250));
    }

    #[tokio::test]
    async fn test_missing_workload_is_not_found() {
        let storage = storage();
        let err = storage
            .log
            .resolve_location("default", "nope", &LogOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_log_location_path_and_query() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let location = storage
            .log
            .resolve_location(
                "default",
                "web-0",
                &LogOptions::default().follow().with_tail_lines(50),
            )
            .await
            .unwrap();
        assert_eq!(
            location.url.as_str(),
            "http://node-1:10250/containerLogs/default/web-0/app?follow=true&tailLines=50"
        );

        let request = location.request(Method::GET, None).unwrap();
        assert_eq!(request.uri().path(), "/containerLogs/default/web-0/app");
        assert!(matches!(
            location.request(Method::POST, None),
            Err(RegistryError::MethodNotAllowed { .. })
        ));
        assert!(matches!(
            location.request(Method::GET, Some("SPDY/3.1")),
            Err(RegistryError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_log_requires_container_for_multi_container_workload() {
        let storage = storage();
        bound(&storage, workload("web-0").with_container("sidecar", "envoy"), "node-1").await;

        let err = storage
            .log
            .resolve_location("default", "web-0", &LogOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadRequest(_)));

        let err = storage
            .log
            .resolve_location("default", "web-0", &LogOptions::default().with_container("db"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BadRequest(_)));

        let location = storage
            .log
            .resolve_location("default", "web-0", &LogOptions::default().with_container("sidecar"))
            .await
            .unwrap();
        assert!(location.url.path().ends_with("/sidecar"));
    }

    #[tokio::test]
    async fn test_log_empty_container_name_means_unspecified() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let location = storage
            .log
            .resolve_location("default", "web-0", &LogOptions::default().with_container(""))
            .await
            .unwrap();
        assert_eq!(location.url.path(), "/containerLogs/default/web-0/app");
    }

    #[tokio::test]
    async fn test_proxy_path_keeps_query_and_drops_fragment() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "/stats/summary?only_cpu=true")
            .await
            .unwrap();
        assert_eq!(location.url.path(), "/stats/summary");
        assert_eq!(location.url.query(), Some("only_cpu=true"));
        assert_eq!(location.url.as_str(), "http://node-1:10250/stats/summary?only_cpu=true");

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "metrics?a=1&b=2#section")
            .await
            .unwrap();
        assert_eq!(location.url.path(), "/metrics");
        assert_eq!(location.url.query(), Some("a=1&b=2"));
        assert_eq!(location.url.fragment(), None);

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "/healthz?")
            .await
            .unwrap();
        assert_eq!(location.url.path(), "/healthz");
        assert_eq!(location.url.query(), None);
    }

    #[tokio::test]
    async fn test_proxy_path_dot_segments_are_normalised() {
        let storage = storage();
        bound(&storage, workload("web-0"), "node-1").await;

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "../../containerLogs/x/y/app")
            .await
            .unwrap();
        assert_eq!(location.url.as_str(), "http://node-1:10250/containerLogs/x/y/app");
        assert_eq!(location.url.host_str(), Some("node-1"));
    }

    #[tokio::test]
    async fn test_proxy_appends_path_and_allows_upgrade() {
        let storage = storage();
        bound(&storage, workload("web-0"), "fd00::7").await;

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "metrics/live")
            .await
            .unwrap();
        assert_eq!(location.url.as_str(), "http://[fd00::7]:10250/metrics/live");

        let request = location.request(Method::POST, Some("SPDY/3.1")).unwrap();
        assert_eq!(request.headers()[http::header::UPGRADE], "SPDY/3.1");
        assert!(matches!(
            location.request(Method::PATCH, None),
            Err(RegistryError::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn test_surface_capabilities() {
        let storage = storage();
        assert_eq!(storage.log.methods(), vec![Method::GET]);
        assert!(!storage.log.supports_upgrade());
        assert_eq!(
            storage.proxy.methods(),
            vec![
                Method::GET,
                Method::PUT,
                Method::POST,
                Method::DELETE,
                Method::HEAD,
                Method::OPTIONS
            ]
        );
        assert!(storage.proxy.supports_upgrade());
    }
}

// ─── Configuration Tests ────────────────────────────────────────────────────

mod config_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_config_drives_prefix_and_agent_address() {
        let config = RegistryConfig::from_toml(
            r#"
            [registry]
            key_prefix = "/custom/units"

            [registry.agent]
            port = 8443
            scheme = "https"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let storage = WorkloadStorage::new(InMemoryBackend::new(), &config);
        bound(&storage, workload("web-0"), "node-1").await;

        let keys: Vec<String> = storage
            .store()
            .backend()
            .list_by_prefix("/custom/units/")
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec!["/custom/units/default/web-0".to_string()]);

        let location = storage
            .proxy
            .resolve_location("default", "web-0", "/")
            .await
            .unwrap();
        assert_eq!(location.url.as_str(), "https://node-1:8443/");
    }
}
