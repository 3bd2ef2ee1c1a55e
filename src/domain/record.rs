//! Workload record -- the persisted entity.
//!
//! A [`WorkloadRecord`] is identified by `(namespace, name)` for its whole
//! lifetime. Its assignment to an execution host is held twice: the desired
//! assignment in [`WorkloadSpec::host`] and the observed assignment in
//! [`WorkloadStatus::host`]. The binding protocol is the only writer of
//! either and keeps them in lock-step.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and bookkeeping shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectMeta {
    /// Scope of the record. Immutable after creation.
    pub namespace: String,

    /// Name, unique within the namespace. Immutable.
    pub name: String,

    /// Unique identifier assigned on creation.
    pub uid: String,

    /// Free-form labels used for list filtering.
    pub labels: BTreeMap<String, String>,

    /// Free-form annotations. Binding merges into these.
    pub annotations: BTreeMap<String, String>,

    /// Set on creation.
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Version assigned by the store. Overwritten with the stored version on
    /// every read; callers send it back to make an update conditional.
    pub version: u64,
}

/// One container of a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Name, unique within the workload.
    pub name: String,

    /// Image reference.
    pub image: String,
}

/// Desired state of a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadSpec {
    /// Desired execution host. Empty while unassigned.
    pub host: String,

    /// Containers making up the workload.
    pub containers: Vec<Container>,
}

/// Coarse lifecycle phase reported by the execution host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadPhase {
    /// Accepted but not yet running.
    #[default]
    Pending,
    /// At least one container is running.
    Running,
    /// All containers exited successfully.
    Succeeded,
    /// At least one container failed.
    Failed,
    /// The host stopped reporting.
    Unknown,
}

/// Observed state of a workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadStatus {
    /// Lifecycle phase.
    pub phase: WorkloadPhase,

    /// Observed execution host. Empty while unassigned.
    pub host: String,

    /// Address of the execution host, as reported by it.
    pub host_ip: Option<String>,

    /// Address of the workload itself.
    pub workload_ip: Option<String>,

    /// Human-readable detail about the phase.
    pub message: Option<String>,
}

/// A schedulable workload unit as stored in the registry.
///
/// # Examples
///
/// ```
/// use workload_registry::domain::WorkloadRecord;
///
/// let record = WorkloadRecord::new("default", "web-0").with_container("app", "nginx:1.27");
/// assert_eq!(record.name(), "web-0");
/// assert!(!record.is_assigned());
/// assert_eq!(record.assigned_host(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadRecord {
    /// Identity and bookkeeping.
    pub metadata: ObjectMeta,

    /// Desired state.
    pub spec: WorkloadSpec,

    /// Observed state.
    pub status: WorkloadStatus,
}

impl WorkloadRecord {
    /// Creates an unassigned record with no containers.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: namespace.into(),
                name: name.into(),
                ..ObjectMeta::default()
            },
            ..Self::default()
        }
    }

    /// Adds a container.
    pub fn with_container(mut self, name: impl Into<String>, image: impl Into<String>) -> Self {
        self.spec.containers.push(Container {
            name: name.into(),
            image: image.into(),
        });
        self
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    /// The record's namespace.
    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// The record's name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The store version last observed for this record.
    pub fn version(&self) -> u64 {
        self.metadata.version
    }

    /// The desired execution host, if one has been assigned.
    pub fn assigned_host(&self) -> Option<&str> {
        if self.spec.host.is_empty() {
            None
        } else {
            Some(&self.spec.host)
        }
    }

    /// Returns `true` once either assignment field is set.
    pub fn is_assigned(&self) -> bool {
        !self.spec.host.is_empty() || !self.status.host.is_empty()
    }

    /// Looks up a container by name.
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.spec.containers.iter().find(|c| c.name == name)
    }
}

/// A list of records, as returned by list operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadList {
    /// Matching records, sorted by namespace and then name.
    pub items: Vec<WorkloadRecord>,

    /// Highest record version contained in the list.
    pub version: u64,
}
