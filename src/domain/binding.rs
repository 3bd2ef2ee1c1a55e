//! Binding request -- transient input to the binding protocol.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::HOST_KIND_ALIASES;
use crate::error::FieldError;

/// The execution host a workload should be assigned to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingTarget {
    /// Host kind. Empty, `Node` or `Minion`.
    pub kind: String,

    /// Host name. Required.
    pub name: String,
}

/// Request to assign the workload `name` to `target`.
///
/// Never persisted; it exists for the duration of one binding call.
///
/// # Examples
///
/// ```
/// use workload_registry::domain::BindingRequest;
///
/// let request = BindingRequest::new("web-0", "node-1").with_annotation("scheduler", "default");
/// assert!(request.validate().is_empty());
///
/// let bad = BindingRequest::new("web-0", "node-1").with_kind("Pod");
/// assert_eq!(bad.validate()[0].field(), "target.kind");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingRequest {
    /// Name of the workload to bind.
    pub name: String,

    /// Host to bind to.
    pub target: BindingTarget,

    /// Annotations merged into the workload on success.
    pub annotations: BTreeMap<String, String>,
}

impl BindingRequest {
    /// Creates a request binding workload `name` to host `host`.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: BindingTarget {
                kind: String::new(),
                name: host.into(),
            },
            annotations: BTreeMap::new(),
        }
    }

    /// Sets the target kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.target.kind = kind.into();
        self
    }

    /// Adds an annotation to merge.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Checks the request without touching storage.
    ///
    /// Returns every field failure; an empty vector means the request is
    /// well-formed.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if !self.target.kind.is_empty() && !HOST_KIND_ALIASES.contains(&self.target.kind.as_str()) {
            errors.push(FieldError::invalid(
                "target.kind",
                self.target.kind.clone(),
                "must be empty, 'Node', or 'Minion'",
            ));
        }
        if self.target.name.is_empty() {
            errors.push(FieldError::required("target.name"));
        }
        errors
    }
}
