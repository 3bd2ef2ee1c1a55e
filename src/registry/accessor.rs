//! Storage key derivation for workload records.
//!
//! Keys have the form `{prefix}/{namespace}/{name}`. A namespace alone maps
//! to `{prefix}/{namespace}` and the empty namespace to `{prefix}`, which
//! lists every namespace.

use crate::constants::DEFAULT_KEY_PREFIX;
use crate::domain::{WorkloadList, WorkloadRecord};
use crate::error::RegistryError;

/// Derives storage keys and supplies zero values for generic CRUD.
///
/// Every method is a pure function of its inputs.
///
/// # Examples
///
/// ```
/// use workload_registry::registry::RecordAccessor;
///
/// let accessor = RecordAccessor::new("/registry/workloads");
/// assert_eq!(accessor.root_key("default"), "/registry/workloads/default");
/// assert_eq!(
///     accessor.record_key("default", "web-0").unwrap(),
///     "/registry/workloads/default/web-0"
/// );
/// assert!(accessor.record_key("default", "a/b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAccessor {
    prefix: String,
}

impl RecordAccessor {
    /// Creates an accessor rooted at `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key prefix for every record in `namespace`, or for all records when
    /// `namespace` is empty.
    pub fn root_key(&self, namespace: &str) -> String {
        if namespace.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{}", self.prefix, namespace)
        }
    }

    /// Key of the record `namespace`/`name`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidIdentifier`] if the namespace is empty, the
    /// name is empty, or either is not a valid path segment.
    pub fn record_key(&self, namespace: &str, name: &str) -> Result<String, RegistryError> {
        if namespace.is_empty() {
            return Err(RegistryError::InvalidIdentifier {
                identifier: namespace.to_string(),
                reason: "namespace is required".to_string(),
            });
        }
        check_path_segment(namespace)?;
        if name.is_empty() {
            return Err(RegistryError::InvalidIdentifier {
                identifier: name.to_string(),
                reason: "name is required".to_string(),
            });
        }
        check_path_segment(name)?;
        let key = format!("{}/{}/{}", self.prefix, namespace, name);
        tracing::trace!(key = key.as_str(), "derived record key");
        Ok(key)
    }

    /// Name of `record` as used in its key.
    pub fn object_name<'a>(&self, record: &'a WorkloadRecord) -> &'a str {
        record.name()
    }

    /// Zero-value record used as a create/decode template.
    pub fn empty_record(&self) -> WorkloadRecord {
        WorkloadRecord::default()
    }

    /// Zero-value list used as a list template.
    pub fn empty_list(&self) -> WorkloadList {
        WorkloadList::default()
    }
}

impl Default for RecordAccessor {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

fn check_path_segment(segment: &str) -> Result<(), RegistryError> {
    let reason = if segment == "." || segment == ".." {
        Some(format!("may not be {segment:?}"))
    } else {
        segment
            .chars()
            .find(|c| matches!(c, '/' | '%'))
            .map(|c| format!("may not contain {c:?}"))
    };
    match reason {
        Some(reason) => Err(RegistryError::InvalidIdentifier {
            identifier: segment.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
