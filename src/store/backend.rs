//! Low-level key-value storage backend trait and supporting types.
//!
//! The [`StorageBackend`] trait defines the contract every storage engine
//! implements: [`get`](StorageBackend::get), [`create`](StorageBackend::create),
//! [`put_if_version`](StorageBackend::put_if_version),
//! [`delete`](StorageBackend::delete) and
//! [`list_by_prefix`](StorageBackend::list_by_prefix).
//!
//! Backends are dumb KV stores. Retry loops, typed encoding and deadlines
//! live in [`VersionedStore`](crate::store::VersionedStore); policies,
//! validation and the binding protocol live in the registry.
//!
//! # Key Structure
//!
//! Keys are slash-separated paths such as `/registry/workloads/{ns}/{name}`.
//! They are produced by the registry's record accessor and are opaque here.
//! Listing uses a directory prefix ending in `/` so that namespace `a` never
//! matches records of namespace `ab`.
//!
//! # Versioning
//!
//! Every stored value carries a version drawn from a store-wide,
//! monotonically increasing counter. A key that is deleted and re-created
//! therefore never reuses an earlier version.

use std::fmt;

use async_trait::async_trait;

/// A stored value paired with its version.
///
/// # Examples
///
/// ```
/// use workload_registry::store::VersionedRecord;
///
/// let record = VersionedRecord {
///     data: b"{}".to_vec(),
///     version: 1,
/// };
/// assert_eq!(record.version, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    /// The serialized value (JSON produced by `VersionedStore`).
    pub data: Vec<u8>,

    /// Version assigned by the store on the last successful write.
    pub version: u64,
}

/// Errors that can occur during raw storage operations.
///
/// The registry maps these to [`RegistryError`](crate::RegistryError)
/// variants before surfacing them to callers.
///
/// # Examples
///
/// ```
/// use workload_registry::store::StorageError;
///
/// let err = StorageError::VersionConflict {
///     key: "/registry/workloads/default/web-0".to_string(),
///     expected: 2,
///     actual: 3,
/// };
/// assert!(err.to_string().contains("expected 2"));
/// assert!(err.is_version_conflict());
/// ```
#[derive(Debug)]
pub enum StorageError {
    /// The requested key was not found.
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A create targeted a key that already holds a value.
    AlreadyExists {
        /// The occupied key.
        key: String,
    },

    /// The stored version did not match the caller's expectation.
    VersionConflict {
        /// Key where the conflict occurred.
        key: String,
        /// Version the caller expected.
        expected: u64,
        /// Version found in storage.
        actual: u64,
    },

    /// The round trip did not finish before its deadline. The write may or
    /// may not have been applied.
    Timeout {
        /// Operation that timed out (`get`, `put_if_version`, ...).
        operation: &'static str,
        /// Key the operation addressed.
        key: String,
        /// Deadline in milliseconds.
        after_ms: u64,
    },

    /// A stored value could not be encoded or decoded.
    Codec {
        /// Key of the offending value.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// An I/O or backend-specific failure.
    Backend {
        /// Human-readable description.
        message: String,
        /// Underlying error, if any.
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StorageError {
    /// Returns `true` for [`StorageError::VersionConflict`].
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` when the failure says nothing about the stored value
    /// (timeouts and backend connectivity).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Backend { .. })
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => write!(f, "key not found: {key}"),
            Self::AlreadyExists { key } => write!(f, "key already exists: {key}"),
            Self::VersionConflict {
                key,
                expected,
                actual,
            } => write!(
                f,
                "version conflict on key {key}: expected {expected}, found {actual}"
            ),
            Self::Timeout {
                operation,
                key,
                after_ms,
            } => write!(f, "{operation} on key {key} timed out after {after_ms}ms"),
            Self::Codec { key, message } => write!(f, "codec error on key {key}: {message}"),
            Self::Backend { message, .. } => write!(f, "backend error: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend {
                source: Some(src), ..
            } => Some(src.as_ref()),
            _ => None,
        }
    }
}

/// Key-value storage backend for workload records.
///
/// Implementations must be `Send + Sync`; a single backend is shared by every
/// surface of the registry and by concurrent callers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves the value and version stored at `key`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if nothing is stored at `key`.
    /// - [`StorageError::Backend`] on backend failures.
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError>;

    /// Stores `data` at a key that must not exist yet. Returns the assigned
    /// version.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AlreadyExists`] if `key` is occupied.
    /// - [`StorageError::Backend`] on backend failures.
    async fn create(&self, key: &str, data: &[u8]) -> Result<u64, StorageError>;

    /// Replaces the value at `key` only if its version equals
    /// `expected_version`. Returns the new version.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if nothing is stored at `key`.
    /// - [`StorageError::VersionConflict`] if the versions differ.
    /// - [`StorageError::Backend`] on backend failures.
    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError>;

    /// Removes the value at `key` and returns its final state.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if nothing is stored at `key`.
    /// - [`StorageError::Backend`] on backend failures.
    async fn delete(&self, key: &str) -> Result<VersionedRecord, StorageError>;

    /// Lists every `(key, value)` whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on backend failures.
    async fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError>;
}

/// Turns a root key into a listing prefix by ensuring a trailing `/`.
///
/// # Examples
///
/// ```
/// use workload_registry::store::backend::directory_prefix;
///
/// assert_eq!(directory_prefix("/registry/workloads/default"), "/registry/workloads/default/");
/// assert_eq!(directory_prefix("/registry/workloads/"), "/registry/workloads/");
/// ```
pub fn directory_prefix(root: &str) -> String {
    if root.ends_with('/') {
        root.to_string()
    } else {
        format!("{root}/")
    }
}
