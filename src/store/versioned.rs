//! Typed access and the atomic update-if-unchanged primitive.
//!
//! [`VersionedStore`] wraps a [`StorageBackend`] with JSON encoding, a
//! per-call deadline and [`update_if_unchanged`](VersionedStore::update_if_unchanged),
//! the read / mutate / compare-and-swap loop every registry mutation goes
//! through.
//!
//! # Retry Semantics
//!
//! A mutation function is a pure `current value -> new value or rejection`
//! function. When the compare-and-swap loses a version race the store reads
//! the record again and calls the function again, up to
//! [`StoreConfig::max_update_attempts`] times. A rejection returned by the
//! function ends the loop immediately and is never retried.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::store::backend::{StorageBackend, StorageError};

/// Failure of [`VersionedStore::update_if_unchanged`].
#[derive(Debug)]
pub enum UpdateError<E> {
    /// The store failed, or the version race could not be won within the
    /// configured number of attempts.
    Storage(StorageError),

    /// The mutation function rejected the current value.
    Rejected(E),
}

impl<E> From<StorageError> for UpdateError<E> {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Typed, deadline-bounded view over a [`StorageBackend`].
///
/// # Examples
///
/// ```
/// use workload_registry::config::StoreConfig;
/// use workload_registry::store::memory::InMemoryBackend;
/// use workload_registry::store::VersionedStore;
///
/// let store = VersionedStore::new(InMemoryBackend::new()).with_config(StoreConfig {
///     max_update_attempts: 3,
///     request_timeout_ms: 1_000,
/// });
/// assert_eq!(store.config().max_update_attempts, 3);
/// ```
#[derive(Debug)]
pub struct VersionedStore<B: StorageBackend> {
    backend: B,
    config: StoreConfig,
}

impl<B: StorageBackend> VersionedStore<B> {
    /// Creates a store over `backend` with the default [`StoreConfig`].
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: StoreConfig::default(),
        }
    }

    /// Sets the retry and deadline configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn bounded<T, F>(&self, operation: &'static str, key: &str, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let after_ms = self.config.request_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(after_ms), call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, key, after_ms, "storage call timed out");
                Err(StorageError::Timeout {
                    operation,
                    key: key.to_string(),
                    after_ms,
                })
            },
        }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|e| StorageError::Codec {
            key: key.to_string(),
            message: format!("failed to encode value: {e}"),
        })
    }

    fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(data).map_err(|e| StorageError::Codec {
            key: key.to_string(),
            message: format!("failed to decode value: {e}"),
        })
    }

    /// Reads and decodes the value at `key` together with its version.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<(T, u64), StorageError> {
        let stored = self.bounded("get", key, self.backend.get(key)).await?;
        let value = Self::decode(key, &stored.data)?;
        Ok((value, stored.version))
    }

    /// Encodes and stores `value` at a key that must not exist yet.
    pub async fn create<T: Serialize>(&self, key: &str, value: &T) -> Result<u64, StorageError> {
        let bytes = Self::encode(key, value)?;
        self.bounded("create", key, self.backend.create(key, &bytes))
            .await
    }

    /// Removes the value at `key` and returns its decoded final state.
    pub async fn delete<T: DeserializeOwned>(&self, key: &str) -> Result<(T, u64), StorageError> {
        let removed = self.bounded("delete", key, self.backend.delete(key)).await?;
        let value = Self::decode(key, &removed.data)?;
        Ok((value, removed.version))
    }

    /// Lists and decodes every value under `prefix`.
    ///
    /// Values that fail to decode are skipped with a warning.
    pub async fn list<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T, u64)>, StorageError> {
        let entries = self
            .bounded("list", prefix, self.backend.list_by_prefix(prefix))
            .await?;
        let decoded = entries
            .into_iter()
            .filter_map(|(key, stored)| match Self::decode(&key, &stored.data) {
                Ok(value) => Some((key, value, stored.version)),
                Err(err) => {
                    tracing::warn!(key = key.as_str(), error = %err, "skipping undecodable value");
                    None
                },
            })
            .collect();
        Ok(decoded)
    }

    /// Atomically replaces the value at `key` with `mutate(current)`.
    ///
    /// If `precondition` is `Some(version)`, the stored version must equal it
    /// or the call fails with [`StorageError::VersionConflict`] without
    /// retrying. Version races against other writers are retried, calling
    /// `mutate` again on the fresh value, until
    /// [`StoreConfig::max_update_attempts`] is exhausted; the last conflict is
    /// then returned. A rejection from `mutate` is returned immediately as
    /// [`UpdateError::Rejected`].
    pub async fn update_if_unchanged<T, E, F>(
        &self,
        key: &str,
        precondition: Option<u64>,
        mut mutate: F,
    ) -> Result<(T, u64), UpdateError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(T) -> Result<T, E>,
    {
        let attempts = self.config.max_update_attempts.max(1);
        let mut last_conflict = None;

        for attempt in 1..=attempts {
            let (current, version) = self.get::<T>(key).await?;

            if let Some(expected) = precondition {
                if expected != version {
                    return Err(UpdateError::Storage(StorageError::VersionConflict {
                        key: key.to_string(),
                        expected,
                        actual: version,
                    }));
                }
            }

            let updated = mutate(current).map_err(UpdateError::Rejected)?;
            let bytes = Self::encode(key, &updated)?;

            match self
                .bounded(
                    "put_if_version",
                    key,
                    self.backend.put_if_version(key, &bytes, version),
                )
                .await
            {
                Ok(new_version) => return Ok((updated, new_version)),
                Err(err) if err.is_version_conflict() => {
                    tracing::debug!(key, attempt, attempts, "version race during update, retrying");
                    last_conflict = Some(err);
                },
                Err(err) => return Err(UpdateError::Storage(err)),
            }
        }

        tracing::warn!(key, attempts, "update retries exhausted");
        Err(UpdateError::Storage(last_conflict.unwrap_or(
            StorageError::VersionConflict {
                key: key.to_string(),
                expected: 0,
                actual: 0,
            },
        )))
    }
}
