//! Versioned key-value storage.
//!
//! # Architecture
//!
//! 1. **[`StorageBackend`]** -- dumb KV trait that engines implement. No
//!    domain logic.
//! 2. **[`VersionedStore<B>`](versioned::VersionedStore)** -- JSON encoding,
//!    per-call deadlines and the bounded update-if-unchanged retry loop.
//!
//! The registry shares one `Arc<VersionedStore<B>>` between every surface of
//! a workload resource.
//!
//! # Backends
//!
//! - [`InMemoryBackend`](memory::InMemoryBackend) -- thread-safe in-memory
//!   backend using `DashMap`.

pub mod backend;
pub mod memory;
pub mod versioned;

pub use backend::{StorageBackend, StorageError, VersionedRecord};
pub use versioned::{UpdateError, VersionedStore};
