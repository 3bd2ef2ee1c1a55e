//! Storage layer for a cluster's schedulable workload units.
//!
//! Workload records are persisted in a versioned key-value store. Besides
//! plain CRUD, each record exposes sub-resources that share its storage: a
//! binding surface that assigns the workload to an execution host exactly
//! once, a status surface that updates only observed state, and log and
//! proxy surfaces that resolve the address of the host's agent.
//!
//! # Overview
//!
//! Every mutation is an optimistic compare-and-swap against the record's
//! version. Concurrent binders on one workload are serialized by the store
//! alone: exactly one wins, the others receive
//! [`RegistryError::Conflict`].
//!
//! # Module Organization
//!
//! - [`store`] - Storage backend trait, in-memory backend, typed versioned store
//! - [`domain`] - Workload record and binding request types
//! - [`registry`] - Record store, binding coordinator, status/log/proxy surfaces
//! - [`config`] - TOML and environment configuration
//! - [`error`] - Error types with HTTP status mapping
//! - [`logging`] - `tracing` subscriber setup
//! - [`constants`] - Defaults and resource names

pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod registry;
pub mod store;

pub use config::RegistryConfig;
pub use domain::{BindingRequest, WorkloadRecord};
pub use error::{FieldError, RegistryError};
pub use registry::WorkloadStorage;
