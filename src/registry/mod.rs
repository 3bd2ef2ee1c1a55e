//! Workload registry surfaces.
//!
//! # Architecture
//!
//! 1. **[`RecordAccessor`]** -- storage key derivation.
//! 2. **[`RecordStore`]** -- generic CRUD driven by [`policy`] and [`hooks`].
//! 3. **[`BindingCoordinator`]** -- exactly-once host assignment.
//! 4. **[`LocationResolver`]** -- agent address of a workload's host, used
//!    by the log and proxy surfaces.
//! 5. **[`WorkloadStorage`]** -- every surface assembled over one shared
//!    store.

pub mod accessor;
pub mod binding;
pub mod composer;
pub mod generic;
pub mod hooks;
pub mod location;
pub mod policy;
pub mod status;

pub use accessor::RecordAccessor;
pub use binding::{assign_host, AssignmentRejected, BindingCoordinator, BindingStatus, BindingSurface};
pub use composer::WorkloadStorage;
pub use generic::{DeleteResult, ListOptions, RecordStore};
pub use hooks::{BindingHooks, LifecycleHooks, NoopLifecycle};
pub use location::{
    ExecutionLocation, ForwardTransport, LocationResolver, LogOptions, LogSurface, ProxySurface,
    RedirectCapabilities,
};
pub use policy::{CreatePolicy, DeletePolicy, StatusPolicy, UpdatePolicy, WorkloadPolicy};
pub use status::StatusSurface;
