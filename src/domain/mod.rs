//! Domain types: the persisted workload record and the transient binding
//! request.

pub mod binding;
pub mod record;

pub use binding::{BindingRequest, BindingTarget};
pub use record::{
    Container, ObjectMeta, WorkloadList, WorkloadPhase, WorkloadRecord, WorkloadSpec,
    WorkloadStatus,
};
