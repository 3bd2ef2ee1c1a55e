//! Pluggable create, update and delete policies.
//!
//! A policy supplies the defaulting and validation rules a
//! [`RecordStore`](super::RecordStore) applies around each mutation. The
//! primary workload surface uses [`WorkloadPolicy`]; the status surface is
//! the same store with [`StatusPolicy`] as its update policy.

use std::collections::HashSet;
use std::fmt;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{WorkloadRecord, WorkloadStatus};
use crate::error::FieldError;

/// Defaulting and validation applied before a record is created.
pub trait CreatePolicy: fmt::Debug + Send + Sync {
    /// Normalizes a record before validation (assigns identity, resets
    /// status).
    fn prepare_for_create(&self, record: &mut WorkloadRecord);

    /// Returns every field failure of the prepared record.
    fn validate(&self, record: &WorkloadRecord) -> Vec<FieldError>;
}

/// Defaulting and validation applied inside the compare-and-swap of an
/// update.
///
/// Both methods run inside the store's mutation function and may be called
/// several times for one update; they must not have side effects.
pub trait UpdatePolicy: fmt::Debug + Send + Sync {
    /// Copies whatever the caller may not change from `old` into `new`.
    fn prepare_for_update(&self, new: &mut WorkloadRecord, old: &WorkloadRecord);

    /// Returns every field failure of the transition `old -> new`.
    fn validate_update(&self, new: &WorkloadRecord, old: &WorkloadRecord) -> Vec<FieldError>;

    /// Whether an update without a version precondition is accepted.
    fn allow_unconditional_update(&self) -> bool {
        true
    }
}

/// Checks applied before a record is deleted.
pub trait DeletePolicy: fmt::Debug + Send + Sync {
    /// Returns the reasons `namespace`/`name` may not be deleted.
    fn validate_delete(&self, _namespace: &str, _name: &str) -> Vec<FieldError> {
        Vec::new()
    }
}

/// Rules for the primary workload surface.
///
/// - create: assigns `uid` and `creation_timestamp`, resets status to
///   `Pending`, requires an empty `spec.host`.
/// - update: status and identity are carried over from the stored record;
///   `spec.host` and the set of container names may not change.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkloadPolicy;

impl CreatePolicy for WorkloadPolicy {
    fn prepare_for_create(&self, record: &mut WorkloadRecord) {
        record.metadata.uid = Uuid::new_v4().to_string();
        record.metadata.creation_timestamp = Some(Utc::now());
        record.metadata.version = 0;
        record.status = WorkloadStatus::default();
    }

    fn validate(&self, record: &WorkloadRecord) -> Vec<FieldError> {
        let mut errors = validate_record(record);
        if !record.spec.host.is_empty() {
            errors.push(FieldError::forbidden(
                "spec.host",
                "may only be set through binding",
            ));
        }
        errors
    }
}

impl UpdatePolicy for WorkloadPolicy {
    fn prepare_for_update(&self, new: &mut WorkloadRecord, old: &WorkloadRecord) {
        new.metadata.uid.clone_from(&old.metadata.uid);
        new.metadata.creation_timestamp = old.metadata.creation_timestamp;
        new.status = old.status.clone();
    }

    fn validate_update(&self, new: &WorkloadRecord, old: &WorkloadRecord) -> Vec<FieldError> {
        let mut errors = validate_record(new);
        if new.spec.host != old.spec.host {
            errors.push(FieldError::forbidden(
                "spec.host",
                "may only be set through binding",
            ));
        }
        let new_names: Vec<&str> = new.spec.containers.iter().map(|c| c.name.as_str()).collect();
        let old_names: Vec<&str> = old.spec.containers.iter().map(|c| c.name.as_str()).collect();
        if new_names != old_names {
            errors.push(FieldError::forbidden(
                "spec.containers",
                "containers may not be added, removed or renamed",
            ));
        }
        errors
    }
}

impl DeletePolicy for WorkloadPolicy {}

/// Rules for the status surface: only `status` is taken from the caller.
///
/// Spec and metadata always come from the stored record. `status.host` is
/// owned by the binding protocol and may not change here.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPolicy;

impl UpdatePolicy for StatusPolicy {
    fn prepare_for_update(&self, new: &mut WorkloadRecord, old: &WorkloadRecord) {
        new.metadata = old.metadata.clone();
        new.spec = old.spec.clone();
    }

    fn validate_update(&self, new: &WorkloadRecord, old: &WorkloadRecord) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if new.status.host != old.status.host {
            errors.push(FieldError::forbidden(
                "status.host",
                "may only be set through binding",
            ));
        }
        errors
    }
}

/// Object-level validation shared by create and update.
fn validate_record(record: &WorkloadRecord) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if record.metadata.namespace.is_empty() {
        errors.push(FieldError::required("metadata.namespace"));
    } else if !is_dns_label(&record.metadata.namespace) {
        errors.push(FieldError::invalid(
            "metadata.namespace",
            record.metadata.namespace.clone(),
            DNS_LABEL_DETAIL,
        ));
    }

    if record.metadata.name.is_empty() {
        errors.push(FieldError::required("metadata.name"));
    } else if !is_dns_subdomain(&record.metadata.name) {
        errors.push(FieldError::invalid(
            "metadata.name",
            record.metadata.name.clone(),
            DNS_SUBDOMAIN_DETAIL,
        ));
    }

    if record.spec.containers.is_empty() {
        errors.push(FieldError::required("spec.containers"));
    }
    let mut seen = HashSet::new();
    for (i, container) in record.spec.containers.iter().enumerate() {
        let field = format!("spec.containers[{i}].name");
        if container.name.is_empty() {
            errors.push(FieldError::required(field));
        } else if !is_dns_label(&container.name) {
            errors.push(FieldError::invalid(
                field,
                container.name.clone(),
                DNS_LABEL_DETAIL,
            ));
        } else if !seen.insert(container.name.as_str()) {
            errors.push(FieldError::duplicate(field, container.name.clone()));
        }
        if container.image.is_empty() {
            errors.push(FieldError::required(format!("spec.containers[{i}].image")));
        }
    }

    errors
}

const DNS_LABEL_DETAIL: &str =
    "must be at most 63 lowercase alphanumeric characters or '-', starting and ending with an alphanumeric";
const DNS_SUBDOMAIN_DETAIL: &str =
    "must be at most 253 characters of dot-separated DNS labels";

fn is_dns_label(value: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !value.is_empty()
        && value.len() <= 63
        && value.chars().all(|c| alnum(c) || c == '-')
        && value.starts_with(alnum)
        && value.ends_with(alnum)
}

fn is_dns_subdomain(value: &str) -> bool {
    value.len() <= 253 && value.split('.').all(is_dns_label)
}
