//! Error types for workload registry operations.
//!
//! [`RegistryError`] is the only error type that crosses the registry
//! boundary. Storage failures are translated into it by the record store,
//! the binding coordinator and the location resolver; raw
//! [`StorageError`](crate::store::StorageError) values never reach callers.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// A single field-level validation failure.
///
/// # Examples
///
/// ```
/// use workload_registry::FieldError;
///
/// let err = FieldError::required("target.name");
/// assert_eq!(err.field(), "target.name");
/// assert_eq!(err.to_string(), "target.name: required value");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A required field was empty or missing.
    Required {
        /// Path of the field, e.g. `target.name`.
        field: String,
    },

    /// A field carried a value that is not acceptable.
    Invalid {
        /// Path of the field.
        field: String,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        detail: String,
    },

    /// A field may not be changed through this operation.
    Forbidden {
        /// Path of the field.
        field: String,
        /// Why the change is forbidden.
        detail: String,
    },

    /// A value appears more than once where it must be unique.
    Duplicate {
        /// Path of the field.
        field: String,
        /// The duplicated value.
        value: String,
    },
}

impl FieldError {
    /// Creates a [`FieldError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        Self::Required {
            field: field.into(),
        }
    }

    /// Creates a [`FieldError::Invalid`].
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            field: field.into(),
            value: value.into(),
            detail: detail.into(),
        }
    }

    /// Creates a [`FieldError::Forbidden`].
    pub fn forbidden(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Forbidden {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Creates a [`FieldError::Duplicate`].
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns the path of the offending field.
    pub fn field(&self) -> &str {
        match self {
            Self::Required { field }
            | Self::Invalid { field, .. }
            | Self::Forbidden { field, .. }
            | Self::Duplicate { field, .. } => field,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required { field } => write!(f, "{field}: required value"),
            Self::Invalid {
                field,
                value,
                detail,
            } => write!(f, "{field}: invalid value {value:?}: {detail}"),
            Self::Forbidden { field, detail } => write!(f, "{field}: forbidden: {detail}"),
            Self::Duplicate { field, value } => write!(f, "{field}: duplicate value {value:?}"),
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced by the workload registry.
///
/// Use [`status_code`](RegistryError::status_code) to map a variant onto the
/// HTTP status an external API layer should answer with, and
/// [`is_transient`](RegistryError::is_transient) to decide whether a retry
/// with backoff makes sense.
///
/// # Examples
///
/// ```
/// use workload_registry::RegistryError;
///
/// let err = RegistryError::Unassigned { name: "web-0".to_string() };
/// assert!(err.to_string().contains("web-0"));
/// assert!(!err.is_transient());
/// ```
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The request or record failed validation.
    #[error("{resource} {name:?} is invalid: {}", join_field_errors(.errors))]
    Invalid {
        /// Resource the request was addressed to.
        resource: String,
        /// Name of the object being validated.
        name: String,
        /// Every field-level failure found.
        errors: Vec<FieldError>,
    },

    /// A namespace or name cannot be turned into a storage key.
    #[error("invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The record does not exist.
    #[error("{resource} {name:?} not found")]
    NotFound {
        /// Resource kind.
        resource: String,
        /// Record name.
        name: String,
    },

    /// A record with the same namespace and name already exists.
    #[error("{resource} {name:?} already exists")]
    AlreadyExists {
        /// Resource kind.
        resource: String,
        /// Record name.
        name: String,
    },

    /// The operation lost a race or its precondition failed.
    #[error("operation cannot be fulfilled on {resource} {name:?}: {reason}")]
    Conflict {
        /// Resource kind.
        resource: String,
        /// Record name.
        name: String,
        /// Human-readable reason, e.g. the host already holding the unit.
        reason: String,
    },

    /// The record exists but has not been placed on an execution host.
    #[error("workload {name:?} has no execution host assigned")]
    Unassigned {
        /// Record name.
        name: String,
    },

    /// The request cannot be served as specified.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The verb is not forwarded by the requesting surface.
    #[error("method {method} is not allowed on the {surface} surface")]
    MethodNotAllowed {
        /// The rejected verb.
        method: String,
        /// Surface the request was issued against.
        surface: String,
    },

    /// The store could not be reached in time. The outcome is unknown.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Description of the infrastructure failure.
        message: String,
    },

    /// Encoding failures and failing hooks.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Builds an [`Invalid`](RegistryError::Invalid) error.
    pub fn invalid(
        resource: impl Into<String>,
        name: impl Into<String>,
        errors: Vec<FieldError>,
    ) -> Self {
        Self::Invalid {
            resource: resource.into(),
            name: name.into(),
            errors,
        }
    }

    /// Builds a [`NotFound`](RegistryError::NotFound) error.
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Builds a [`Conflict`](RegistryError::Conflict) error.
    pub fn conflict(
        resource: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            resource: resource.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` when the outcome of the operation is unknown and a
    /// retry with backoff is reasonable.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Maps this error to the HTTP status code an API layer should return.
    ///
    /// # Examples
    ///
    /// ```
    /// use http::StatusCode;
    /// use workload_registry::RegistryError;
    ///
    /// let err = RegistryError::conflict("binding", "web-0", "already assigned");
    /// assert_eq!(err.status_code(), StatusCode::CONFLICT);
    /// ```
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidIdentifier { .. } | Self::BadRequest(_) | Self::Unassigned { .. } => {
                StatusCode::BAD_REQUEST
            },
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
