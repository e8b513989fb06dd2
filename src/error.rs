//! Error types for the metadata repository core
//!
//! Every recoverable error crossing the core's boundary carries four things:
//! a numeric status class, the operation that failed, a formatted message,
//! and fixed system-action/user-action advisory text. Broken internal
//! invariants (a corrupted type, a mis-wired registry) are not recoverable
//! and fail fast via [`repository_corruption`] and [`logic_error`].

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Refinement of [`CoreError::PropertyError`] telling the caller which
/// schema rule the instance data broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyErrorKind {
    /// Property name is not declared on the type
    BadPropertyForType,
    /// Property was supplied with an explicit null value
    NullPropertyValue,
    /// Property value's category could not be resolved
    NullPropertyType,
    /// Value category does not match the declared attribute category
    BadPropertyType,
    /// The type declares no attributes at all
    NoPropertiesForType,
}

/// Recoverable errors raised by the registry, patch engine, factory and
/// validator. Callers are expected to handle these; none is retried
/// internally.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("METAREPO-400-001 {method_name} ({source_name}): {message}")]
    InvalidParameter {
        source_name: String,
        method_name: &'static str,
        message: String,
    },

    #[error("METAREPO-404-002 {method_name} ({source_name}): {message}")]
    TypeError {
        source_name: String,
        method_name: &'static str,
        message: String,
    },

    #[error("METAREPO-409-003 {method_name} ({source_name}): {message}")]
    PatchError {
        source_name: String,
        method_name: &'static str,
        message: String,
    },

    #[error("METAREPO-400-004 {method_name} ({source_name}): {kind:?}: {message}")]
    PropertyError {
        kind: PropertyErrorKind,
        source_name: String,
        method_name: &'static str,
        message: String,
    },

    #[error("METAREPO-404-005 {method_name} ({source_name}): {message}")]
    ClassificationError {
        source_name: String,
        method_name: &'static str,
        message: String,
    },

    #[error("METAREPO-409-006 {method_name} ({source_name}): {message}")]
    StatusNotSupported {
        source_name: String,
        method_name: &'static str,
        message: String,
    },

    #[error("METAREPO-400-007 {method_name} ({source_name}): {message}")]
    InvalidRelationshipEnds {
        source_name: String,
        method_name: &'static str,
        message: String,
    },
}

impl CoreError {
    /// Numeric status class for the error (HTTP-style)
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::InvalidParameter { .. } => 400,
            CoreError::TypeError { .. } => 404,
            CoreError::PatchError { .. } => 409,
            CoreError::PropertyError { .. } => 400,
            CoreError::ClassificationError { .. } => 404,
            CoreError::StatusNotSupported { .. } => 409,
            CoreError::InvalidRelationshipEnds { .. } => 400,
        }
    }

    /// Name of the operation that raised the error
    pub fn method_name(&self) -> &'static str {
        match self {
            CoreError::InvalidParameter { method_name, .. }
            | CoreError::TypeError { method_name, .. }
            | CoreError::PatchError { method_name, .. }
            | CoreError::PropertyError { method_name, .. }
            | CoreError::ClassificationError { method_name, .. }
            | CoreError::StatusNotSupported { method_name, .. }
            | CoreError::InvalidRelationshipEnds { method_name, .. } => method_name,
        }
    }

    /// Caller tag that was passed to the failing operation
    pub fn source_name(&self) -> &str {
        match self {
            CoreError::InvalidParameter { source_name, .. }
            | CoreError::TypeError { source_name, .. }
            | CoreError::PatchError { source_name, .. }
            | CoreError::PropertyError { source_name, .. }
            | CoreError::ClassificationError { source_name, .. }
            | CoreError::StatusNotSupported { source_name, .. }
            | CoreError::InvalidRelationshipEnds { source_name, .. } => source_name,
        }
    }

    /// Fixed description of what the system did with the request
    pub fn system_action(&self) -> &'static str {
        match self {
            CoreError::InvalidParameter { .. } => {
                "The system rejected the request without processing it."
            }
            CoreError::TypeError { .. } => {
                "The system could not resolve the requested type and abandoned the operation."
            }
            CoreError::PatchError { .. } => {
                "The system left the original type definition unchanged."
            }
            CoreError::PropertyError { .. } => {
                "The system rejected the instance data before it was stored or emitted."
            }
            CoreError::ClassificationError { .. } => {
                "The system left the entity's classifications unchanged."
            }
            CoreError::StatusNotSupported { .. } => {
                "The system refused the status transition."
            }
            CoreError::InvalidRelationshipEnds { .. } => {
                "The system rejected the relationship before it was stored or emitted."
            }
        }
    }

    /// Fixed advice for the caller
    pub fn user_action(&self) -> &'static str {
        match self {
            CoreError::InvalidParameter { .. } => {
                "Correct the request parameters and retry."
            }
            CoreError::TypeError { .. } => {
                "Check the type name/GUID against the active type gallery."
            }
            CoreError::PatchError { .. } => {
                "Refresh the type definition and rebuild the patch against its current version."
            }
            CoreError::PropertyError { .. } => {
                "Align the instance properties with the type's attribute definitions."
            }
            CoreError::ClassificationError { .. } => {
                "Check the classification name against the entity's classification set."
            }
            CoreError::StatusNotSupported { .. } => {
                "Use one of the statuses declared valid by the instance's type."
            }
            CoreError::InvalidRelationshipEnds { .. } => {
                "Supply entity proxies whose types match the relationship definition's end constraints."
            }
        }
    }

    pub fn invalid_parameter(
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::InvalidParameter {
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }

    pub fn type_error(
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::TypeError {
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }

    pub fn patch_error(
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::PatchError {
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }

    pub fn property_error(
        kind: PropertyErrorKind,
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::PropertyError {
            kind,
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }

    pub fn classification_error(
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::ClassificationError {
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }

    pub fn status_not_supported(
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::StatusNotSupported {
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }

    pub fn invalid_relationship_ends(
        source_name: &str,
        method_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError::InvalidRelationshipEnds {
            source_name: source_name.to_string(),
            method_name,
            message: message.into(),
        }
    }
}

/// An instance or type retrieved from the repository is internally
/// inconsistent. This means the store itself is corrupted; the process
/// cannot reason about metadata any further, so it aborts.
pub fn repository_corruption(source_name: &str, method_name: &str, detail: &str) -> ! {
    panic!(
        "METAREPO-500-001 {method_name} ({source_name}): repository content is corrupted: {detail}. \
         The repository must be repaired before the server is restarted."
    )
}

/// The core's own preconditions were violated, normally because its
/// operations were called in the wrong order or before the registry was
/// wired up.
pub fn logic_error(source_name: &str, method_name: &str, detail: &str) -> ! {
    panic!(
        "METAREPO-500-002 {method_name} ({source_name}): internal logic error: {detail}. \
         Report this as a bug in the calling connector or in the core itself."
    )
}
