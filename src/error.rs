//! Crate-wide error taxonomy.
//!
//! Errors are classified by intent, not by mechanism (spec §7): validation,
//! duplicate, not-found, unavailable, and internal each map to a distinct
//! gRPC status code so callers can tell a transient condition (`Unavailable`)
//! from a user mistake (`InvalidArgument`) without parsing message text.

use thiserror::Error;

/// Errors produced anywhere in the daemon: pipeline steps, controllers,
/// storage, the Temporal manager, the skill store, and the supervisor.
#[derive(Error, Debug)]
pub enum StigmerError {
    /// Failed a declared field constraint, a slug-derivation rule, or an
    /// archive-safety check. Non-retryable; the caller must fix the input.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// `CheckDuplicate` found another resource with the same slug in the
    /// same scope.
    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    /// A `Load*` step found nothing at the given id/slug.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// An update or delete was attempted against a resource that does not
    /// (or no longer) exist in a state that supports the operation.
    #[error("failed precondition: {message}")]
    FailedPrecondition { message: String },

    /// A required external collaborator — currently only Temporal — has
    /// no live client. Transient and self-healing; the caller should retry.
    #[error("unavailable: {message}")]
    Unavailable { message: String },

    /// Storage failure or other unexpected internal state.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl StigmerError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        StigmerError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        StigmerError::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StigmerError::NotFound {
            message: message.into(),
        }
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        StigmerError::FailedPrecondition {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        StigmerError::Unavailable {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StigmerError::Internal {
            message: message.into(),
        }
    }

    /// Annotate with the pipeline step name that produced this error
    /// (spec §4.1 "Errors carry the step name for diagnosability").
    /// Rewrites the message in place rather than carrying a side field, so
    /// `Display` and the annotation can never drift apart.
    pub fn with_step(self, step: &'static str) -> Self {
        let annotate = |message: String| format!("{message} (step: {step})");
        match self {
            StigmerError::InvalidArgument { message } => StigmerError::InvalidArgument {
                message: annotate(message),
            },
            StigmerError::Internal { message } => StigmerError::Internal {
                message: annotate(message),
            },
            other => other,
        }
    }

    /// Annotate with the resource kind the failing operation targeted.
    pub fn with_kind(self, kind: &'static str) -> Self {
        let annotate = |message: String| format!("{message} (kind: {kind})");
        match self {
            StigmerError::InvalidArgument { message } => StigmerError::InvalidArgument {
                message: annotate(message),
            },
            StigmerError::AlreadyExists { message } => StigmerError::AlreadyExists {
                message: annotate(message),
            },
            StigmerError::NotFound { message } => StigmerError::NotFound {
                message: annotate(message),
            },
            StigmerError::FailedPrecondition { message } => StigmerError::FailedPrecondition {
                message: annotate(message),
            },
            StigmerError::Unavailable { message } => StigmerError::Unavailable {
                message: annotate(message),
            },
            StigmerError::Internal { message } => StigmerError::Internal {
                message: annotate(message),
            },
        }
    }
}

impl From<sled::Error> for StigmerError {
    fn from(err: sled::Error) -> Self {
        StigmerError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for StigmerError {
    fn from(err: serde_json::Error) -> Self {
        StigmerError::internal(format!("marshaling failure: {err}"))
    }
}

impl From<prost::EncodeError> for StigmerError {
    fn from(err: prost::EncodeError) -> Self {
        StigmerError::internal(format!("proto encode failure: {err}"))
    }
}

impl From<prost::DecodeError> for StigmerError {
    fn from(err: prost::DecodeError) -> Self {
        StigmerError::internal(format!("proto decode failure: {err}"))
    }
}

impl From<StigmerError> for tonic::Status {
    fn from(err: StigmerError) -> Self {
        match err {
            StigmerError::InvalidArgument { .. } => {
                tonic::Status::invalid_argument(err.to_string())
            }
            StigmerError::AlreadyExists { .. } => tonic::Status::already_exists(err.to_string()),
            StigmerError::NotFound { .. } => tonic::Status::not_found(err.to_string()),
            StigmerError::FailedPrecondition { .. } => {
                tonic::Status::failed_precondition(err.to_string())
            }
            StigmerError::Unavailable { .. } => tonic::Status::unavailable(err.to_string()),
            StigmerError::Internal { .. } => tonic::Status::internal(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StigmerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_annotation_round_trips_into_message() {
        let err = StigmerError::invalid_argument("missing name").with_step("ValidateProto");
        assert!(err.to_string().contains("ValidateProto"));
        assert!(err.to_string().contains("missing name"));
    }

    #[test]
    fn kind_annotation_applies_to_every_variant() {
        let err = StigmerError::not_found("agent-1").with_kind("agent");
        assert!(err.to_string().contains("kind: agent"));
    }

    #[test]
    fn status_codes_match_intent() {
        assert_eq!(
            tonic::Status::from(StigmerError::not_found("x")).code(),
            tonic::Code::NotFound
        );
        assert_eq!(
            tonic::Status::from(StigmerError::unavailable("x")).code(),
            tonic::Code::Unavailable
        );
        assert_eq!(
            tonic::Status::from(StigmerError::already_exists("x")).code(),
            tonic::Code::AlreadyExists
        );
    }
}
