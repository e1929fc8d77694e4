//! Crate-wide error taxonomy.
//!
//! Module errors keep their own detail; at the crate boundary they collapse
//! into the handful of categories callers branch on.

use thiserror::Error;

use crate::bus::{BusError, HandlerError};
use crate::config::ConfigError;
use crate::dispatch::{CallbackError, DispatchError};
use crate::generator::GeneratorError;
use crate::ledger::StoreError;
use crate::model::ValidationError;
use crate::runner::{DeliveryError, ReportError, SubmitError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient delivery failure: {0}")]
    TransientDelivery(String),

    #[error("delivery failed: {0}")]
    PermanentDelivery(String),

    #[error("job submission failed: {0}")]
    Submission(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_FAILED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::TransientDelivery(_) => "TRANSIENT_DELIVERY",
            Error::PermanentDelivery(_) => "PERMANENT_DELIVERY",
            Error::Submission(_) => "SUBMISSION_FAILED",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientDelivery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Error::NotFound(err.to_string()),
            StoreError::Conflict(msg) => Error::Conflict(msg),
            StoreError::Validation(e) => e.into(),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<GeneratorError> for Error {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::ProjectNotFound(_) | GeneratorError::DigestNotFound { .. } => {
                Error::NotFound(err.to_string())
            }
            GeneratorError::EmptyCandidates => Error::Validation(err.to_string()),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<DispatchError> for Error {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Generator(e) => e.into(),
            DispatchError::Validation(e) => e.into(),
            DispatchError::Store(e) => e.into(),
            DispatchError::Serialization(e) => Error::Internal(e.to_string()),
            submission @ DispatchError::Submission { .. } => {
                Error::Submission(submission.to_string())
            }
        }
    }
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::InvalidParameters(msg) => Error::Validation(msg),
            DeliveryError::Client(e) => Error::Internal(e.to_string()),
            transient if transient.is_transient() => Error::TransientDelivery(transient.to_string()),
            permanent => Error::PermanentDelivery(permanent.to_string()),
        }
    }
}

impl From<SubmitError> for Error {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::UnknownJob(_) => Error::Validation(err.to_string()),
            other => Error::Submission(other.to_string()),
        }
    }
}

impl From<CallbackError> for Error {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::Validation(e) => e.into(),
            CallbackError::Store(e) => e.into(),
        }
    }
}

impl From<ReportError> for Error {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Callback(e) => e.into(),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<BusError> for Error {
    fn from(err: BusError) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<HandlerError> for Error {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Dispatch(e) => e.into(),
            HandlerError::Store(e) => e.into(),
            HandlerError::Bus(e) => e.into(),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::SubmissionFailure;

    #[test]
    fn test_store_errors_keep_their_category() {
        let err: Error = StoreError::not_found("policy", 7).into();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.code(), "NOT_FOUND");

        let err: Error = StoreError::Conflict("duplicate name".into()).into();
        assert!(matches!(err, Error::Conflict(ref msg) if msg == "duplicate name"));

        let err: Error = StoreError::Validation(ValidationError::NoTargets).into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = StoreError::LockPoisoned.into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_delivery_errors_split_by_retryability() {
        let err: Error = DeliveryError::ServerError {
            address: "http://hook.local".into(),
            status: 502,
        }
        .into();
        assert!(err.is_retryable());

        let err: Error = DeliveryError::Rejected {
            address: "http://hook.local".into(),
            status: 503,
        }
        .into();
        assert!(matches!(err, Error::PermanentDelivery(_)));
        assert!(!err.is_retryable());

        let err: Error = DeliveryError::InvalidParameters("missing address".into()).into();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_dispatch_errors_unwrap_to_root_cause() {
        let err: Error = DispatchError::Generator(GeneratorError::DigestNotFound {
            repository: "library/nginx".into(),
            tag: "1.25".into(),
        })
        .into();
        assert!(matches!(err, Error::NotFound(_)));

        let err: Error = DispatchError::Submission {
            attempted: 2,
            failures: vec![SubmissionFailure {
                record_id: 1,
                address: "http://a.local".into(),
                error: "refused".into(),
            }],
        }
        .into();
        assert_eq!(err.code(), "SUBMISSION_FAILED");
        assert!(err.to_string().contains("1 of 2"));
    }

    #[test]
    fn test_submit_errors() {
        let err: Error = SubmitError::UnknownJob("NOPE".into()).into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = SubmitError::Rejected {
            status: 401,
            body: "denied".into(),
        }
        .into();
        assert!(matches!(err, Error::Submission(_)));
    }
}
