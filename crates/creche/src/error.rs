//! Error types for creche.
//!
//! Registration callers care about one distinction above all others: a
//! duplicate child ([`Error::AlreadyExists`]) is final and user-facing, while a
//! storage failure ([`Error::StorageUnavailable`]) may be retried.

use thiserror::Error;

use crate::store::StoreError;

/// The main error type for creche operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Registration Errors ===
    /// A child with the same parent, normalized name and birth date exists.
    #[error("a child named '{name}' born {date_of_birth} is already registered for parent {parent_id}")]
    AlreadyExists {
        /// The derived key that was already taken.
        key: String,
        /// Parent the registration was attempted for.
        parent_id: String,
        /// Name as supplied by the caller.
        name: String,
        /// Date of birth as supplied by the caller.
        date_of_birth: String,
    },

    /// The backing store could not complete the operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// Caller input failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// A referenced record does not exist.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// Kind of record that was looked up.
        kind: &'static str,
        /// Key that was looked up.
        key: String,
    },

    /// The acting user may not perform the operation.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Why the operation was refused.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },
}

/// A specialized Result type for creche operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a validation error for `field`.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Create a permission error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Check if this error reports a duplicate child.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Check if retrying the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn duplicate() -> Error {
        Error::AlreadyExists {
            key: "P1__jean-luc__2020-05-15".to_string(),
            parent_id: "P1".to_string(),
            name: "Jean-Luc".to_string(),
            date_of_birth: "2020-05-15".to_string(),
        }
    }

    #[test]
    fn test_already_exists_message_names_the_duplicate() {
        let msg = duplicate().to_string();
        assert!(msg.contains("Jean-Luc"));
        assert!(msg.contains("2020-05-15"));
        assert!(msg.contains("P1"));
    }

    #[test]
    fn test_already_exists_is_not_retryable() {
        let err = duplicate();
        assert!(err.is_already_exists());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_error_is_retryable_and_keeps_cause() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = StoreError::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        }
        .into();

        assert!(err.is_retryable());
        assert!(!err.is_already_exists());
        let msg = err.to_string();
        assert!(msg.starts_with("storage unavailable"));
        assert!(msg.contains("/root/forbidden"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_error_display() {
        let err = Error::validation("dateOfBirth", "expected YYYY-MM-DD");
        assert_eq!(err.to_string(), "invalid dateOfBirth: expected YYYY-MM-DD");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_error_display() {
        let err = Error::not_found("child", "P1__ana__2020-01-01");
        assert_eq!(err.to_string(), "child not found: P1__ana__2020-01-01");
    }

    #[test]
    fn test_permission_denied_display() {
        let err = Error::permission_denied("staff cannot edit profiles");
        assert!(err.to_string().contains("staff cannot edit profiles"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "busy_timeout_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("busy_timeout_ms"));
    }
}
