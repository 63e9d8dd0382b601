//! Error types for RealText operations.

use thiserror::Error;

/// Result type alias for RealText operations.
pub type Result<T> = std::result::Result<T, RealtextError>;

/// Main error type for RealText operations.
///
/// Every variant is locally recoverable by the caller; the web layer maps
/// them to redirects or status codes and none of them should ever abort
/// the process.
#[derive(Error, Debug)]
pub enum RealtextError {
    /// The caller is anonymous but the operation requires a logged-in user.
    #[error("Authentication required")]
    Unauthenticated,

    /// The caller is authenticated but not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Message or topic content failed validation.
    #[error("Invalid content: {0}")]
    ContentInvalid(String),

    /// The requested username is already taken.
    #[error("Username already taken: {0}")]
    DuplicateUsername(String),

    /// Credential (username/password) validation errors.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Password hashing or verification errors.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Persistent store errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RealtextError {
    /// Creates a new forbidden error.
    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new content-invalid error.
    pub fn content_invalid<T: ToString>(msg: T) -> Self {
        Self::ContentInvalid(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new credential error.
    pub fn credential<T: ToString>(msg: T) -> Self {
        Self::Credential(msg.to_string())
    }

    /// Creates a new storage error.
    pub fn storage<T: ToString>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }
}
