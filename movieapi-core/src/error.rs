//! API error types and formatting

use thiserror::Error;

/// Error codes a handler can report to its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A required path, query or body field is missing or malformed
    ValidationError,
    /// A point lookup found nothing
    NotFound,
    /// A conditional create found an existing record
    Conflict,
    /// Anything the caller cannot act on
    InternalError,
    /// Route is wired but has no implementation yet
    NotImplemented,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::InternalError => "InternalError",
            Self::NotImplemented => "NotImplemented",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::InternalError => 500,
            Self::NotImplemented => 501,
        }
    }
}

/// Handler-level error, rendered to the caller as `{"message": ...}`
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .code.as_str(), .message)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Generic failure; never carries internal detail
    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError, "internal error")
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotImplemented, message)
    }

    pub fn status(&self) -> u16 {
        self.code.http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation("movieId required").status(), 400);
        assert_eq!(ApiError::not_found().status(), 404);
        assert_eq!(ApiError::conflict("exists").status(), 409);
        assert_eq!(ApiError::internal().status(), 500);
        assert_eq!(ApiError::not_implemented("later").status(), 501);
    }
}
