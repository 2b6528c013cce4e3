//! Transport-neutral handler responses

use serde_json::Value;

use crate::error::ApiError;

/// Status code plus JSON body, as produced by every handler
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn created(body: Value) -> Self {
        Self::new(201, body)
    }
}

impl From<ApiError> for ApiResponse {
    fn from(error: ApiError) -> Self {
        Self::new(
            error.status(),
            serde_json::json!({ "message": error.message }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_conversion() {
        let response = ApiResponse::from(ApiError::not_found());
        assert_eq!(response.status, 404);
        assert_eq!(response.body, json!({ "message": "not found" }));
    }
}
