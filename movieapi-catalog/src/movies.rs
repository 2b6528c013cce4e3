//! Movie lookup and creation

use chrono::{SecondsFormat, Utc};
use movieapi_auth::RequestContext;
use movieapi_core::{ApiError, ApiResponse};
use movieapi_dynamodb::{item_to_json, AttributeValue, DynamoDBError, ItemStore};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::entity::movie_key;
use crate::present;

/// GET /movies/{movieId}
pub async fn get_movie(
    store: &dyn ItemStore,
    ctx: &RequestContext,
    movie_id: Option<&str>,
) -> ApiResponse {
    let Some(movie_id) = present(movie_id) else {
        return ApiError::validation("movieId required").into();
    };

    ctx.log_access();
    info!(username = ctx.username(), path = %ctx.path, movie_id, "GET /movies/{{id}}");

    match store.get_item(&movie_key(movie_id)).await {
        Ok(Some(item)) => ApiResponse::ok(item_to_json(&item)),
        Ok(None) => ApiError::not_found().into(),
        Err(e) => {
            error!(error = %e, "get-movie error");
            ApiError::internal().into()
        }
    }
}

/// Validated create-movie body
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovie {
    /// Logical id as sent; echoed back in the response
    pub movie_id: Value,
    pub title: String,
    pub release_date: Option<Value>,
    pub overview: Option<Value>,
}

impl NewMovie {
    /// Parse a request body. An empty body is an empty object.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
            json!({})
        } else {
            serde_json::from_slice(body)
                .map_err(|e| ApiError::validation(format!("invalid JSON body: {}", e)))?
        };

        let required = || ApiError::validation("movieId and title required");

        let movie_id = match value.get("movieId") {
            Some(Value::String(s)) if !s.is_empty() => Value::String(s.clone()),
            Some(Value::Number(n)) => Value::Number(n.clone()),
            _ => return Err(required()),
        };
        let title = match value.get("title") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(required()),
        };

        let optional = |name: &str| value.get(name).filter(|v| !v.is_null()).cloned();

        Ok(Self {
            movie_id,
            title,
            release_date: optional("releaseDate"),
            overview: optional("overview"),
        })
    }

    /// Logical id as used in keys
    pub fn id(&self) -> String {
        match &self.movie_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn into_item(self, store: &dyn ItemStore, created_at: String) -> movieapi_dynamodb::Item {
        let mut item = movie_key(&self.id()).to_item(store.hash_key(), store.range_key());
        item.insert("title".to_string(), AttributeValue::string(self.title));
        if let Some(av) = self.release_date.as_ref().and_then(AttributeValue::from_plain) {
            item.insert("releaseDate".to_string(), av);
        }
        if let Some(av) = self.overview.as_ref().and_then(AttributeValue::from_plain) {
            item.insert("overview".to_string(), av);
        }
        item.insert("createdAt".to_string(), AttributeValue::string(created_at));
        item
    }
}

/// POST /movies
///
/// Conditional insert: an existing movie with the same id is never
/// overwritten and answers 409.
pub async fn create_movie(store: &dyn ItemStore, ctx: &RequestContext, body: &[u8]) -> ApiResponse {
    let movie = match NewMovie::from_body(body) {
        Ok(movie) => movie,
        Err(e) => return e.into(),
    };
    let movie_id = movie.id();

    info!(
        admin_key_hash = %ctx.identity.admin_key_hash(),
        path = %ctx.path,
        movie_id = %movie_id,
        "POST /movies"
    );

    let echo = movie.movie_id.clone();
    let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let item = movie.into_item(store, created_at);

    match store.put_item_if_absent(item).await {
        Ok(()) => ApiResponse::created(json!({ "message": "movie created", "id": echo })),
        Err(e @ DynamoDBError::ConditionalCheckFailed) => {
            error!(error = %e, movie_id = %movie_id, "post-movie error");
            ApiError::conflict(e.to_string()).into()
        }
        Err(e) => {
            error!(error = %e, movie_id = %movie_id, "post-movie error");
            ApiError::internal().into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_movie_from_body() {
        let movie = NewMovie::from_body(
            br#"{"movieId":"1","title":"Dune","releaseDate":"2021","overview":null}"#,
        )
        .unwrap();
        assert_eq!(movie.id(), "1");
        assert_eq!(movie.title, "Dune");
        assert_eq!(movie.release_date, Some(json!("2021")));
        assert!(movie.overview.is_none());
    }

    #[test]
    fn test_numeric_movie_id() {
        let movie = NewMovie::from_body(br#"{"movieId":42,"title":"Heat"}"#).unwrap();
        assert_eq!(movie.id(), "42");
        assert_eq!(movie.movie_id, json!(42));
    }

    #[test]
    fn test_missing_fields_rejected() {
        for body in [
            &br#"{"title":"Dune"}"#[..],
            br#"{"movieId":"1"}"#,
            br#"{"movieId":"","title":"Dune"}"#,
            br#"{"movieId":"1","title":""}"#,
            br#"{"movieId":true,"title":"Dune"}"#,
            b"",
        ] {
            let err = NewMovie::from_body(body).unwrap_err();
            assert_eq!(err.message, "movieId and title required");
        }
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = NewMovie::from_body(b"{not json").unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.message.starts_with("invalid JSON body"));
    }
}
