//! Caller identity extraction

use axum::http::{header, HeaderMap};
use base64::Engine;
use tracing::info;

/// Username reported when the request carries no usable token
pub const ANONYMOUS: &str = "anonymous";

/// Stand-in hashed when a privileged call carries no API key
pub const NO_API_KEY: &str = "no-api-key";

/// Header carrying the admin API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Who is calling, as far as the gateway told us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub username: String,
    pub api_key: Option<String>,
}

impl Default for CallerIdentity {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self {
            username: ANONYMOUS.to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read identity from request headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let username = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(username_from_bearer)
            .unwrap_or_else(|| ANONYMOUS.to_string());

        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self { username, api_key }
    }

    /// Loggable stand-in for the admin key
    pub fn admin_key_hash(&self) -> String {
        hash_admin_key(self.api_key.as_deref().unwrap_or(NO_API_KEY))
    }
}

/// Pull `cognito:username` out of an unverified bearer token
fn username_from_bearer(authorization: &str) -> Option<String> {
    let token = authorization
        .strip_prefix("Bearer ")
        .or_else(|| authorization.strip_prefix("bearer "))
        .unwrap_or(authorization)
        .trim();

    let payload = token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;

    claims
        .get("cognito:username")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 32-bit polynomial string hash (`h = h * 31 + unit` over UTF-16 code
/// units, wrapping), rendered as signed hexadecimal.
pub fn hash_admin_key(key: &str) -> String {
    let hash = key
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));

    if hash < 0 {
        format!("-{:x}", i64::from(hash).unsigned_abs())
    } else {
        format!("{:x}", hash)
    }
}

/// Per-request context handed to every handler
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: CallerIdentity,
    pub path: String,
    pub query: Option<String>,
}

impl RequestContext {
    pub fn new(identity: CallerIdentity, path: impl Into<String>, query: Option<String>) -> Self {
        Self {
            identity,
            path: path.into(),
            query: query.filter(|q| !q.is_empty()),
        }
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn path_with_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// The plain-text access line: `<username> <path>[?<query>]`
    pub fn access_line(&self) -> String {
        format!("{} {}", self.identity.username, self.path_with_query())
    }

    /// Emit the access line under the `movieapi::access` target
    pub fn log_access(&self) {
        info!(target: "movieapi::access", "{}", self.access_line());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn token(claims: &serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.sig",
            engine.encode(r#"{"alg":"RS256"}"#),
            engine.encode(claims.to_string())
        )
    }

    #[test]
    fn test_username_from_token_claims() {
        let mut headers = HeaderMap::new();
        let bearer = format!(
            "Bearer {}",
            token(&serde_json::json!({ "cognito:username": "jacob" }))
        );
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&bearer).unwrap());
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));

        let identity = CallerIdentity::from_headers(&headers);
        assert_eq!(identity.username, "jacob");
        assert_eq!(identity.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_missing_or_garbled_token_is_anonymous() {
        let identity = CallerIdentity::from_headers(&HeaderMap::new());
        assert_eq!(identity, CallerIdentity::anonymous());

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"));
        assert_eq!(CallerIdentity::from_headers(&headers).username, ANONYMOUS);

        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", token(&serde_json::json!({ "sub": "123" })));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&bearer).unwrap());
        assert_eq!(CallerIdentity::from_headers(&headers).username, ANONYMOUS);
    }

    #[test]
    fn test_hash_admin_key() {
        assert_eq!(hash_admin_key(""), "0");
        assert_eq!(hash_admin_key("a"), "61");
        assert_eq!(hash_admin_key("ab"), "c21");
        assert_eq!(hash_admin_key("no-api-key"), "54089020");
        // wraps into the sign bit
        assert_eq!(hash_admin_key("secret-key"), "-5695763e");
    }

    #[test]
    fn test_admin_key_hash_defaults() {
        let identity = CallerIdentity::anonymous();
        assert_eq!(identity.admin_key_hash(), hash_admin_key(NO_API_KEY));

        let identity = CallerIdentity::anonymous().with_api_key("k");
        assert_eq!(identity.admin_key_hash(), hash_admin_key("k"));
    }

    #[test]
    fn test_access_line() {
        let ctx = RequestContext::new(
            CallerIdentity::anonymous(),
            "/movies/1/actors",
            Some("page=2".to_string()),
        );
        assert_eq!(ctx.access_line(), "anonymous /movies/1/actors?page=2");

        let ctx = RequestContext::new(CallerIdentity::anonymous(), "/movies/1", Some(String::new()));
        assert_eq!(ctx.access_line(), "anonymous /movies/1");
    }
}
