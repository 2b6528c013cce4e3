//! Caller identity for the movie API
//!
//! Identity is supplied by the fronting gateway: a bearer token whose claims
//! name the user, and an API key on privileged calls. Neither is validated
//! here; both are read as opaque strings for logging.

pub mod handlers;
pub mod identity;

pub use identity::{hash_admin_key, CallerIdentity, RequestContext, ANONYMOUS, NO_API_KEY};
