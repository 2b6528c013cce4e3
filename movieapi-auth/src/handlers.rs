//! Auth routes
//!
//! Registration, login and logout belong to the external identity provider.
//! The routes exist so clients get a stable answer instead of a 404.

use movieapi_core::{ApiError, ApiResponse};
use tracing::debug;

use crate::identity::RequestContext;

/// Auth operations exposed under `/auth`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Register,
    Login,
    Logout,
}

impl AuthAction {
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "register" => Some(Self::Register),
            "login" => Some(Self::Login),
            "logout" => Some(Self::Logout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

pub fn handle_auth(action: AuthAction, ctx: &RequestContext) -> ApiResponse {
    debug!(action = action.as_str(), user = ctx.username(), "auth placeholder");
    ApiError::not_implemented(format!("{} not implemented yet", action.as_str())).into()
}
