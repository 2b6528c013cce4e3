//! Core types for the movie API
//!
//! This crate provides the error taxonomy and the transport-neutral response
//! shape shared by every handler crate.

pub mod error;
pub mod response;

pub use error::{ApiError, ErrorCode};
pub use response::ApiResponse;
