//! Movie catalog handlers
//!
//! Movies, cast members and awards share one table. The [`entity`] codec
//! maps domain ids onto `(id, sk)` keys; the handler modules translate
//! requests into store calls through an [`movieapi_dynamodb::ItemStore`]
//! passed in by the caller and answer with an [`movieapi_core::ApiResponse`].

pub mod awards;
pub mod cascade;
pub mod cast;
pub mod entity;
pub mod movies;


pub use awards::{get_awards, AwardsQuery};
pub use cascade::{cascade_delete, delete_movie, CascadeOutcome};
pub use cast::{get_cast, get_cast_member};
pub use entity::{Entity, EntityKind, UnknownEntity};
pub use movies::{create_movie, get_movie};

/// Treat empty strings as absent
pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
