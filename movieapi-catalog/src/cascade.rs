//! Cascade delete of a movie and its dependents
//!
//! Not transactional. The movie record goes first; cast and award records
//! found under `c<movieId>` / `w<movieId>` are then removed in batches of
//! at most [`MAX_BATCH_WRITE_ITEMS`], one batch in flight at a time. A batch
//! failure stops the cascade and is reported as [`CascadeOutcome::Partial`];
//! earlier batches stay deleted.

use movieapi_auth::RequestContext;
use movieapi_core::{ApiError, ApiResponse};
use movieapi_dynamodb::{DynamoDBError, ItemKey, ItemStore, MAX_BATCH_WRITE_ITEMS};
use serde_json::json;
use tracing::{debug, error, info};

use crate::entity::{award_partition, cast_partition, movie_key};
use crate::present;

/// Result of a cascade that got past the movie delete
#[derive(Debug)]
pub enum CascadeOutcome {
    /// Every dependent was deleted
    Complete { cascaded: usize },
    /// A batch failed; `deleted` dependents are gone, `remaining` were not
    /// attempted or sat in the failed batch
    Partial {
        deleted: usize,
        remaining: usize,
        error: DynamoDBError,
    },
}

/// Delete a movie, then its cast and awards.
///
/// Errors before any dependent is touched (the movie delete, either
/// discovery query, or a dependent whose key cannot be addressed) are
/// returned as `Err`.
pub async fn cascade_delete(
    store: &dyn ItemStore,
    movie_id: &str,
) -> Result<CascadeOutcome, DynamoDBError> {
    store.delete_item(&movie_key(movie_id)).await?;

    let cast_key = cast_partition(movie_id);
    let award_key = award_partition(movie_id);
    let (cast, awards) = tokio::try_join!(
        store.query_partition(&cast_key),
        store.query_partition(&award_key)
    )?;

    let worklist = cast
        .iter()
        .chain(awards.iter())
        .map(|item| {
            ItemKey::from_item(item, store.hash_key(), store.range_key()).ok_or_else(|| {
                DynamoDBError::Internal(format!(
                    "dependent of movie {} has a non-string key",
                    movie_id
                ))
            })
        })
        .collect::<Result<Vec<ItemKey>, _>>()?;

    let total = worklist.len();
    let mut deleted = 0;

    for (i, batch) in worklist.chunks(MAX_BATCH_WRITE_ITEMS).enumerate() {
        debug!(movie_id, batch = i, size = batch.len(), "Deleting dependents");
        if let Err(error) = store.batch_delete(batch).await {
            return Ok(CascadeOutcome::Partial {
                deleted,
                remaining: total - deleted,
                error,
            });
        }
        deleted += batch.len();
    }

    Ok(CascadeOutcome::Complete { cascaded: total })
}

/// DELETE /movies/{movieId}
pub async fn delete_movie(
    store: &dyn ItemStore,
    ctx: &RequestContext,
    movie_id: Option<&str>,
) -> ApiResponse {
    let Some(movie_id) = present(movie_id) else {
        return ApiError::validation("movieId required").into();
    };

    info!(
        admin_key_hash = %ctx.identity.admin_key_hash(),
        path = %ctx.path,
        movie_id,
        "DELETE /movies/{{id}}"
    );

    match cascade_delete(store, movie_id).await {
        Ok(CascadeOutcome::Complete { cascaded }) => {
            ApiResponse::ok(json!({ "message": "movie deleted", "cascaded": cascaded }))
        }
        Ok(CascadeOutcome::Partial {
            deleted,
            remaining,
            error,
        }) => {
            error!(
                error = %error,
                movie_id,
                deleted,
                remaining,
                "delete-movie partial cascade"
            );
            ApiError::internal().into()
        }
        Err(e) => {
            error!(error = %e, movie_id, "delete-movie error");
            ApiError::internal().into()
        }
    }
}
