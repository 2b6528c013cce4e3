//! Cast lookups

use movieapi_auth::RequestContext;
use movieapi_core::{ApiError, ApiResponse};
use movieapi_dynamodb::{item_to_json, items_to_json, ItemStore};
use tracing::{error, info};

use crate::entity::{cast_member_key, cast_partition};
use crate::present;

/// GET /movies/{movieId}/actors
///
/// The whole cast partition in sort-key order; an empty cast is `[]`.
pub async fn get_cast(
    store: &dyn ItemStore,
    ctx: &RequestContext,
    movie_id: Option<&str>,
) -> ApiResponse {
    let Some(movie_id) = present(movie_id) else {
        return ApiError::validation("movieId required").into();
    };

    ctx.log_access();
    info!(username = ctx.username(), path = %ctx.path, movie_id, "GET /movies/{{id}}/actors");

    match store.query_partition(&cast_partition(movie_id)).await {
        Ok(items) => ApiResponse::ok(items_to_json(&items)),
        Err(e) => {
            error!(error = %e, "get-cast error");
            ApiError::internal().into()
        }
    }
}

/// GET /movies/{movieId}/actors/{actorId}
pub async fn get_cast_member(
    store: &dyn ItemStore,
    ctx: &RequestContext,
    movie_id: Option<&str>,
    actor_id: Option<&str>,
) -> ApiResponse {
    let (Some(movie_id), Some(actor_id)) = (present(movie_id), present(actor_id)) else {
        return ApiError::validation("movieId and actorId required").into();
    };

    ctx.log_access();
    info!(
        username = ctx.username(),
        path = %ctx.path,
        movie_id,
        actor_id,
        "GET /movies/{{id}}/actors/{{actorId}}"
    );

    match store.get_item(&cast_member_key(movie_id, actor_id)).await {
        Ok(Some(item)) => ApiResponse::ok(item_to_json(&item)),
        Ok(None) => ApiError::not_found().into(),
        Err(e) => {
            error!(error = %e, "get-cast-member error");
            ApiError::internal().into()
        }
    }
}
