//! Award queries
//!
//! Awards live under `w<entityId>` where the entity is a movie or an actor.
//! The query string picks one of these shapes:
//!
//! - `movie` or `actor` alone: every award of that entity
//! - either one plus `awardBody`: that single award, as a 0/1-element array
//! - `movie` and `actor`: both lookups, returned as `{movieAwards, actorAwards}`

use movieapi_auth::RequestContext;
use movieapi_core::{ApiError, ApiResponse};
use movieapi_dynamodb::{items_to_json, DynamoDBError, Item, ItemStore};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::entity::{award_key, award_partition};
use crate::present;

const MISSING_ENTITY: &str = "Provide movie or actor (and optional awardBody)";

/// Query string of GET /awards
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardsQuery {
    pub movie: Option<String>,
    pub actor: Option<String>,
    pub award_body: Option<String>,
}

/// Resolved lookup plan
#[derive(Debug, Clone, PartialEq, Eq)]
enum AwardsLookup<'a> {
    Single {
        entity: &'a str,
        body: Option<&'a str>,
    },
    Pair {
        movie: &'a str,
        actor: &'a str,
        body: Option<&'a str>,
    },
}

impl AwardsQuery {
    fn lookup(&self) -> Option<AwardsLookup<'_>> {
        let movie = present(self.movie.as_deref());
        let actor = present(self.actor.as_deref());
        let body = present(self.award_body.as_deref());

        match (movie, actor) {
            (Some(movie), Some(actor)) => Some(AwardsLookup::Pair { movie, actor, body }),
            (Some(entity), None) | (None, Some(entity)) => {
                Some(AwardsLookup::Single { entity, body })
            }
            (None, None) => None,
        }
    }
}

/// All awards of an entity, or just the one from `body`
async fn awards_for(
    store: &dyn ItemStore,
    entity: &str,
    body: Option<&str>,
) -> Result<Vec<Item>, DynamoDBError> {
    match body {
        Some(body) => Ok(store
            .get_item(&award_key(entity, body))
            .await?
            .into_iter()
            .collect()),
        None => store.query_partition(&award_partition(entity)).await,
    }
}

/// GET /awards
pub async fn get_awards(
    store: &dyn ItemStore,
    ctx: &RequestContext,
    query: &AwardsQuery,
) -> ApiResponse {
    info!(
        username = ctx.username(),
        path = %ctx.path,
        movie = ?query.movie,
        actor = ?query.actor,
        award_body = ?query.award_body,
        "GET /awards"
    );

    let Some(lookup) = query.lookup() else {
        return ApiError::validation(MISSING_ENTITY).into();
    };

    let result = match lookup {
        AwardsLookup::Single { entity, body } => awards_for(store, entity, body)
            .await
            .map(|items| items_to_json(&items)),
        AwardsLookup::Pair { movie, actor, body } => tokio::try_join!(
            awards_for(store, movie, body),
            awards_for(store, actor, body)
        )
        .map(|(movie_awards, actor_awards)| {
            json!({
                "movieAwards": items_to_json(&movie_awards),
                "actorAwards": items_to_json(&actor_awards),
            })
        }),
    };

    match result {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => {
            error!(error = %e, "get-awards error");
            ApiError::internal().into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(movie: Option<&str>, actor: Option<&str>, body: Option<&str>) -> AwardsQuery {
        AwardsQuery {
            movie: movie.map(str::to_string),
            actor: actor.map(str::to_string),
            award_body: body.map(str::to_string),
        }
    }

    #[test]
    fn test_lookup_cases() {
        assert_eq!(
            query(Some("5"), None, None).lookup(),
            Some(AwardsLookup::Single { entity: "5", body: None })
        );
        assert_eq!(
            query(None, Some("9"), Some("OSCAR")).lookup(),
            Some(AwardsLookup::Single { entity: "9", body: Some("OSCAR") })
        );
        assert_eq!(
            query(Some("5"), Some("9"), Some("OSCAR")).lookup(),
            Some(AwardsLookup::Pair { movie: "5", actor: "9", body: Some("OSCAR") })
        );
    }

    #[test]
    fn test_lookup_needs_an_entity() {
        assert!(query(None, None, None).lookup().is_none());
        assert!(query(None, None, Some("OSCAR")).lookup().is_none());
        assert!(query(Some(""), Some(""), None).lookup().is_none());
    }

    #[test]
    fn test_query_string_names() {
        let q: AwardsQuery =
            serde_json::from_value(json!({ "movie": "5", "awardBody": "OSCAR" })).unwrap();
        assert_eq!(q.movie.as_deref(), Some("5"));
        assert_eq!(q.award_body.as_deref(), Some("OSCAR"));
        assert!(q.actor.is_none());
    }
}
