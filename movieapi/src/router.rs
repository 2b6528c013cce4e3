//! HTTP router for the movie API

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use movieapi_auth::{
    handlers::{handle_auth, AuthAction},
    CallerIdentity, RequestContext,
};
use movieapi_catalog::{
    create_movie, delete_movie, get_awards, get_cast, get_cast_member, get_movie, AwardsQuery,
};
use movieapi_core::{ApiError, ApiResponse};
use movieapi_dynamodb::{
    handle_request,
    storage::{AttributeDefinition, AttributeType, KeySchemaElement},
    DynamoDBClient, DynamoDBState, DynamoDBStorage, ItemStore, LocalTable, StreamRecord,
};
use movieapi_streams::{handle_event, StreamEvent};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Service state for the main router
pub struct AppState {
    table_name: String,
    store: Arc<dyn ItemStore>,
    /// Set when the table lives in this process
    dynamodb: Option<Arc<DynamoDBState>>,
}

impl AppState {
    /// Provision the table in memory. Returns the state and the table's
    /// change feed.
    pub fn local(
        table_name: &str,
    ) -> anyhow::Result<(Self, Option<UnboundedReceiver<StreamRecord>>)> {
        let storage = Arc::new(DynamoDBStorage::new());
        storage.create_table(
            table_name,
            vec![KeySchemaElement::hash("id"), KeySchemaElement::range("sk")],
            vec![
                AttributeDefinition {
                    attribute_name: "id".to_string(),
                    attribute_type: AttributeType::S,
                },
                AttributeDefinition {
                    attribute_name: "sk".to_string(),
                    attribute_type: AttributeType::S,
                },
            ],
            true,
        )?;
        let feed = storage.take_stream(table_name)?;
        let table = LocalTable::new(storage.clone(), table_name)?;

        info!(table = table_name, "Provisioned in-process table");
        let state = Self {
            table_name: table_name.to_string(),
            store: Arc::new(table),
            dynamodb: Some(Arc::new(DynamoDBState { storage })),
        };
        Ok((state, feed))
    }

    /// Use a table on a remote DynamoDB endpoint
    pub fn remote(endpoint: &str, table_name: &str) -> Self {
        info!(endpoint, table = table_name, "Using remote table");
        Self {
            table_name: table_name.to_string(),
            store: Arc::new(DynamoDBClient::new(endpoint, table_name)),
            dynamodb: None,
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(health_check))
        // DynamoDB JSON protocol for the in-process table
        .route("/", post(handle_dynamodb))
        .route("/movies", post(handle_create_movie))
        .route(
            "/movies/:movie_id",
            get(handle_get_movie).delete(handle_delete_movie),
        )
        .route("/movies/:movie_id/actors", get(handle_get_cast))
        .route(
            "/movies/:movie_id/actors/:actor_id",
            get(handle_get_cast_member),
        )
        .route("/awards", get(handle_get_awards))
        .route("/auth/:action", post(handle_auth_route))
        .route("/streams/state-change", post(handle_state_change))
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

fn request_context(headers: &HeaderMap, uri: &Uri) -> RequestContext {
    RequestContext::new(
        CallerIdentity::from_headers(headers),
        uri.path(),
        uri.query().map(str::to_string),
    )
}

fn into_response(response: ApiResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "table": state.table_name,
        "store": if state.dynamodb.is_some() { "in-process" } else { "remote" },
    }))
}

async fn handle_dynamodb(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match &state.dynamodb {
        Some(dynamodb) => handle_request(State(dynamodb.clone()), headers, body).await,
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Table is served by a remote endpoint",
        )
            .into_response(),
    }
}

async fn handle_get_movie(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ctx = request_context(&headers, &uri);
    into_response(get_movie(state.store.as_ref(), &ctx, Some(&movie_id)).await)
}

async fn handle_delete_movie(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ctx = request_context(&headers, &uri);
    into_response(delete_movie(state.store.as_ref(), &ctx, Some(&movie_id)).await)
}

async fn handle_create_movie(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let ctx = request_context(&headers, &uri);
    into_response(create_movie(state.store.as_ref(), &ctx, &body).await)
}

async fn handle_get_cast(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ctx = request_context(&headers, &uri);
    into_response(get_cast(state.store.as_ref(), &ctx, Some(&movie_id)).await)
}

async fn handle_get_cast_member(
    State(state): State<Arc<AppState>>,
    Path((movie_id, actor_id)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ctx = request_context(&headers, &uri);
    into_response(
        get_cast_member(state.store.as_ref(), &ctx, Some(&movie_id), Some(&actor_id)).await,
    )
}

async fn handle_get_awards(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AwardsQuery>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ctx = request_context(&headers, &uri);
    into_response(get_awards(state.store.as_ref(), &ctx, &query).await)
}

async fn handle_auth_route(Path(action): Path<String>, headers: HeaderMap, uri: Uri) -> Response {
    let ctx = request_context(&headers, &uri);
    match AuthAction::from_path_segment(&action) {
        Some(action) => into_response(handle_auth(action, &ctx)),
        None => into_response(ApiError::not_found().into()),
    }
}

/// Project a pushed `{"Records": [...]}` batch
async fn handle_state_change(body: Bytes) -> Response {
    let event: StreamEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Rejected state-change event");
            return into_response(ApiError::validation(format!("invalid stream event: {}", e)).into());
        }
    };

    let report = handle_event(&event);
    into_response(ApiResponse::ok(json!({
        "processed": event.records.len(),
        "logged": report.lines.len(),
        "failures": report.failures,
    })))
}
