//! REST API Handlers
//!
//! Marshals HTTP requests into topology executor calls and maps registry
//! errors onto status codes.

use crate::domain::ports::{ParentsResponse, TopologyExecutor, VolumeSummary};
use crate::error::Error;
use crate::metrics;
use crate::tracker::{PeerAttributes, PeerDetail};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Default cap on in-flight requests
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 1024;

/// Default cap on request body size
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query string of the parents lookup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParentsQuery {
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

/// Body of a metadata confirmation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddPeerRequest {
    #[serde(default)]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub iqn: Option<String>,
    #[serde(default)]
    pub lun: Option<u32>,
}

impl AddPeerRequest {
    fn into_parts(self) -> (Option<String>, PeerAttributes) {
        let attrs = PeerAttributes {
            host: self.host,
            port: self.port,
            iqn: self.iqn,
            lun: self.lun,
            status: None,
        };
        (self.peer_id, attrs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeListResponse {
    pub volumes: Vec<VolumeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeDetailResponse {
    pub peers: Vec<PeerDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostStatusResponse {
    pub volumes: Vec<ParentsResponse>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    executor: Arc<dyn TopologyExecutor>,
    max_concurrent_requests: usize,
    max_body_size: usize,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(executor: Arc<dyn TopologyExecutor>) -> Self {
        Self {
            executor,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Override the request limits
    pub fn with_limits(mut self, max_concurrent_requests: usize, max_body_size: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests.max(1);
        self.max_body_size = max_body_size;
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            executor: self.executor,
        };

        Router::new()
            // Volume endpoints
            .route("/v1/volumes", get(list_volumes))
            .route("/v1/volumes/:volume_id", get(volume_detail))
            .route("/v1/volumes/:volume_id/parents", get(get_parents))
            .route("/v1/volumes/:volume_id/peers", post(add_metadata))
            .route("/v1/volumes/:volume_id/peers/:peer_id", delete(delete_metadata))
            // Host endpoints
            .route("/v1/hosts/:host/status", get(host_status))
            // Operational endpoints
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_page))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(self.max_body_size))
            .layer(GlobalConcurrencyLimitLayer::new(self.max_concurrent_requests))
            .layer(TraceLayer::new_for_http())
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    executor: Arc<dyn TopologyExecutor>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List tracked volumes
async fn list_volumes(State(state): State<AppState>) -> impl IntoResponse {
    let volumes = state.executor.list_volumes();
    (StatusCode::OK, Json(VolumeListResponse { volumes }))
}

/// Peers of one volume
async fn volume_detail(
    State(state): State<AppState>,
    Path(volume_id): Path<String>,
) -> impl IntoResponse {
    let peers = state.executor.volume_detail(&volume_id);
    (StatusCode::OK, Json(VolumeDetailResponse { peers }))
}

/// Resolve where a peer should attach
async fn get_parents(
    State(state): State<AppState>,
    Path(volume_id): Path<String>,
    Query(query): Query<ParentsQuery>,
) -> Response {
    debug!(%volume_id, peer_id = ?query.peer_id, host = ?query.host, "Parents lookup");

    match state
        .executor
        .get_parents(&volume_id, query.peer_id.as_deref(), query.host.as_deref())
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Confirm a peer's metadata
async fn add_metadata(
    State(state): State<AppState>,
    Path(volume_id): Path<String>,
    Json(request): Json<AddPeerRequest>,
) -> Response {
    let (peer_id, attrs) = request.into_parts();

    match state
        .executor
        .add_metadata(&volume_id, peer_id.as_deref(), attrs)
    {
        Ok(identity) => {
            info!(%volume_id, peer_id = %identity.peer_id, "Peer confirmed");
            (StatusCode::CREATED, Json(identity)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Remove a peer
async fn delete_metadata(
    State(state): State<AppState>,
    Path((volume_id, peer_id)): Path<(String, String)>,
) -> Response {
    match state.executor.delete_metadata(&volume_id, &peer_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// Parents of every peer on a host
async fn host_status(State(state): State<AppState>, Path(host): Path<String>) -> impl IntoResponse {
    let volumes = state.executor.status_for_host(&host);
    (StatusCode::OK, Json(HostStatusResponse { volumes }))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Prometheus scrape endpoint
async fn metrics_page(State(state): State<AppState>) -> Response {
    match metrics::render(&state.executor.stats()) {
        Ok(page) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, metrics::content_type())],
            page,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// HTTP status for a registry error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::DuplicateItem { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        debug!("Request rejected: {}", err);
    }

    (
        status,
        Json(ApiErrorResponse {
            error: err.code().into(),
            message: err.to_string(),
        }),
    )
        .into_response()
}
