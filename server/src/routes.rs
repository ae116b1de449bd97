//! HTTP route handlers for the Taskboard server.
//!
//! This module provides the HTTP API consumed by the dashboard front-end:
//!
//! - `GET /api/projects` - Aggregated snapshot of all tracked projects
//! - `GET /api/projects/{id}` - Details and tasks of one project
//! - `GET /api/projects/{id}/tasks` - Task list of one project
//! - `GET /api/tasks/{id}/subtasks` - Subtasks of one task
//! - `GET /ws` - WebSocket stream of snapshots pushed by the auto-updater
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - The [`Dashboard`] facade (client, aggregator and snapshot cache)
//! - The snapshot broadcaster feeding WebSocket clients
//! - Server start time for uptime reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use taskboard_server::config::Config;
//! use taskboard_server::dashboard::Dashboard;
//! use taskboard_server::routes::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let dashboard = Dashboard::from_config(&config).expect("failed to build dashboard");
//!     let app = create_router(AppState::new(dashboard));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

use crate::asana::AsanaError;
use crate::broadcast::SnapshotBroadcaster;
use crate::dashboard::Dashboard;
use crate::error::{DashboardError, FetchError};
use crate::types::{Project, Snapshot, Subtask};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Dashboard facade with the shared snapshot cache.
    pub dashboard: Dashboard,

    /// Broadcaster for pushing snapshots to WebSocket clients.
    pub broadcaster: SnapshotBroadcaster,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates application state around a dashboard.
    #[must_use]
    pub fn new(dashboard: Dashboard) -> Self {
        Self::with_components(dashboard, SnapshotBroadcaster::new())
    }

    /// Creates application state with a custom broadcaster.
    ///
    /// The binary uses this to share one broadcaster between the router and
    /// the auto-update poller.
    #[must_use]
    pub fn with_components(dashboard: Dashboard, broadcaster: SnapshotBroadcaster) -> Self {
        Self {
            dashboard,
            broadcaster,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// Requests are traced and CORS is permissive so a browser front-end served
/// from another origin can call the API.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/projects", get(get_projects))
        .route("/api/projects/{id}", get(get_project))
        .route("/api/projects/{id}/tasks", get(get_project_tasks))
        .route("/api/tasks/{id}/subtasks", get(get_subtasks))
        .route("/ws", get(get_ws))
        .route("/health", get(get_health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Error Response Types
// ============================================================================

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Maps a single-project fetch failure to an HTTP response.
///
/// Unknown projects become 404; every other upstream failure is a 502.
fn fetch_error_response(err: &FetchError) -> Response {
    let code = match err {
        FetchError::DetailsUnavailable { .. } => "details_unavailable",
        FetchError::TasksUnavailable { .. } => "tasks_unavailable",
    };
    let status = match err.cause() {
        AsanaError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    };

    (status, Json(ErrorResponse::new(err.to_string()).with_code(code))).into_response()
}

fn dashboard_error_status(err: &DashboardError) -> StatusCode {
    match err {
        DashboardError::Aggregation(_) => StatusCode::SERVICE_UNAVAILABLE,
        DashboardError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// GET /api/projects - Aggregated Snapshot
// ============================================================================

/// Query parameters for the projects endpoint.
#[derive(Debug, Default, Deserialize)]
struct ProjectsQuery {
    /// Bypass the cache and re-aggregate.
    #[serde(default)]
    refresh: bool,
}

/// Response body for the projects endpoint.
///
/// The front-end renders one state per variant, plus its own "loading" state
/// while the request is pending.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ProjectsResponse<'a> {
    Success {
        #[serde(rename = "fetchedAt")]
        fetched_at: DateTime<Utc>,
        projects: &'a [Project],
    },
    Empty {
        #[serde(rename = "fetchedAt")]
        fetched_at: DateTime<Utc>,
        message: String,
    },
    Error {
        message: String,
    },
}

impl<'a> From<&'a Snapshot> for ProjectsResponse<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        if snapshot.is_empty() {
            Self::Empty {
                fetched_at: snapshot.fetched_at,
                message: "no project data available".to_string(),
            }
        } else {
            Self::Success {
                fetched_at: snapshot.fetched_at,
                projects: &snapshot.projects,
            }
        }
    }
}

/// GET /api/projects - Aggregated snapshot of all tracked projects.
///
/// Served from cache unless `?refresh=true` is given or the snapshot expired.
///
/// # Response
///
/// ```json
/// {
///   "status": "success",
///   "fetchedAt": "2024-03-10T10:00:00Z",
///   "projects": [{"id": "1209145611805182", "name": "Website", "metrics": {...}}]
/// }
/// ```
async fn get_projects(
    State(state): State<AppState>,
    Query(params): Query<ProjectsQuery>,
) -> Response {
    match state.dashboard.get_all_projects_data(params.refresh).await {
        Ok(snapshot) => {
            debug!(
                projects = snapshot.projects.len(),
                refresh = params.refresh,
                "Serving project snapshot"
            );
            Json(ProjectsResponse::from(&*snapshot)).into_response()
        }
        Err(err) => {
            error!(error = %err, "Failed to load project data");
            (
                dashboard_error_status(&err),
                Json(ProjectsResponse::Error {
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Single-resource routes
// ============================================================================

/// GET /api/projects/{id} - Details and tasks of one project, uncached.
async fn get_project(State(state): State<AppState>, Path(project_id): Path<String>) -> Response {
    match state.dashboard.get_project_update(&project_id).await {
        Ok(update) => Json(update).into_response(),
        Err(err) => fetch_error_response(&err),
    }
}

/// GET /api/projects/{id}/tasks - Task list of one project, uncached.
async fn get_project_tasks(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Response {
    match state.dashboard.get_project_tasks(&project_id).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(err) => fetch_error_response(&err),
    }
}

/// Response body for the subtasks endpoint.
#[derive(Debug, Serialize)]
struct SubtasksResponse<'a> {
    subtasks: &'a [Subtask],
    /// True when the upstream fetch failed and the list is empty by policy.
    degraded: bool,
}

/// GET /api/tasks/{id}/subtasks - Subtasks of one task.
///
/// Always 200: an upstream failure yields an empty, degraded list.
async fn get_subtasks(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    let fetch = state.dashboard.get_subtasks(&task_id).await;

    Json(SubtasksResponse {
        subtasks: fetch.subtasks(),
        degraded: fetch.is_degraded(),
    })
    .into_response()
}

// ============================================================================
// GET /ws - Snapshot Stream
// ============================================================================

/// GET /ws - WebSocket subscription for auto-updated snapshots.
///
/// The current cached snapshot, if still valid, is sent right after the
/// upgrade; every snapshot produced by the poller follows.
async fn get_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    info!("WebSocket client connecting");

    let initial = state.dashboard.cache().read();
    ws.on_upgrade(move |socket| handle_websocket(socket, state.broadcaster, initial))
}

/// Handles an established WebSocket connection.
async fn handle_websocket(
    socket: axum::extract::ws::WebSocket,
    broadcaster: SnapshotBroadcaster,
    initial: Option<Arc<Snapshot>>,
) {
    use axum::extract::ws::Message;
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut snapshot_rx = broadcaster.subscribe();

    info!("WebSocket client connected");

    let forward_task = tokio::spawn(async move {
        let mut pending = initial;

        loop {
            let snapshot = match pending.take() {
                Some(snapshot) => snapshot,
                None => match snapshot_rx.recv().await {
                    Ok(snapshot) => snapshot,
                    Err(RecvError::Lagged(count)) => {
                        warn!(skipped = count, "WebSocket client lagged, skipped snapshots");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Snapshot broadcaster closed");
                        break;
                    }
                },
            };

            match serde_json::to_string(&*snapshot) {
                Ok(json) => {
                    trace!(
                        projects = snapshot.projects.len(),
                        "Sending snapshot to WebSocket client"
                    );
                    if let Err(err) = sender.send(Message::Text(json.into())).await {
                        debug!(error = %err, "Failed to send snapshot to WebSocket client");
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "Failed to serialize snapshot");
                }
            }
        }
    });

    // Wait for client to disconnect
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client sent close frame");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    info!("WebSocket client disconnected");
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of active WebSocket connections.
    pub connections: usize,

    /// Number of configured projects.
    pub tracked_projects: usize,

    /// Validity window of the snapshot cache in seconds.
    pub cache_ttl_seconds: u64,

    /// Age of the cached snapshot in seconds, if one was ever stored.
    pub cache_age_seconds: Option<u64>,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster.subscriber_count(),
        tracked_projects: state.dashboard.project_ids().len(),
        cache_ttl_seconds: state.dashboard.cache().ttl().as_secs(),
        cache_age_seconds: state.dashboard.cache().age().map(|age| age.as_secs()),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================
