//! HTTP endpoints for health checks, service info, game heads, and ingest.

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tracing::{debug, error, info};

use crate::{
    event::GAME_KIND,
    game::{tree_entries, Games, HeadState, HeadView, TreeEntry},
    ident::{self, IdentError},
    rules::GENESIS_REF,
    storage::Store,
    validate,
};

type HttpState = Arc<Games<Store>>;

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
}

/// Response body for `/`.
#[derive(Serialize, Deserialize)]
struct ServiceInfo {
    name: String,
    version: String,
    /// Event kind carrying game starts and moves.
    kind: u32,
    /// Reference every game start must carry.
    genesis: String,
}

/// Head of a game that has no valid start yet.
#[derive(Serialize, Deserialize)]
struct Pending {
    game: String,
    status: String,
}

#[derive(Serialize, Deserialize)]
struct Stored {
    stored: bool,
}

/// Error body with the status it maps to.
struct ApiError(StatusCode, String);

impl From<IdentError> for ApiError {
    fn from(e: IdentError) -> Self {
        ApiError(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %e, "request failed");
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

/// Build the application router over `games`.
pub fn router(games: Arc<Games<Store>>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/healthz", get(healthz))
        .route("/games/:id/head", get(game_head))
        .route("/games/:id/tree", get(game_tree))
        .route("/events", post(publish_event))
        .with_state(games)
}

/// Start an HTTP server on `addr` until `shutdown` completes.
pub async fn serve_http(
    addr: SocketAddr,
    games: Arc<Games<Store>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "http listening");
    axum::serve(listener, router(games).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Health check endpoint.
async fn healthz() -> Json<Health> {
    debug!("GET /healthz");
    Json(Health {
        status: "ok".to_string(),
    })
}

async fn service_info() -> impl IntoResponse {
    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(ServiceInfo {
            name: "chesstr".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            kind: GAME_KIND,
            genesis: GENESIS_REF.into(),
        }),
    )
}

/// Resolve the canonical head of a game given as hex or `note1…`.
async fn game_head(
    State(games): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let game = ident::parse_game_ref(&id)?;
    debug!(game = %game, "GET head");
    Ok(match games.resolve_head(&game)? {
        HeadState::Resolved(res) => Json(HeadView::from(&res)).into_response(),
        HeadState::Pending => Json(Pending {
            game: game.to_hex(),
            status: "pending".into(),
        })
        .into_response(),
    })
}

/// Every admitted node of a game, canonical path marked.
async fn game_tree(
    State(games): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TreeEntry>>, ApiError> {
    let game = ident::parse_game_ref(&id)?;
    let tree = games.snapshot(&game)?;
    Ok(Json(tree_entries(&tree)))
}

/// Accept one wire event. Events that fail admission are not stored.
async fn publish_event(
    State(games): State<HttpState>,
    body: String,
) -> Result<(StatusCode, Json<Stored>), ApiError> {
    let ev = validate::parse_event(&body)
        .map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.to_string()))?;
    let stored = games.ingest(ev)?;
    let status = if stored {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(Stored { stored })))
}
