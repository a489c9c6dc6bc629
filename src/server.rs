//! HTTP query server.
//!
//! Serves queries against the index while the indexing service keeps it in
//! sync in the background. Both share one [`CancellationToken`]: Ctrl-C
//! cancels the pipeline tasks and shuts the listener down gracefully.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | `{"query": "..."}` → `{"result": {"links": [...], "output": "..."}}` |
//! | `POST` | `/embedding` | `{"query": "..."}` → `{"result": [f32, ...]}` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Failures return `{"error": "<message>"}`: 400 for an empty query, 404
//! when nothing matches, 500 when the store or embedder fails.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embedding::embed_query;
use crate::models::QueryOutput;
use crate::pipeline::{run_service, Engine};
use crate::search::{find, FindError, LinkRewrite, NOTHING_FOUND};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    rewrite: Arc<LinkRewrite>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let rewrite = LinkRewrite::from_config(&engine.config.server);
        Self {
            engine,
            rewrite: Arc::new(rewrite),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/query", post(handle_query))
        .route("/embedding", post(handle_embedding))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// `docsync serve`: open the stores, start the indexing service and serve
/// HTTP on `[server].bind` until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(Engine::open(config).await?);
    let listener = TcpListener::bind(&config.server.bind).await?;
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    println!("docsync listening on http://{}", listener.local_addr()?);
    serve(engine, listener, shutdown).await
}

/// Serve on `listener` with the indexing service running alongside, until
/// `shutdown` fires. Waits for the service to stop before returning.
pub async fn serve(
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let indexing = tokio::spawn(run_service(engine.clone(), shutdown.child_token()));

    let app = router(AppState::new(engine));
    let signal = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    shutdown.cancel();
    if let Err(e) = indexing.await {
        warn!(error = %e, "indexing service task failed");
    }
    served?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

// ============ Handlers ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Serialize)]
struct ResultBody<T> {
    result: T,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ResultBody<QueryOutput>>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let engine = &state.engine;
    match find(
        &req.query,
        engine.embedder.as_ref(),
        engine.content.as_ref(),
        engine.config.retrieval.limit,
        &state.rewrite,
    )
    .await
    {
        Ok(output) => Ok(Json(ResultBody { result: output })),
        Err(FindError::NothingFound) => Err(AppError {
            status: StatusCode::NOT_FOUND,
            message: NOTHING_FOUND.to_string(),
        }),
        Err(FindError::Index(e)) => {
            error!(error = %e, query = %req.query, "query failed");
            Err(internal(NOTHING_FOUND))
        }
    }
}

async fn handle_embedding(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ResultBody<Vec<f32>>>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let vector = embed_query(state.engine.embedder.as_ref(), &req.query)
        .await
        .map_err(|e| {
            error!(error = %e, "embedding failed");
            internal(e.to_string())
        })?;
    Ok(Json(ResultBody { result: vector }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
