//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

use super::routes::{health, segments};
use crate::core::CoreApp;
use crate::core::constants::MAX_SEGMENT_BODY_BYTES;
use crate::domain::SegmentParseService;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Serve until shutdown is triggered. Returns the CoreApp for graceful
    /// shutdown of the background pipelines.
    pub async fn start(self) -> Result<CoreApp> {
        let app = self.app;
        let shutdown = app.shutdown.clone();

        let addr = SocketAddr::new(
            app.config
                .server
                .host
                .parse()
                .with_context(|| format!("Invalid server host: {}", app.config.server.host))?,
            app.config.server.port,
        );

        let router = build_router(app.parser.clone());

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(address = %addr, "Segment collector listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

/// Full HTTP surface: ingestion under `/v1` plus the health probe
pub fn build_router(parser: Arc<SegmentParseService>) -> Router {
    let ingestion = segments::routes(parser)
        .layer(RequestDecompressionLayer::new())
        .layer(DefaultBodyLimit::max(MAX_SEGMENT_BODY_BYTES));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", ingestion)
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(TraceLayer::new_for_http())
}
