//! Segment ingestion endpoint
//!
//! Accepts a protobuf `UpstreamSegment` and runs it through the parse
//! service as an agent submission.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use prost::Message;

use crate::domain::segment::proto::UpstreamSegment;
use crate::domain::{SegmentParseService, Source};

#[derive(Clone)]
pub struct SegmentsState {
    pub parser: Arc<SegmentParseService>,
}

pub fn routes(parser: Arc<SegmentParseService>) -> Router {
    Router::new()
        .route("/segments", post(submit))
        .with_state(SegmentsState { parser })
}

/// `200` committed, `202` buffered or dropped, `400` undecodable envelope,
/// `422` structurally invalid segment.
pub async fn submit(State(state): State<SegmentsState>, body: Bytes) -> Response {
    let upstream = match UpstreamSegment::decode(body.as_ref()) {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "Failed to decode upstream segment");
            return (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, "text/plain")],
                "Failed to decode protobuf request",
            )
                .into_response();
        }
    };

    match state.parser.parse(upstream, Source::Agent).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Rejected structurally invalid segment");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
                .into_response()
        }
    }
}
