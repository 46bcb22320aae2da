//! HTTP surface: `GET /brat` renders a PNG, `GET /bratvid` a reveal video.

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures::Stream;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tower_http::trace::TraceLayer;

use brat_core::BratError;

use crate::counter::HitCounter;
use crate::info::ServiceInfo;
use crate::service::{RenderService, VideoArtifact};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RenderService>,
    pub counter: HitCounter,
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    text: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/brat", get(brat_image))
        .route("/bratvid", get(brat_video))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

async fn brat_image(State(state): State<AppState>, Query(query): Query<TextQuery>) -> Response {
    let text = match state.requested_text(query).await {
        Ok(text) => text,
        Err(resp) => return resp,
    };
    match state.service.render_image(&text).await {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => error_response("/brat", &e),
    }
}

async fn brat_video(State(state): State<AppState>, Query(query): Query<TextQuery>) -> Response {
    let text = match state.requested_text(query).await {
        Ok(text) => text,
        Err(resp) => return resp,
    };
    let artifact = match state.service.render_video(&text).await {
        Ok(artifact) => artifact,
        Err(e) => return error_response("/bratvid", &e),
    };

    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) => return error_response("/bratvid", &BratError::Io(e)),
    };
    let len = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => return error_response("/bratvid", &BratError::Io(e)),
    };

    (
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(video_stream(file, artifact)),
    )
        .into_response()
}

impl AppState {
    /// The text to render, or the response to send instead. Every request
    /// counts as a hit; only the informational payload waits for the total.
    async fn requested_text(&self, query: TextQuery) -> Result<String, Response> {
        let text = match query.text {
            Some(text) if !text.is_empty() => text,
            _ => {
                let hit = self.counter.hit().await;
                return Err(Json(ServiceInfo::new(hit)).into_response());
            }
        };

        let counter = self.counter.clone();
        tokio::spawn(async move {
            counter.hit().await;
        });

        if text.trim().is_empty() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "Parameter `text` must contain at least one word" })),
            )
                .into_response());
        }
        Ok(text)
    }
}

fn error_response(route: &str, err: &BratError) -> Response {
    let (status, message) = match err {
        BratError::Busy(_) => (StatusCode::SERVICE_UNAVAILABLE, "Server busy"),
        BratError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "Invalid text"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };
    if status.is_server_error() {
        tracing::error!(route, kind = err.kind(), error = %err, "request failed");
    } else {
        tracing::info!(route, kind = err.kind(), error = %err, "request rejected");
    }
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// Stream the encoded file in chunks. The working directory goes away once
/// the body ends, fails, or is dropped by a disconnecting client.
fn video_stream(
    file: tokio::fs::File,
    artifact: VideoArtifact,
) -> impl Stream<Item = std::io::Result<Bytes>> {
    futures::stream::unfold(Some((file, artifact)), |state| async move {
        let (mut file, artifact) = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => {
                drop(file);
                artifact.workdir.remove().await;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some((file, artifact))))
            }
            Err(e) => {
                tracing::warn!(path = %artifact.path.display(), error = %e, "video read failed");
                drop(file);
                artifact.workdir.remove().await;
                Some((Err(e), None))
            }
        }
    })
}
