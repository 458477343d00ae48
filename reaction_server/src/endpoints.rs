//! Endpoints of HTTP server.
//!
use std::{
    convert::Infallible,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    body::StreamBody,
    extract,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use common::protocol::SceneSnapshot;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::pubsub::SceneHub;

const INDEX_HTML: &str = include_str!("../resources/index.html");

/// Directory overlay images are served from.
#[derive(Clone, Debug)]
pub struct AssetsDir(PathBuf);

impl AssetsDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(dir.into())
    }

    /// Path of a file directly inside the directory. Anything that could leave it is rejected.
    pub fn resolve(&self, file: &str) -> Option<PathBuf> {
        let valid = !file.is_empty()
            && !file.starts_with('.')
            && !file.contains(['/', '\\'])
            && !file.contains("..");
        valid.then(|| self.0.join(file))
    }
}

/// Build the router serving the page, the scene and the webcam stream.
pub fn app(hub: SceneHub, assets: AssetsDir) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/scene", get(scene))
        .route("/stream", get(stream))
        .route("/img/:file", get(overlay_image))
        .layer(Extension(hub))
        .layer(Extension(Arc::new(assets)))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Current presentation state.
pub async fn scene(Extension(hub): Extension<SceneHub>) -> Json<SceneSnapshot> {
    Json(hub.scene())
}

// Endpoint of the raw webcam stream.
pub async fn stream(Extension(hub): Extension<SceneHub>) -> impl IntoResponse {
    log::info!("Webcam stream requested");

    // Subscribers that lag behind skip the frames they missed
    let stream = BroadcastStream::new(hub.subscribe_frames())
        .filter_map(|item| async move { item.ok().map(Ok::<_, Infallible>) });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body)
}

/// Overlay image from the assets directory.
pub async fn overlay_image(
    Extension(assets): Extension<Arc<AssetsDir>>,
    extract::Path(file): extract::Path<String>,
) -> Response {
    let Some(path) = assets.resolve(&file) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(data) => ([(header::CONTENT_TYPE, content_type(&path))], data).into_response(),
        Err(err) => {
            log::debug!("Unable to serve {}: {err}", path.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
