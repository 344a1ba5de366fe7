//! Defines the routes of the song feed.
//!
//! ## Structure
//! - **Pages**
//!   - `GET  /`                  — landing page
//!   - `GET  /static/js/app.js`  — landing page script
//!
//! - **API**
//!   - `GET  /api/songs`   — songs derived from the bucket listing
//!   - `POST /api/upload`  — multipart upload (field `file`)
//!   - `GET  /files/{bucket}/{*key}` — object bytes
//!
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        page_handlers::{app_js, index},
        song_handlers::{download_song, list_songs, upload_song},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the router. `max_upload_bytes` caps request bodies on the upload route.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/static/js/app.js", get(app_js))
        .route("/api/songs", get(list_songs))
        .route(
            "/api/upload",
            post(upload_song).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/files/{bucket}/{*key}", get(download_song))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
}
