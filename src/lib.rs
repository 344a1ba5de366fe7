//! Song feed: lists the objects of an S3-compatible bucket as songs and
//! accepts uploads into that bucket.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

use axum::Router;
use state::AppState;

/// Router with state attached, ready to serve.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes::routes::routes(max_upload_bytes).with_state(state)
}
