//! End-to-end tests for the HTTP surface, driven through the router with
//! the in-memory object store.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use song_feed::{
    app,
    services::storage_gateway::StorageGateway,
    state::AppState,
    storage::{BackendError, ObjectStore, StoredObject, memory::MemoryStore},
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const BUCKET: &str = "songs";
const ENDPOINT: &str = "https://r2.example.com";
const BOUNDARY: &str = "song-feed-test-boundary";

async fn router_with(gateway: StorageGateway) -> Router {
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    app(AppState { gateway, db }, 1024 * 1024)
}

fn memory_gateway(store: Arc<MemoryStore>) -> StorageGateway {
    StorageGateway::new(store, BUCKET, ENDPOINT)
}

/// Backend whose every call fails with the given service code.
struct FailingStore(&'static str);

#[async_trait]
impl ObjectStore for FailingStore {
    async fn list_objects(&self, _bucket: &str) -> Result<Vec<StoredObject>, BackendError> {
        Err(BackendError::new(self.0, "simulated failure"))
    }

    async fn put_object(
        &self,
        _bucket: &str,
        _key: &str,
        _content: Bytes,
    ) -> Result<(), BackendError> {
        Err(BackendError::new(self.0, "simulated failure"))
    }

    async fn get_object(&self, _bucket: &str, _key: &str) -> Result<Option<Bytes>, BackendError> {
        Err(BackendError::new(self.0, "simulated failure"))
    }

    async fn bucket_exists(&self, _bucket: &str) -> Result<bool, BackendError> {
        Ok(true)
    }

    async fn create_bucket(&self, _bucket: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

fn failing_gateway(code: &'static str) -> StorageGateway {
    StorageGateway::new(Arc::new(FailingStore(code)), BUCKET, ENDPOINT)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// One multipart part: (field name, optional filename, content).
type Part<'a> = (&'a str, Option<&'a str>, &'a str);

fn multipart_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::post("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn upload(router: Router, parts: &[Part<'_>]) -> (StatusCode, Value) {
    let (status, body) = send(router, multipart_request(parts)).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn index_serves_html() {
    let router = router_with(StorageGateway::disabled()).await;
    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
}

#[tokio::test]
async fn app_script_is_served() {
    let router = router_with(StorageGateway::disabled()).await;
    let (status, body) = send(
        router,
        Request::get("/static/js/app.js").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("/api/songs"));
}

#[tokio::test]
async fn songs_are_derived_from_listing() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let uploaded = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
    store.insert(BUCKET, "folder/My Song.mp3", Bytes::from_static(b"a"), uploaded);
    store.insert(BUCKET, "other.flac", Bytes::from_static(b"b"), uploaded);

    let router = router_with(memory_gateway(store.clone())).await;
    let (status, body) = get_json(router, "/api/songs").await;

    assert_eq!(status, StatusCode::OK);
    let songs = body.as_array().unwrap();
    assert_eq!(songs.len(), store.len(BUCKET));
    assert_eq!(
        songs[0],
        json!({
            "key": "folder/My Song.mp3",
            "title": "My Song",
            "artist": "Unknown",
            "upload_date": "2024-05-01 12:30:45",
            "url": "https://r2.example.com/songs/folder/My Song.mp3",
        })
    );
    assert_eq!(songs[1]["title"], "other");
}

#[tokio::test]
async fn songs_empty_when_storage_disabled() {
    let router = router_with(StorageGateway::disabled()).await;
    let (status, body) = get_json(router, "/api/songs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn songs_empty_when_bucket_missing() {
    // no bucket created
    let router = router_with(memory_gateway(Arc::new(MemoryStore::new()))).await;
    let (status, body) = get_json(router, "/api/songs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn songs_empty_when_access_denied() {
    let router = router_with(failing_gateway("AccessDenied")).await;
    let (status, body) = get_json(router, "/api/songs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn unclassified_listing_error_is_500() {
    let router = router_with(failing_gateway("InternalError")).await;
    let (status, body) = get_json(router, "/api/songs").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "InternalError: simulated failure" }));
}

#[tokio::test]
async fn upload_without_file_part_is_400() {
    let router = router_with(memory_gateway(Arc::new(MemoryStore::with_bucket(BUCKET)))).await;
    let (status, body) = upload(router, &[("title", None, "not a file")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file part" }));
}

#[tokio::test]
async fn upload_without_multipart_body_is_400() {
    let router = router_with(memory_gateway(Arc::new(MemoryStore::with_bucket(BUCKET)))).await;
    let (status, body) = send(
        router,
        Request::post("/api/upload").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "error": "No file part" })
    );
}

#[tokio::test]
async fn upload_with_urlencoded_body_is_400() {
    let router = router_with(memory_gateway(Arc::new(MemoryStore::with_bucket(BUCKET)))).await;
    let request = Request::post("/api/upload")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("file=track.mp3"))
        .unwrap();
    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "error": "No file part" })
    );
}

#[tokio::test]
async fn file_field_without_filename_is_not_a_file_part() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store.clone())).await;
    let (status, body) = upload(router, &[("file", None, "plain text value")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file part" }));
    assert!(store.is_empty(BUCKET));
}

#[tokio::test]
async fn upload_over_size_limit_is_413() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store.clone())).await;
    // router_with caps bodies at 1 MiB
    let oversized = "x".repeat(2 * 1024 * 1024);
    let (status, body) = upload(router, &[("file", Some("big.mp3"), oversized.as_str())]).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
    assert!(store.is_empty(BUCKET));
}

#[tokio::test]
async fn upload_with_empty_filename_is_400() {
    let router = router_with(memory_gateway(Arc::new(MemoryStore::with_bucket(BUCKET)))).await;
    let (status, body) = upload(router, &[("file", Some(""), "")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No selected file" }));
}

#[tokio::test]
async fn upload_stores_under_unique_key() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store.clone())).await;
    let (status, body) = upload(router, &[("file", Some("track.mp3"), "ID3 audio")]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File uploaded successfully");

    let key = body["filename"].as_str().unwrap();
    let (id, name) = key.split_once('_').unwrap();
    assert!(Uuid::parse_str(id).is_ok());
    assert_eq!(name, "track.mp3");
    assert_eq!(
        store.get(BUCKET, key),
        Some(Bytes::from_static(b"ID3 audio"))
    );
}

#[tokio::test]
async fn upload_sanitizes_filename() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store.clone())).await;
    let (status, body) = upload(router, &[("file", Some("../secret dir/My Song.mp3"), "x")]).await;

    assert_eq!(status, StatusCode::OK);
    let key = body["filename"].as_str().unwrap();
    assert!(key.ends_with("_secret_dir_My_Song.mp3"), "{}", key);
    assert!(!key.contains('/'));
}

#[tokio::test]
async fn concurrent_uploads_with_same_name_do_not_collide() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store.clone())).await;

    let uploads: Vec<_> = (0..8)
        .map(|_| {
            let router = router.clone();
            tokio::spawn(async move { upload(router, &[("file", Some("track.mp3"), "x")]).await })
        })
        .collect();

    let mut keys = Vec::new();
    for handle in uploads {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        keys.push(body["filename"].as_str().unwrap().to_string());
    }
    keys.sort();
    keys.dedup();

    assert_eq!(keys.len(), 8);
    assert_eq!(store.len(BUCKET), 8);
}

#[tokio::test]
async fn upload_then_list_shows_song() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store)).await;

    let (_, body) = upload(router.clone(), &[("file", Some("track.mp3"), "x")]).await;
    let key = body["filename"].as_str().unwrap().to_string();

    let (status, songs) = get_json(router, "/api/songs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(songs[0]["key"], key.as_str());
    assert_eq!(songs[0]["title"], key.trim_end_matches(".mp3"));
}

#[tokio::test]
async fn upload_storage_failure_is_500() {
    let router = router_with(failing_gateway("InternalError")).await;
    let (status, body) = upload(router, &[("file", Some("track.mp3"), "x")]).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to upload file" }));
}

#[tokio::test]
async fn upload_with_storage_disabled_is_503() {
    let router = router_with(StorageGateway::disabled()).await;
    let (status, body) = upload(router, &[("file", Some("track.mp3"), "x")]).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Storage unavailable" }));
}

#[tokio::test]
async fn healthz_is_ok() {
    let router = router_with(StorageGateway::disabled()).await;
    let (status, body) = get_json(router, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn readyz_reflects_storage_state() {
    let router = router_with(StorageGateway::disabled()).await;
    let (status, body) = get_json(router, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["storage"]["ok"], false);

    let router = router_with(memory_gateway(Arc::new(MemoryStore::with_bucket(BUCKET)))).await;
    let (status, body) = get_json(router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn uploaded_song_is_downloadable() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    let router = router_with(memory_gateway(store)).await;

    let (_, body) = upload(router.clone(), &[("file", Some("track.mp3"), "ID3 audio")]).await;
    let key = body["filename"].as_str().unwrap();

    let response = router
        .oneshot(
            Request::get(format!("/files/{}/{}", BUCKET, key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes, Bytes::from_static(b"ID3 audio"));
}

#[tokio::test]
async fn download_of_nested_key_with_spaces() {
    let store = Arc::new(MemoryStore::with_bucket(BUCKET));
    store.insert(BUCKET, "folder/My Song.mp3", Bytes::from_static(b"a"), Utc::now());
    let router = router_with(memory_gateway(store)).await;

    let request = Request::get("/files/songs/folder/My%20Song.mp3")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"a"));
}

#[tokio::test]
async fn download_missing_object_or_other_bucket_is_404() {
    let router = router_with(memory_gateway(Arc::new(MemoryStore::with_bucket(BUCKET)))).await;

    let (status, body) = get_json(router.clone(), "/files/songs/nope.mp3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));

    let (status, _) = get_json(router, "/files/other/track.mp3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn download_with_storage_disabled_is_503() {
    let router = router_with(StorageGateway::disabled()).await;
    let (status, body) = get_json(router, "/files/songs/track.mp3").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Storage unavailable" }));
}
