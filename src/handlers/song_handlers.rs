//! HTTP handlers for the song feed API.
//!
//! - `GET  /api/songs`  -> listing derived from the bucket contents
//! - `POST /api/upload` -> multipart upload stored under a unique key
//! - `GET  /files/{bucket}/{*key}` -> object bytes, proxied through the gateway

use crate::{
    errors::AppError,
    models::song::SongListing,
    services::storage_gateway::StorageError,
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderValue, header},
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    /// Object key the file was stored under.
    pub filename: String,
}

/// `GET /api/songs`
///
/// Fails open: a disabled gateway or a missing/forbidden bucket yields `[]`.
/// Only unclassified storage errors become a 500.
pub async fn list_songs(State(state): State<AppState>) -> Result<Json<Vec<SongListing>>, AppError> {
    let gateway = &state.gateway;
    let (Some(bucket), Some(endpoint)) = (gateway.bucket(), gateway.endpoint()) else {
        debug!("storage disabled, returning empty song list");
        return Ok(Json(Vec::new()));
    };

    let objects = match gateway.list_objects(bucket).await {
        Ok(objects) => objects,
        Err(StorageError::Unavailable) => Vec::new(),
        Err(err) => {
            error!("Error in list_songs: {}", err);
            return Err(err.into());
        }
    };

    let songs: Vec<SongListing> = objects
        .iter()
        .map(|obj| SongListing::from_object(obj, endpoint, bucket))
        .collect();

    debug!("Returning {} songs", songs.len());
    Ok(Json(songs))
}

/// `POST /api/upload`
///
/// Expects a multipart part named `file` carrying a `filename`. A `file`
/// part without a filename is an ordinary form field and does not count.
/// Requests that are not multipart at all have no file part either.
/// The object is stored as `{uuid}_{sanitized filename}` so uploads with the
/// same name never collide.
pub async fn upload_song(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            debug!("upload is not multipart: {}", rejection.body_text());
            return Err(AppError::bad_request("No file part"));
        }
    };
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if filename.is_empty() {
            return Err(AppError::bad_request("No selected file"));
        }
        let content = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, content));
        break;
    }

    let Some((filename, content)) = upload else {
        return Err(AppError::bad_request("No file part"));
    };

    let Some(bucket) = state.gateway.bucket() else {
        error!("upload of `{}` rejected: storage is not configured", filename);
        return Err(StorageError::Unavailable.into());
    };

    let key = unique_key(&filename);
    if let Err(err) = state.gateway.put_object(bucket, &key, content).await {
        error!("Error uploading `{}`: {}", key, err);
        return Err(err.into());
    }

    info!("uploaded `{}` as `{}`", filename, key);
    Ok(Json(UploadResponse {
        message: "File uploaded successfully".into(),
        filename: key,
    }))
}

/// `GET /files/{bucket}/{*key}`
///
/// Serves an object of the configured bucket. Listing URLs point here when
/// the object store itself is not reachable by browsers (`--memory-store`).
pub async fn download_song(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    if !state.gateway.is_enabled() {
        return Err(StorageError::Unavailable.into());
    }
    if state.gateway.bucket() != Some(bucket.as_str()) {
        return Err(AppError::not_found("Not found"));
    }

    let content = state
        .gateway
        .get_object(&bucket, &key)
        .await?
        .ok_or_else(|| AppError::not_found("Not found"))?;

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&key)))],
        content,
    ))
}

/// Content type from the file extension; audio formats browsers can play
/// inline, everything else as a download.
fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" | "aac" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), err.body_text())
}

/// Storage key for an uploaded file: random UUID, underscore, safe name.
pub fn unique_key(filename: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), sanitize_filename(filename))
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// Non-ASCII characters are dropped, path separators become spaces, runs of
/// whitespace become `_`, anything outside `[A-Za-z0-9._-]` is removed and
/// leading/trailing `.`/`_` are trimmed. Names that end up empty become
/// `upload`.
pub fn sanitize_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("track.mp3"), "track.mp3");
        assert_eq!(sanitize_filename("my-song_v2.flac"), "my-song_v2.flac");
    }

    #[test]
    fn sanitize_flattens_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_filename("C:\\music\\Song.mp3"), "C_music_Song.mp3");
    }

    #[test]
    fn sanitize_replaces_whitespace_and_drops_unsafe() {
        assert_eq!(sanitize_filename("My  Song (live).mp3"), "My_Song_live.mp3");
        assert_eq!(sanitize_filename("café.mp3"), "caf.mp3");
    }

    #[test]
    fn sanitize_falls_back_when_nothing_survives() {
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("日本語"), "upload");
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for("abc_track.MP3"), "audio/mpeg");
        assert_eq!(content_type_for("dir/song.flac"), "audio/flac");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
    }

    #[test]
    fn unique_keys_differ_for_same_name() {
        let a = unique_key("track.mp3");
        let b = unique_key("track.mp3");
        assert_ne!(a, b);

        let (id, rest) = a.split_once('_').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(rest, "track.mp3");
    }
}
