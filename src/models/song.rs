//! Songs as the feed presents them.

use crate::storage::StoredObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Artist shown for every listing; nothing in a bare object key names one.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Format of `upload_date` in listings.
pub const UPLOAD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A row of the `songs` table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub upload_date: DateTime<Utc>,
    /// Object key of the audio file in the bucket.
    pub file_key: String,
}

/// One entry of the `/api/songs` response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SongListing {
    pub key: String,
    pub title: String,
    pub artist: String,
    pub upload_date: String,
    pub url: String,
}

impl SongListing {
    /// Derive a listing from a stored object. `endpoint` should not end in `/`.
    pub fn from_object(object: &StoredObject, endpoint: &str, bucket: &str) -> Self {
        Self {
            key: object.key.clone(),
            title: title_from_key(&object.key).to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
            upload_date: object.last_modified.format(UPLOAD_DATE_FORMAT).to_string(),
            url: format!("{}/{}/{}", endpoint, bucket, object.key),
        }
    }
}

/// Last path segment of `key` with its final extension removed.
///
/// `"folder/My Song.mp3"` -> `"My Song"`, `"a.b.flac"` -> `"a.b"`,
/// `"README"` -> `"README"`.
pub fn title_from_key(key: &str) -> &str {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}
