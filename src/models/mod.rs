//! Data models for the song feed.
//!
//! `SongListing` is what `/api/songs` returns and is derived from the
//! object-store listing on every request. `Song` maps the relational
//! `songs` table.

pub mod song;
