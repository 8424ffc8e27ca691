//! Entity models for the listening library.
//!
//! Artists, albums and tracks are independent rows keyed by integer ids; the
//! many-to-many relations between them live in join tables and are surfaced
//! here as plain id lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source tag attached to aliases created by a document import.
pub const IMPORT_ALIAS_SOURCE: &str = "Import";

/// Source tag of an alias derived from an entity's stored name.
pub const CANONICAL_ALIAS_SOURCE: &str = "Canonical";

/// An alternate name of an artist, album or track.
///
/// Exactly one alias of an entity is expected to be primary; the primary alias
/// is the canonical name used for matching and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub alias: String,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "is_primary", alias = "primary", default)]
    pub primary: bool,
}

impl Alias {
    pub fn new(alias: impl Into<String>, source: impl Into<String>, primary: bool) -> Self {
        Self {
            alias: alias.into(),
            source: source.into(),
            primary,
        }
    }
}

/// Normalizes an optional external id: a nil UUID counts as absent.
pub fn non_nil_mbid(mbid: Option<Uuid>) -> Option<Uuid> {
    mbid.filter(|id| !id.is_nil())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub id: i64,
    pub mbid: Option<Uuid>,
    pub name: String,
    pub image: Option<Uuid>,
    pub image_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub id: i64,
    pub mbid: Option<Uuid>,
    pub title: String,
    pub various_artists: bool,
    pub image: Option<Uuid>,
    pub image_source: Option<String>,
    pub artist_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: i64,
    pub mbid: Option<Uuid>,
    pub title: String,
    pub duration: u32,
    pub album_id: i64,
    pub artist_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct NewArtist {
    pub mbid: Option<Uuid>,
    pub name: String,
    pub image: Option<Uuid>,
    pub image_source: Option<String>,
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone)]
pub struct NewAlbum {
    pub mbid: Option<Uuid>,
    pub title: String,
    pub various_artists: bool,
    pub image: Option<Uuid>,
    pub image_source: Option<String>,
    /// Ordered; the first artist takes part in the album identity.
    pub artist_ids: Vec<i64>,
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackArtist {
    pub artist_id: i64,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct NewTrack {
    pub mbid: Option<Uuid>,
    pub title: String,
    pub duration: u32,
    pub album_id: i64,
    pub artists: Vec<TrackArtist>,
}

#[derive(Debug, Clone)]
pub struct NewListen {
    pub user_id: usize,
    pub track_id: i64,
    pub listened_at: DateTime<Utc>,
    pub client: Option<String>,
}

/// Identity key of an artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtistIdentity<'a> {
    Mbid(Uuid),
    Name(&'a str),
}

impl<'a> ArtistIdentity<'a> {
    pub fn new(mbid: Option<Uuid>, name: &'a str) -> Self {
        match non_nil_mbid(mbid) {
            Some(mbid) => Self::Mbid(mbid),
            None => Self::Name(name),
        }
    }
}

/// Identity key of an album. Without an external id, same-titled albums are
/// told apart by their first artist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlbumIdentity<'a> {
    Mbid(Uuid),
    TitleAndArtist { title: &'a str, artist_id: i64 },
}

impl<'a> AlbumIdentity<'a> {
    pub fn new(mbid: Option<Uuid>, title: &'a str, first_artist_id: i64) -> Self {
        match non_nil_mbid(mbid) {
            Some(mbid) => Self::Mbid(mbid),
            None => Self::TitleAndArtist {
                title,
                artist_id: first_artist_id,
            },
        }
    }
}

/// Identity key of a track. Without an external id, the whole artist set must
/// match, order ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackIdentity<'a> {
    Mbid(Uuid),
    TitleAndArtists { title: &'a str, artist_ids: &'a [i64] },
}

impl<'a> TrackIdentity<'a> {
    pub fn new(mbid: Option<Uuid>, title: &'a str, artist_ids: &'a [i64]) -> Self {
        match non_nil_mbid(mbid) {
            Some(mbid) => Self::Mbid(mbid),
            None => Self::TitleAndArtists { title, artist_ids },
        }
    }
}

/// Position in a user's listen history, ordered by (timestamp, track id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExportCursor {
    /// Unix microseconds.
    pub listened_at: i64,
    pub track_id: i64,
}

impl ExportCursor {
    /// The cursor before any listen: the epoch and track id zero.
    pub fn start() -> Self {
        Self {
            listened_at: 0,
            track_id: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtist {
    pub name: String,
    pub mbid: Option<Uuid>,
    pub image_source: Option<String>,
    pub is_primary: bool,
    pub aliases: Vec<Alias>,
}

/// One listen with its track, album and artists fully denormalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportItem {
    pub listened_at: DateTime<Utc>,
    pub track_id: i64,
    pub track_title: String,
    pub track_mbid: Option<Uuid>,
    pub track_duration: u32,
    pub track_aliases: Vec<Alias>,
    pub album_title: String,
    pub album_mbid: Option<Uuid>,
    pub album_image_source: Option<String>,
    pub various_artists: bool,
    pub album_aliases: Vec<Alias>,
    pub artists: Vec<ExportArtist>,
}

impl ExportItem {
    pub fn cursor(&self) -> ExportCursor {
        ExportCursor {
            listened_at: self.listened_at.timestamp_micros(),
            track_id: self.track_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityCounts {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub listens: usize,
}
