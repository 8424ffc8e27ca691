//! The portable interchange document.
//!
//! Version "1" carries listens only. Version "2" adds the preferences bag and
//! the theme. Both share the listen record layout below.

use super::error::{InterchangeError, InterchangeResult};
use crate::library_store::{non_nil_mbid, Alias};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::io::Read;
use uuid::Uuid;

pub const VERSION_1: &str = "1";
pub const VERSION_2: &str = "2";
pub const CURRENT_VERSION: &str = VERSION_2;

/// Treats `null`, `""` and the nil UUID as a missing id.
fn lenient_mbid<'de, D>(deserializer: D) -> Result<Option<Uuid>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(|id| non_nil_mbid(Some(id)))
            .map_err(serde::de::Error::custom),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    #[serde(default, alias = "external_id", deserialize_with = "lenient_mbid")]
    pub mbid: Option<Uuid>,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image_url: String,
    #[serde(default, alias = "external_id", deserialize_with = "lenient_mbid")]
    pub mbid: Option<Uuid>,
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default)]
    pub various_artists: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image_url: String,
    #[serde(default, alias = "external_id", deserialize_with = "lenient_mbid")]
    pub mbid: Option<Uuid>,
    #[serde(default, alias = "primary")]
    pub is_primary: bool,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenRecord {
    pub listened_at: DateTime<Utc>,
    pub track: TrackRecord,
    pub album: AlbumRecord,
    #[serde(default)]
    pub artists: Vec<ArtistRecord>,
}

#[derive(Deserialize)]
struct VersionHeader {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeDocument {
    pub version: String,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Map<String, Value>>,
    /// Absent and `null` both decode to `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Value>,
    #[serde(default)]
    pub listens: Vec<ListenRecord>,
}

/// Returns the display name of an alias list, ignoring blank entries.
pub fn display_name(aliases: &[Alias]) -> Option<&str> {
    aliases
        .iter()
        .find(|a| a.primary && !a.alias.trim().is_empty())
        .or_else(|| aliases.iter().find(|a| !a.alias.trim().is_empty()))
        .map(|a| a.alias.as_str())
}

pub fn check_version(version: &str) -> InterchangeResult<()> {
    match version {
        VERSION_1 | VERSION_2 => Ok(()),
        other => Err(InterchangeError::UnsupportedVersion(other.to_string())),
    }
}

impl InterchangeDocument {
    /// Decodes and checks a document. The version is checked before the
    /// body is decoded, so a document of an unknown version is reported as
    /// such even when its layout differs.
    pub fn from_slice(bytes: &[u8]) -> InterchangeResult<Self> {
        let header: VersionHeader =
            serde_json::from_slice(bytes).map_err(InterchangeError::MalformedJson)?;
        check_version(header.version.as_deref().unwrap_or_default())?;

        let document: InterchangeDocument =
            serde_json::from_slice(bytes).map_err(InterchangeError::MalformedJson)?;
        document.validate()?;
        Ok(document)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> InterchangeResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_slice(&bytes)
    }

    pub fn is_legacy(&self) -> bool {
        self.version == VERSION_1
    }

    pub fn listen_count(&self) -> usize {
        self.listens.len()
    }

    /// Checks everything the importer relies on, so that a bad document is
    /// rejected before any entity is created.
    pub fn validate(&self) -> InterchangeResult<()> {
        check_version(&self.version)?;

        for (index, listen) in self.listens.iter().enumerate() {
            if listen.artists.is_empty() {
                return Err(InterchangeError::InvalidDocument(format!(
                    "listen {} has no artists",
                    index
                )));
            }
            if display_name(&listen.track.aliases).is_none() {
                return Err(InterchangeError::InvalidDocument(format!(
                    "track of listen {} has no name",
                    index
                )));
            }
            if display_name(&listen.album.aliases).is_none() {
                return Err(InterchangeError::InvalidDocument(format!(
                    "album of listen {} has no name",
                    index
                )));
            }
            if let Some(position) = listen
                .artists
                .iter()
                .position(|artist| display_name(&artist.aliases).is_none())
            {
                return Err(InterchangeError::InvalidDocument(format!(
                    "artist {} of listen {} has no name",
                    position, index
                )));
            }
        }
        Ok(())
    }
}
