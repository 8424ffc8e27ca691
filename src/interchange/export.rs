//! Streaming export of a user's listening history.
//!
//! The document is written incrementally: the header goes out before the
//! first page is fetched and each listen is written as soon as it is
//! converted, so memory use is bounded by one page regardless of history
//! size. If anything fails mid-way the sink holds a truncated document; the
//! caller is expected to discard it and run the export again.

use super::document::{AlbumRecord, ArtistRecord, ListenRecord, TrackRecord, CURRENT_VERSION};
use super::error::{InterchangeError, InterchangeResult};
use crate::library_store::{Alias, ExportCursor, ExportItem, LibraryStore, CANONICAL_ALIAS_SOURCE};
use crate::preferences::{load_preferences, registry};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::io::Write;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_EXPORT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Listens fetched per store query. Values below 1 are treated as 1.
    pub page_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_EXPORT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub listens: usize,
    pub pages: usize,
}

/// Entities without alias rows are exported under their stored name, so the
/// document always carries a name for every entity.
fn aliases_or_name(aliases: Vec<Alias>, name: String) -> Vec<Alias> {
    if aliases.iter().any(|a| !a.alias.trim().is_empty()) {
        aliases
    } else {
        vec![Alias::new(name, CANONICAL_ALIAS_SOURCE, true)]
    }
}

fn to_record(item: ExportItem) -> ListenRecord {
    ListenRecord {
        listened_at: item.listened_at,
        track: TrackRecord {
            mbid: item.track_mbid,
            duration: item.track_duration,
            aliases: aliases_or_name(item.track_aliases, item.track_title),
        },
        album: AlbumRecord {
            image_url: item.album_image_source.unwrap_or_default(),
            mbid: item.album_mbid,
            aliases: aliases_or_name(item.album_aliases, item.album_title),
            various_artists: item.various_artists,
        },
        artists: item
            .artists
            .into_iter()
            .map(|artist| ArtistRecord {
                image_url: artist.image_source.unwrap_or_default(),
                mbid: artist.mbid,
                is_primary: artist.is_primary,
                aliases: aliases_or_name(artist.aliases, artist.name),
            })
            .collect(),
    }
}

fn load_theme<S: LibraryStore + ?Sized>(store: &S, user_id: usize) -> InterchangeResult<Value> {
    let Some(raw) = store.get_user_theme(user_id)? else {
        return Ok(Value::Object(Default::default()));
    };
    match serde_json::from_str(&raw) {
        Ok(theme) => Ok(theme),
        Err(e) => {
            warn!("Failed to parse theme of user {}, exporting null: {}", user_id, e);
            Ok(Value::Null)
        }
    }
}

/// Writes the complete export document of `user_id` to `sink`.
pub fn export_user_data<S, W>(
    store: &S,
    user_id: usize,
    mut sink: W,
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> InterchangeResult<ExportStats>
where
    S: LibraryStore + ?Sized,
    W: Write,
{
    let handle = store
        .get_user_handle(user_id)?
        .ok_or_else(|| InterchangeError::UnknownUser(user_id.to_string()))?;
    let page_size = options.page_size.max(1);
    info!("Exporting listening data of user {}", handle);

    let preferences = registry::without_cache_keys(&load_preferences(store, user_id)?);
    let theme = load_theme(store, user_id)?;
    let exported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    write!(sink, "{{\n  \"version\": ")?;
    serde_json::to_writer(&mut sink, CURRENT_VERSION).map_err(InterchangeError::Serialization)?;
    write!(sink, ",\n  \"exported_at\": ")?;
    serde_json::to_writer(&mut sink, &exported_at).map_err(InterchangeError::Serialization)?;
    write!(sink, ",\n  \"user\": ")?;
    serde_json::to_writer(&mut sink, &handle).map_err(InterchangeError::Serialization)?;
    write!(sink, ",\n  \"preferences\": ")?;
    serde_json::to_writer(&mut sink, &preferences).map_err(InterchangeError::Serialization)?;
    write!(sink, ",\n  \"theme\": ")?;
    serde_json::to_writer(&mut sink, &theme).map_err(InterchangeError::Serialization)?;
    write!(sink, ",\n  \"listens\": [")?;

    let mut stats = ExportStats::default();
    let mut cursor = ExportCursor::start();
    loop {
        if cancel.is_cancelled() {
            info!("Export of user {} cancelled after {} listens", handle, stats.listens);
            return Err(InterchangeError::Cancelled);
        }

        let page = store.get_export_page(user_id, cursor, page_size)?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = last.cursor();
        stats.pages += 1;
        debug!("Export page {} with {} listens", stats.pages, page.len());

        for item in page {
            if stats.listens > 0 {
                write!(sink, ",")?;
            }
            write!(sink, "\n    ")?;
            serde_json::to_writer(&mut sink, &to_record(item))
                .map_err(InterchangeError::Serialization)?;
            stats.listens += 1;
        }
    }

    if stats.listens > 0 {
        write!(sink, "\n  ")?;
    }
    write!(sink, "]\n}}\n")?;
    sink.flush()?;

    info!(
        "Exported {} listens of user {} in {} pages",
        stats.listens, handle, stats.pages
    );
    Ok(stats)
}
