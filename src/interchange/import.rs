//! Maps an interchange document back onto the library.
//!
//! Every listen is resolved artists first, then album, then track, each with
//! get-or-create semantics on the entity's identity key. Existing entities
//! are never modified. Listens are always handed to the store, which ignores
//! exact duplicates, so importing the same document twice is harmless.

use super::document::{display_name, AlbumRecord, ArtistRecord, InterchangeDocument, ListenRecord};
use super::error::{InterchangeError, InterchangeResult};
use crate::library_store::{
    AlbumIdentity, Alias, ArtistIdentity, LibraryStore, NewAlbum, NewArtist, NewListen, NewTrack,
    TrackArtist, TrackIdentity, UserBlobStore, IMPORT_ALIAS_SOURCE,
};
use crate::preferences::{load_preferences, registry, store_preferences};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// How the settings embedded in a document are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePolicy {
    /// Stored preferences are replaced by the imported ones.
    Overwrite,
    /// Imported preferences are merged into the stored ones.
    Merge,
    /// Settings are left alone.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOwner {
    Artist(i64),
    Album(i64),
}

/// An image reference assigned to a new entity, waiting for its bytes to be
/// fetched from `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFetchRequest {
    pub owner: ImageOwner,
    pub image: Uuid,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub listens_processed: usize,
    pub listens_inserted: usize,
    /// Listens the store already had.
    pub listens_duplicate: usize,
    pub artists_created: usize,
    pub albums_created: usize,
    pub tracks_created: usize,
    pub image_fetch_requests: Vec<ImageFetchRequest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsRestore {
    pub preferences: bool,
    pub theme: bool,
}

/// Only remote URLs get an image reference; anything else is kept as the
/// source but nothing will be fetched.
fn image_for(source: &str) -> Option<Uuid> {
    source.starts_with("http").then(Uuid::new_v4)
}

fn non_empty(source: &str) -> Option<String> {
    let source = source.trim();
    (!source.is_empty()).then(|| source.to_string())
}

/// Copies the aliases of a record, tagging them as imported. The first alias
/// is flagged primary when the record flags none.
fn imported_aliases(aliases: &[Alias]) -> Vec<Alias> {
    let has_primary = aliases.iter().any(|a| a.primary);
    aliases
        .iter()
        .filter(|a| !a.alias.trim().is_empty())
        .enumerate()
        .map(|(i, a)| {
            let primary = a.primary || (!has_primary && i == 0);
            Alias::new(a.alias.clone(), IMPORT_ALIAS_SOURCE, primary)
        })
        .collect()
}

fn record_name(aliases: &[Alias]) -> InterchangeResult<String> {
    display_name(aliases)
        .map(str::to_string)
        .ok_or_else(|| InterchangeError::InvalidDocument("entity without a name".to_string()))
}

pub struct EntityResolver<'a, S: LibraryStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: LibraryStore + ?Sized> EntityResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Imports every listen of `document` for `user_id`.
    ///
    /// The document is validated first; nothing is written if it is invalid.
    /// Any store error aborts the import, leaving what was already created in
    /// place.
    pub fn import_listens(
        &self,
        document: &InterchangeDocument,
        user_id: usize,
        cancel: &CancellationToken,
    ) -> InterchangeResult<ImportReport> {
        document.validate()?;
        info!(
            "Importing {} listens (document version {}) for user {}",
            document.listen_count(),
            document.version,
            user_id
        );

        let mut report = ImportReport::default();
        for listen in &document.listens {
            if cancel.is_cancelled() {
                info!(
                    "Import cancelled after {} of {} listens",
                    report.listens_processed,
                    document.listen_count()
                );
                return Err(InterchangeError::Cancelled);
            }
            self.import_listen(listen, user_id, &mut report)?;
            report.listens_processed += 1;
        }

        info!(
            "Imported {} listens ({} new, {} already present); created {} artists, {} albums, {} tracks",
            report.listens_processed,
            report.listens_inserted,
            report.listens_duplicate,
            report.artists_created,
            report.albums_created,
            report.tracks_created
        );
        Ok(report)
    }

    fn import_listen(
        &self,
        listen: &ListenRecord,
        user_id: usize,
        report: &mut ImportReport,
    ) -> InterchangeResult<()> {
        let artist_ids = listen
            .artists
            .iter()
            .map(|artist| self.resolve_artist(artist, report))
            .collect::<InterchangeResult<Vec<i64>>>()?;
        let album_id = self.resolve_album(&listen.album, &artist_ids, report)?;
        let track_id = self.resolve_track(listen, album_id, &artist_ids, report)?;

        let inserted = self.store.save_listen(&NewListen {
            user_id,
            track_id,
            listened_at: listen.listened_at,
            client: None,
        })?;
        if inserted {
            report.listens_inserted += 1;
        } else {
            report.listens_duplicate += 1;
        }
        Ok(())
    }

    fn resolve_artist(&self, record: &ArtistRecord, report: &mut ImportReport) -> InterchangeResult<i64> {
        let name = record_name(&record.aliases)?;
        if let Some(existing) = self
            .store
            .find_artist(&ArtistIdentity::new(record.mbid, &name))?
        {
            return Ok(existing.id);
        }

        let image = image_for(&record.image_url);
        let artist = self.store.create_artist(&NewArtist {
            mbid: record.mbid,
            name,
            image,
            image_source: non_empty(&record.image_url),
            aliases: imported_aliases(&record.aliases),
        })?;
        report.artists_created += 1;
        if let Some(image) = image {
            report.image_fetch_requests.push(ImageFetchRequest {
                owner: ImageOwner::Artist(artist.id),
                image,
                source: record.image_url.clone(),
            });
        }
        Ok(artist.id)
    }

    fn resolve_album(
        &self,
        record: &AlbumRecord,
        artist_ids: &[i64],
        report: &mut ImportReport,
    ) -> InterchangeResult<i64> {
        let title = record_name(&record.aliases)?;
        let first_artist = *artist_ids
            .first()
            .ok_or_else(|| InterchangeError::InvalidDocument("album without artists".to_string()))?;
        if let Some(existing) = self
            .store
            .find_album(&AlbumIdentity::new(record.mbid, &title, first_artist))?
        {
            return Ok(existing.id);
        }

        let image = image_for(&record.image_url);
        let album = self.store.create_album(&NewAlbum {
            mbid: record.mbid,
            title,
            various_artists: record.various_artists,
            image,
            image_source: non_empty(&record.image_url),
            artist_ids: artist_ids.to_vec(),
            aliases: imported_aliases(&record.aliases),
        })?;
        report.albums_created += 1;
        if let Some(image) = image {
            report.image_fetch_requests.push(ImageFetchRequest {
                owner: ImageOwner::Album(album.id),
                image,
                source: record.image_url.clone(),
            });
        }
        Ok(album.id)
    }

    fn resolve_track(
        &self,
        listen: &ListenRecord,
        album_id: i64,
        artist_ids: &[i64],
        report: &mut ImportReport,
    ) -> InterchangeResult<i64> {
        let record = &listen.track;
        let title = record_name(&record.aliases)?;
        if let Some(existing) = self
            .store
            .find_track(&TrackIdentity::new(record.mbid, &title, artist_ids))?
        {
            return Ok(existing.id);
        }

        let any_primary = listen.artists.iter().any(|a| a.is_primary);
        let artists = listen
            .artists
            .iter()
            .zip(artist_ids)
            .enumerate()
            .map(|(i, (artist, &artist_id))| TrackArtist {
                artist_id,
                is_primary: artist.is_primary || (!any_primary && i == 0),
            })
            .collect();

        let track = self.store.create_track(&NewTrack {
            mbid: record.mbid,
            title,
            duration: record.duration,
            album_id,
            artists,
        })?;
        self.store
            .save_track_aliases(track.id, &imported_aliases(&record.aliases), IMPORT_ALIAS_SOURCE)?;
        report.tracks_created += 1;
        Ok(track.id)
    }
}

/// Applies the preferences and theme carried by a version 2 document.
/// Version 1 documents carry no settings and are left alone.
///
/// Cache entries inside the imported preferences are always dropped: cached
/// AI output only enters the bag through the cache write path.
pub fn restore_settings<S: UserBlobStore + ?Sized>(
    store: &S,
    document: &InterchangeDocument,
    user_id: usize,
    policy: RestorePolicy,
) -> InterchangeResult<SettingsRestore> {
    let mut restored = SettingsRestore::default();
    if policy == RestorePolicy::Skip || document.is_legacy() {
        return Ok(restored);
    }

    let imported = document
        .preferences
        .as_ref()
        .map(registry::without_cache_keys)
        .unwrap_or_default();
    if !imported.is_empty() {
        let preferences = match policy {
            RestorePolicy::Merge => {
                let mut stored: Map<String, Value> = load_preferences(store, user_id)?;
                stored.extend(imported);
                stored
            }
            _ => imported,
        };
        store_preferences(store, user_id, &preferences)?;
        info!("Restored preferences of user {} ({:?})", user_id, policy);
        restored.preferences = true;
    }

    match &document.theme {
        Some(Value::Object(theme)) if theme.is_empty() => {}
        Some(theme) => {
            let data = serde_json::to_string(theme).map_err(InterchangeError::Serialization)?;
            store.save_user_theme(user_id, &data)?;
            info!("Restored theme of user {}", user_id);
            restored.theme = true;
        }
        None => {}
    }

    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interchange::document::TrackRecord;
    use crate::library_store::{EntityStore, ExportCursor, ListenStore, SqliteLibraryStore, UserStore};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn aliases(name: &str) -> Vec<Alias> {
        vec![Alias::new(name, "", true)]
    }

    fn artist(name: &str, mbid: Option<Uuid>, image_url: &str) -> ArtistRecord {
        ArtistRecord {
            image_url: image_url.to_string(),
            mbid,
            is_primary: false,
            aliases: aliases(name),
        }
    }

    fn listen(ts: i64, track: &str, album: &str, artists: Vec<ArtistRecord>) -> ListenRecord {
        ListenRecord {
            listened_at: Utc.timestamp_opt(ts, 0).unwrap(),
            track: TrackRecord {
                mbid: None,
                duration: 240,
                aliases: aliases(track),
            },
            album: AlbumRecord {
                image_url: "https://covers.example/album.jpg".to_string(),
                mbid: None,
                aliases: aliases(album),
                various_artists: false,
            },
            artists,
        }
    }

    fn document(version: &str, listens: Vec<ListenRecord>) -> InterchangeDocument {
        InterchangeDocument {
            version: version.to_string(),
            exported_at: None,
            user: "alice".to_string(),
            preferences: None,
            theme: None,
            listens,
        }
    }

    fn store_with_user() -> (SqliteLibraryStore, usize) {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let user = store.create_user("alice").unwrap();
        (store, user)
    }

    #[test]
    fn two_listens_share_artist_and_album() {
        let (store, user) = store_with_user();
        let doc = document(
            "1",
            vec![
                listen(100, "First", "Album", vec![artist("Band", None, "")]),
                listen(200, "Second", "Album", vec![artist("Band", None, "")]),
            ],
        );

        let report = EntityResolver::new(&store)
            .import_listens(&doc, user, &CancellationToken::new())
            .unwrap();

        assert_eq!(report.listens_processed, 2);
        assert_eq!(report.listens_inserted, 2);
        assert_eq!(report.artists_created, 1);
        assert_eq!(report.albums_created, 1);
        assert_eq!(report.tracks_created, 2);

        let band = store.find_artist(&ArtistIdentity::Name("Band")).unwrap().unwrap();
        let second = store
            .find_track(&TrackIdentity::TitleAndArtists {
                title: "Second",
                artist_ids: &[band.id],
            })
            .unwrap();
        assert!(second.is_some());
        assert_eq!(store.count_listens(user).unwrap(), 2);
    }

    #[test]
    fn reimport_creates_nothing_new() {
        let (store, user) = store_with_user();
        let mbid = Uuid::new_v4();
        let doc = document(
            "2",
            vec![
                listen(100, "Song", "Album", vec![artist("A", Some(mbid), ""), artist("B", None, "")]),
                listen(100, "Song", "Album", vec![artist("A", Some(mbid), ""), artist("B", None, "")]),
            ],
        );
        let resolver = EntityResolver::new(&store);
        let cancel = CancellationToken::new();

        let first = resolver.import_listens(&doc, user, &cancel).unwrap();
        assert_eq!(first.listens_inserted, 1);
        assert_eq!(first.listens_duplicate, 1);

        let counts = store.get_counts().unwrap();
        let second = resolver.import_listens(&doc, user, &cancel).unwrap();
        assert_eq!(second.artists_created + second.albums_created + second.tracks_created, 0);
        assert_eq!(second.listens_inserted, 0);
        assert_eq!(store.get_counts().unwrap(), counts);
    }

    #[test]
    fn image_reference_only_for_remote_urls() {
        let (store, user) = store_with_user();
        let doc = document(
            "2",
            vec![listen(
                1,
                "Song",
                "Album",
                vec![
                    artist("Remote", None, "http://img.example/a.png"),
                    artist("Local", None, "/var/images/b.png"),
                ],
            )],
        );
        let report = EntityResolver::new(&store)
            .import_listens(&doc, user, &CancellationToken::new())
            .unwrap();

        let remote = store.find_artist(&ArtistIdentity::Name("Remote")).unwrap().unwrap();
        let local = store.find_artist(&ArtistIdentity::Name("Local")).unwrap().unwrap();
        assert!(remote.image.is_some());
        assert!(local.image.is_none());
        assert_eq!(local.image_source.as_deref(), Some("/var/images/b.png"));

        let owners: Vec<_> = report.image_fetch_requests.iter().map(|r| r.owner).collect();
        assert_eq!(owners.len(), 2);
        assert!(owners.contains(&ImageOwner::Artist(remote.id)));
        assert!(owners.iter().any(|o| matches!(o, ImageOwner::Album(_))));
    }

    #[test]
    fn first_artist_is_primary_when_none_flagged() {
        let (store, user) = store_with_user();
        let doc = document(
            "1",
            vec![listen(1, "Duet", "Album", vec![artist("A", None, ""), artist("B", None, "")])],
        );
        EntityResolver::new(&store)
            .import_listens(&doc, user, &CancellationToken::new())
            .unwrap();

        let page = store
            .get_export_page(user, ExportCursor::start(), 10)
            .unwrap();
        let flags: Vec<_> = page[0].artists.iter().map(|a| a.is_primary).collect();
        assert_eq!(flags, vec![true, false]);
        assert_eq!(page[0].track_aliases[0].source, IMPORT_ALIAS_SOURCE);
    }

    #[test]
    fn invalid_document_writes_nothing() {
        let (store, user) = store_with_user();
        let doc = document(
            "2",
            vec![
                listen(1, "Fine", "Album", vec![artist("A", None, "")]),
                listen(2, "Orphan", "Album", vec![]),
            ],
        );
        let err = EntityResolver::new(&store)
            .import_listens(&doc, user, &CancellationToken::new())
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.get_counts().unwrap().artists, 0);
    }

    #[test]
    fn unsupported_version_writes_nothing() {
        let (store, user) = store_with_user();
        let doc = document("7", vec![listen(1, "Song", "Album", vec![artist("A", None, "")])]);
        let err = EntityResolver::new(&store)
            .import_listens(&doc, user, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, InterchangeError::UnsupportedVersion(_)));
        assert_eq!(store.get_counts().unwrap().artists, 0);
    }

    #[test]
    fn cancellation_stops_between_listens() {
        let (store, user) = store_with_user();
        let doc = document("1", vec![listen(1, "Song", "Album", vec![artist("A", None, "")])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = EntityResolver::new(&store).import_listens(&doc, user, &cancel);
        assert!(matches!(result, Err(InterchangeError::Cancelled)));
        assert_eq!(store.count_listens(user).unwrap(), 0);
    }

    fn settings_document(preferences: Value, theme: Option<Value>) -> InterchangeDocument {
        let mut doc = document("2", vec![]);
        doc.preferences = preferences.as_object().cloned();
        doc.theme = theme;
        doc
    }

    #[test]
    fn overwrite_replaces_and_merge_preserves() {
        let (store, user) = store_with_user();
        store
            .save_user_preferences(user, r#"{"language":"en","volume":3}"#)
            .unwrap();
        let doc = settings_document(json!({ "language": "it" }), None);

        let restored = restore_settings(&store, &doc, user, RestorePolicy::Merge).unwrap();
        assert!(restored.preferences);
        assert_eq!(
            Value::Object(load_preferences(&store, user).unwrap()),
            json!({ "language": "it", "volume": 3 })
        );

        restore_settings(&store, &doc, user, RestorePolicy::Overwrite).unwrap();
        assert_eq!(
            Value::Object(load_preferences(&store, user).unwrap()),
            json!({ "language": "it" })
        );
    }

    #[test]
    fn imported_cache_keys_are_dropped() {
        let (store, user) = store_with_user();
        let doc = settings_document(
            json!({ "language": "it", "comet_ai_track_1": "stale", "ai_playlists_cache": [] }),
            None,
        );
        for policy in [RestorePolicy::Overwrite, RestorePolicy::Merge] {
            restore_settings(&store, &doc, user, policy).unwrap();
            let prefs = load_preferences(&store, user).unwrap();
            assert!(!prefs.keys().any(|k| registry::is_cache_key(k)));
        }
    }

    #[test]
    fn theme_is_restored_only_when_meaningful() {
        let (store, user) = store_with_user();

        let doc = settings_document(json!({}), Some(json!({})));
        let restored = restore_settings(&store, &doc, user, RestorePolicy::Overwrite).unwrap();
        assert_eq!(restored, SettingsRestore::default());
        assert_eq!(store.get_user_theme(user).unwrap(), None);

        let doc = settings_document(json!({}), Some(json!({ "accent": "#ff0000" })));
        let restored = restore_settings(&store, &doc, user, RestorePolicy::Overwrite).unwrap();
        assert!(restored.theme && !restored.preferences);
        assert!(store.get_user_theme(user).unwrap().is_some());
    }

    #[test]
    fn skip_and_legacy_leave_settings_alone() {
        let (store, user) = store_with_user();
        let doc = settings_document(json!({ "language": "it" }), Some(json!({ "a": 1 })));
        let restored = restore_settings(&store, &doc, user, RestorePolicy::Skip).unwrap();
        assert_eq!(restored, SettingsRestore::default());

        let mut legacy = doc.clone();
        legacy.version = "1".to_string();
        let restored = restore_settings(&store, &legacy, user, RestorePolicy::Overwrite).unwrap();
        assert_eq!(restored, SettingsRestore::default());
        assert_eq!(store.get_user_preferences(user).unwrap(), None);
    }
}
