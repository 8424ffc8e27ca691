//! SQLite-backed library store.

use super::models::*;
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::trait_def::{EntityStore, ListenStore, UserBlobStore, UserStore};
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const ARTIST_COLUMNS: &str = "id, mbid, name, image, image_source";
const ALBUM_COLUMNS: &str = "id, mbid, title, various_artists, image, image_source";
const TRACK_COLUMNS: &str = "id, mbid, title, duration, album_id";

/// Library store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    /// Opens (or creates) the library database at `db_path`, bringing its
    /// schema to the latest version.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open library db at {:?}", db_path))?;
        let store = Self::from_connection(conn)?;
        info!("Opened library db at {:?}", db_path);
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        open_versioned(&mut conn, LIBRARY_VERSIONED_SCHEMAS, "library")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Library db connection mutex poisoned"))
    }
}

/// Runs `f` inside an immediate transaction, rolling back on error.
fn in_transaction<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])?;
    match f(conn) {
        Ok(value) => {
            conn.execute("COMMIT", [])?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        }
    }
}

fn uuid_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        mbid: uuid_column(row, 1)?,
        name: row.get(2)?,
        image: uuid_column(row, 3)?,
        image_source: row.get(4)?,
    })
}

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        mbid: uuid_column(row, 1)?,
        title: row.get(2)?,
        various_artists: row.get(3)?,
        image: uuid_column(row, 4)?,
        image_source: row.get(5)?,
        artist_ids: Vec::new(),
    })
}

fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        mbid: uuid_column(row, 1)?,
        title: row.get(2)?,
        duration: row.get(3)?,
        album_id: row.get(4)?,
        artist_ids: Vec::new(),
    })
}

fn insert_aliases(
    conn: &Connection,
    table: &str,
    owner_column: &str,
    owner_id: i64,
    aliases: &[Alias],
    source: Option<&str>,
) -> Result<()> {
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT OR IGNORE INTO {} ({}, alias, source, is_primary) VALUES (?1, ?2, ?3, ?4)",
        table, owner_column
    ))?;
    for alias in aliases {
        stmt.execute(params![
            owner_id,
            &alias.alias,
            source.unwrap_or(&alias.source),
            alias.primary
        ])
        .with_context(|| format!("Failed to insert alias '{}' into {}", alias.alias, table))?;
    }
    Ok(())
}

fn load_aliases(conn: &Connection, table: &str, owner_column: &str, owner_id: i64) -> Result<Vec<Alias>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT alias, source, is_primary FROM {} WHERE {} = ?1 ORDER BY is_primary DESC, rowid",
        table, owner_column
    ))?;
    let aliases = stmt
        .query_map(params![owner_id], |row| {
            Ok(Alias {
                alias: row.get(0)?,
                source: row.get(1)?,
                primary: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(aliases)
}

fn load_album_artist_ids(conn: &Connection, album_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT artist_id FROM album_artist WHERE album_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map(params![album_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn load_track_artist_ids(conn: &Connection, track_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT artist_id FROM track_artist WHERE track_id = ?1 ORDER BY position",
    )?;
    let ids = stmt
        .query_map(params![track_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn load_export_artists(conn: &Connection, track_id: i64) -> Result<Vec<ExportArtist>> {
    let mut stmt = conn.prepare_cached(
        "SELECT a.id, a.name, a.mbid, a.image_source, ta.is_primary
         FROM track_artist ta JOIN artist a ON a.id = ta.artist_id
         WHERE ta.track_id = ?1 ORDER BY ta.position",
    )?;
    let rows = stmt
        .query_map(params![track_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                uuid_column(row, 2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(artist_id, name, mbid, image_source, is_primary)| {
            Ok(ExportArtist {
                name,
                mbid,
                image_source,
                is_primary,
                aliases: load_aliases(conn, "artist_alias", "artist_id", artist_id)?,
            })
        })
        .collect()
}

/// One listen row of an export page, before its aliases and artists are
/// loaded.
struct ExportRow {
    /// Unix microseconds.
    listened_at: i64,
    track_id: i64,
    track_title: String,
    track_mbid: Option<Uuid>,
    duration: u32,
    album_id: i64,
    album_title: String,
    album_mbid: Option<Uuid>,
    album_image_source: Option<String>,
    various_artists: bool,
}

fn sorted_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

impl UserStore for SqliteLibraryStore {
    fn create_user(&self, user_handle: &str) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO user (handle) VALUES (?1)", params![user_handle])
            .with_context(|| format!("Failed to create user '{}'", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM user WHERE handle = ?1",
                params![user_handle],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        let conn = self.conn()?;
        let handle = conn
            .query_row(
                "SELECT handle FROM user WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(handle)
    }
}

impl EntityStore for SqliteLibraryStore {
    fn find_artist(&self, identity: &ArtistIdentity) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        let artist = match identity {
            ArtistIdentity::Mbid(mbid) => conn
                .prepare_cached(&format!("SELECT {} FROM artist WHERE mbid = ?1", ARTIST_COLUMNS))?
                .query_row(params![mbid.to_string()], artist_from_row)
                .optional()?,
            ArtistIdentity::Name(name) => conn
                .prepare_cached(&format!(
                    "SELECT {} FROM artist WHERE name = ?1 ORDER BY id LIMIT 1",
                    ARTIST_COLUMNS
                ))?
                .query_row(params![name], artist_from_row)
                .optional()?,
        };
        Ok(artist)
    }

    fn create_artist(&self, artist: &NewArtist) -> Result<Artist> {
        let conn = self.conn()?;
        let mbid = non_nil_mbid(artist.mbid);
        let id = in_transaction(&conn, |conn| {
            conn.execute(
                "INSERT INTO artist (mbid, name, image, image_source) VALUES (?1, ?2, ?3, ?4)",
                params![
                    mbid.map(|m| m.to_string()),
                    &artist.name,
                    artist.image.map(|i| i.to_string()),
                    &artist.image_source
                ],
            )
            .with_context(|| format!("Failed to insert artist '{}'", artist.name))?;
            let id = conn.last_insert_rowid();
            insert_aliases(conn, "artist_alias", "artist_id", id, &artist.aliases, None)?;
            Ok(id)
        })?;
        debug!("Created artist {} '{}'", id, artist.name);

        Ok(Artist {
            id,
            mbid,
            name: artist.name.clone(),
            image: artist.image,
            image_source: artist.image_source.clone(),
        })
    }

    fn find_album(&self, identity: &AlbumIdentity) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let album = match identity {
            AlbumIdentity::Mbid(mbid) => conn
                .prepare_cached(&format!("SELECT {} FROM album WHERE mbid = ?1", ALBUM_COLUMNS))?
                .query_row(params![mbid.to_string()], album_from_row)
                .optional()?,
            AlbumIdentity::TitleAndArtist { title, artist_id } => conn
                .prepare_cached(
                    "SELECT a.id, a.mbid, a.title, a.various_artists, a.image, a.image_source
                     FROM album a JOIN album_artist aa ON aa.album_id = a.id
                     WHERE a.title = ?1 AND aa.artist_id = ?2 AND aa.position = 0
                     ORDER BY a.id LIMIT 1",
                )?
                .query_row(params![title, artist_id], album_from_row)
                .optional()?,
        };

        match album {
            Some(mut album) => {
                album.artist_ids = load_album_artist_ids(&conn, album.id)?;
                Ok(Some(album))
            }
            None => Ok(None),
        }
    }

    fn create_album(&self, album: &NewAlbum) -> Result<Album> {
        let conn = self.conn()?;
        let mbid = non_nil_mbid(album.mbid);
        let id = in_transaction(&conn, |conn| {
            conn.execute(
                "INSERT INTO album (mbid, title, various_artists, image, image_source)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    mbid.map(|m| m.to_string()),
                    &album.title,
                    album.various_artists,
                    album.image.map(|i| i.to_string()),
                    &album.image_source
                ],
            )
            .with_context(|| format!("Failed to insert album '{}'", album.title))?;
            let id = conn.last_insert_rowid();

            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO album_artist (album_id, artist_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, artist_id) in album.artist_ids.iter().enumerate() {
                stmt.execute(params![id, artist_id, position as i64])?;
            }
            insert_aliases(conn, "album_alias", "album_id", id, &album.aliases, None)?;
            Ok(id)
        })?;
        debug!("Created album {} '{}'", id, album.title);

        Ok(Album {
            id,
            mbid,
            title: album.title.clone(),
            various_artists: album.various_artists,
            image: album.image,
            image_source: album.image_source.clone(),
            artist_ids: album.artist_ids.clone(),
        })
    }

    fn find_track(&self, identity: &TrackIdentity) -> Result<Option<Track>> {
        let conn = self.conn()?;
        match identity {
            TrackIdentity::Mbid(mbid) => {
                let track = conn
                    .prepare_cached(&format!("SELECT {} FROM track WHERE mbid = ?1", TRACK_COLUMNS))?
                    .query_row(params![mbid.to_string()], track_from_row)
                    .optional()?;
                match track {
                    Some(mut track) => {
                        track.artist_ids = load_track_artist_ids(&conn, track.id)?;
                        Ok(Some(track))
                    }
                    None => Ok(None),
                }
            }
            TrackIdentity::TitleAndArtists { title, artist_ids } => {
                let wanted = sorted_ids(artist_ids);
                let candidates = conn
                    .prepare_cached(&format!(
                        "SELECT {} FROM track WHERE title = ?1 ORDER BY id",
                        TRACK_COLUMNS
                    ))?
                    .query_map(params![title], track_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;

                for mut track in candidates {
                    track.artist_ids = load_track_artist_ids(&conn, track.id)?;
                    if sorted_ids(&track.artist_ids) == wanted {
                        return Ok(Some(track));
                    }
                }
                Ok(None)
            }
        }
    }

    fn create_track(&self, track: &NewTrack) -> Result<Track> {
        let conn = self.conn()?;
        let mbid = non_nil_mbid(track.mbid);
        let id = in_transaction(&conn, |conn| {
            conn.execute(
                "INSERT INTO track (mbid, title, duration, album_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    mbid.map(|m| m.to_string()),
                    &track.title,
                    track.duration,
                    track.album_id
                ],
            )
            .with_context(|| format!("Failed to insert track '{}'", track.title))?;
            let id = conn.last_insert_rowid();

            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO track_artist (track_id, artist_id, is_primary, position)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, artist) in track.artists.iter().enumerate() {
                stmt.execute(params![id, artist.artist_id, artist.is_primary, position as i64])?;
            }
            Ok(id)
        })?;
        debug!("Created track {} '{}'", id, track.title);

        Ok(Track {
            id,
            mbid,
            title: track.title.clone(),
            duration: track.duration,
            album_id: track.album_id,
            artist_ids: track.artists.iter().map(|a| a.artist_id).collect(),
        })
    }

    fn save_track_aliases(&self, track_id: i64, aliases: &[Alias], source: &str) -> Result<()> {
        let conn = self.conn()?;
        in_transaction(&conn, |conn| {
            insert_aliases(conn, "track_alias", "track_id", track_id, aliases, Some(source))
        })
    }

    fn get_counts(&self) -> Result<EntityCounts> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n as usize)
        };
        Ok(EntityCounts {
            artists: count("artist")?,
            albums: count("album")?,
            tracks: count("track")?,
            listens: count("listen")?,
        })
    }
}

impl ListenStore for SqliteLibraryStore {
    fn save_listen(&self, listen: &NewListen) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn
            .prepare_cached(
                "INSERT OR IGNORE INTO listen (user_id, track_id, listened_at, client)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                listen.user_id,
                listen.track_id,
                listen.listened_at.timestamp_micros(),
                &listen.client
            ])
            .with_context(|| {
                format!(
                    "Failed to save listen of track {} for user {}",
                    listen.track_id, listen.user_id
                )
            })?;
        Ok(inserted == 1)
    }

    fn get_export_page(
        &self,
        user_id: usize,
        after: ExportCursor,
        limit: usize,
    ) -> Result<Vec<ExportItem>> {
        let conn = self.conn()?;
        let rows = conn
            .prepare_cached(
                "SELECT l.listened_at, l.track_id, t.title, t.mbid, t.duration, t.album_id,
                        al.title, al.mbid, al.image_source, al.various_artists
                 FROM listen l
                 JOIN track t ON t.id = l.track_id
                 JOIN album al ON al.id = t.album_id
                 WHERE l.user_id = ?1
                   AND (l.listened_at > ?2 OR (l.listened_at = ?2 AND l.track_id > ?3))
                 ORDER BY l.listened_at, l.track_id
                 LIMIT ?4",
            )?
            .query_map(
                params![user_id, after.listened_at, after.track_id, limit as i64],
                |row| {
                    Ok(ExportRow {
                        listened_at: row.get(0)?,
                        track_id: row.get(1)?,
                        track_title: row.get(2)?,
                        track_mbid: uuid_column(row, 3)?,
                        duration: row.get(4)?,
                        album_id: row.get(5)?,
                        album_title: row.get(6)?,
                        album_mbid: uuid_column(row, 7)?,
                        album_image_source: row.get(8)?,
                        various_artists: row.get(9)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read listen page")?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let listened_at = DateTime::<Utc>::from_timestamp_micros(row.listened_at)
                .with_context(|| format!("Listen timestamp {} out of range", row.listened_at))?;
            items.push(ExportItem {
                listened_at,
                track_id: row.track_id,
                track_title: row.track_title,
                track_mbid: row.track_mbid,
                track_duration: row.duration,
                track_aliases: load_aliases(&conn, "track_alias", "track_id", row.track_id)?,
                album_title: row.album_title,
                album_mbid: row.album_mbid,
                album_image_source: row.album_image_source,
                various_artists: row.various_artists,
                album_aliases: load_aliases(&conn, "album_alias", "album_id", row.album_id)?,
                artists: load_export_artists(&conn, row.track_id)?,
            });
        }
        Ok(items)
    }

    fn count_listens(&self, user_id: usize) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM listen WHERE user_id = ?1",
            params![user_id],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

impl SqliteLibraryStore {
    fn get_blob(&self, table: &str, user_id: usize) -> Result<Option<String>> {
        let conn = self.conn()?;
        let data = conn
            .query_row(
                &format!("SELECT data FROM {} WHERE user_id = ?1", table),
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read {} of user {}", table, user_id))?;
        Ok(data)
    }

    fn save_blob(&self, table: &str, user_id: usize, data: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (user_id, data) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET
                    data = excluded.data,
                    updated = cast(strftime('%s','now') as int)",
                table
            ),
            params![user_id, data],
        )
        .with_context(|| format!("Failed to save {} of user {}", table, user_id))?;
        Ok(())
    }
}

impl UserBlobStore for SqliteLibraryStore {
    fn get_user_preferences(&self, user_id: usize) -> Result<Option<String>> {
        self.get_blob("user_preferences", user_id)
    }

    fn save_user_preferences(&self, user_id: usize, data: &str) -> Result<()> {
        self.save_blob("user_preferences", user_id, data)
    }

    fn get_user_theme(&self, user_id: usize) -> Result<Option<String>> {
        self.get_blob("user_theme", user_id)
    }

    fn save_user_theme(&self, user_id: usize, data: &str) -> Result<()> {
        self.save_blob("user_theme", user_id, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_tmp_store() -> (SqliteLibraryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("library.db");
        let store = SqliteLibraryStore::new(&db_path).unwrap();
        (store, temp_dir)
    }

    fn alias(name: &str) -> Vec<Alias> {
        vec![Alias::new(name, IMPORT_ALIAS_SOURCE, true)]
    }

    fn new_artist(store: &SqliteLibraryStore, name: &str, mbid: Option<Uuid>) -> Artist {
        store
            .create_artist(&NewArtist {
                mbid,
                name: name.to_string(),
                image: None,
                image_source: None,
                aliases: alias(name),
            })
            .unwrap()
    }

    fn new_album(store: &SqliteLibraryStore, title: &str, artist_ids: Vec<i64>) -> Album {
        store
            .create_album(&NewAlbum {
                mbid: None,
                title: title.to_string(),
                various_artists: false,
                image: None,
                image_source: Some("https://img.example/a.jpg".to_string()),
                artist_ids,
                aliases: alias(title),
            })
            .unwrap()
    }

    fn new_track(store: &SqliteLibraryStore, title: &str, album_id: i64, artist_ids: &[i64]) -> Track {
        let track = store
            .create_track(&NewTrack {
                mbid: None,
                title: title.to_string(),
                duration: 200,
                album_id,
                artists: artist_ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| TrackArtist {
                        artist_id: *id,
                        is_primary: i == 0,
                    })
                    .collect(),
            })
            .unwrap();
        store
            .save_track_aliases(track.id, &alias(title), IMPORT_ALIAS_SOURCE)
            .unwrap();
        track
    }

    fn listen(user_id: usize, track_id: i64, ts: i64) -> NewListen {
        NewListen {
            user_id,
            track_id,
            listened_at: Utc.timestamp_opt(ts, 0).unwrap(),
            client: None,
        }
    }

    #[test]
    fn creates_and_finds_users() {
        let (store, _temp_dir) = create_tmp_store();
        let id = store.create_user("alice").unwrap();

        assert_eq!(store.get_user_id("alice").unwrap(), Some(id));
        assert_eq!(store.get_user_handle(id).unwrap(), Some("alice".to_string()));
        assert_eq!(store.get_user_id("bob").unwrap(), None);
        assert!(store.create_user("alice").is_err());
    }

    #[test]
    fn reopening_validates_existing_schema() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("library.db");
        {
            let store = SqliteLibraryStore::new(&db_path).unwrap();
            store.create_user("alice").unwrap();
        }
        let store = SqliteLibraryStore::new(&db_path).unwrap();
        assert!(store.get_user_id("alice").unwrap().is_some());
    }

    #[test]
    fn finds_artist_by_mbid_or_name() {
        let (store, _temp_dir) = create_tmp_store();
        let mbid = Uuid::new_v4();
        let with_mbid = new_artist(&store, "Portishead", Some(mbid));
        let without = new_artist(&store, "Tricky", None);

        let found = store.find_artist(&ArtistIdentity::Mbid(mbid)).unwrap().unwrap();
        assert_eq!(found, with_mbid);
        let found = store.find_artist(&ArtistIdentity::Name("Tricky")).unwrap().unwrap();
        assert_eq!(found, without);
        assert!(store
            .find_artist(&ArtistIdentity::Mbid(Uuid::new_v4()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn nil_mbid_is_stored_as_absent() {
        let (store, _temp_dir) = create_tmp_store();
        let artist = new_artist(&store, "Nobody", Some(Uuid::nil()));
        assert_eq!(artist.mbid, None);
        let found = store.find_artist(&ArtistIdentity::Name("Nobody")).unwrap().unwrap();
        assert_eq!(found.mbid, None);
    }

    #[test]
    fn album_identity_includes_first_artist() {
        let (store, _temp_dir) = create_tmp_store();
        let a = new_artist(&store, "A", None);
        let b = new_artist(&store, "B", None);
        let album = new_album(&store, "Greatest Hits", vec![a.id, b.id]);

        let found = store
            .find_album(&AlbumIdentity::TitleAndArtist {
                title: "Greatest Hits",
                artist_id: a.id,
            })
            .unwrap()
            .unwrap();
        assert_eq!(found.id, album.id);
        assert_eq!(found.artist_ids, vec![a.id, b.id]);

        let c = new_artist(&store, "C", None);
        assert!(store
            .find_album(&AlbumIdentity::TitleAndArtist {
                title: "Greatest Hits",
                artist_id: c.id,
            })
            .unwrap()
            .is_none());
    }

    #[test]
    fn album_identity_ignores_later_artists() {
        let (store, _temp_dir) = create_tmp_store();
        let a = new_artist(&store, "A", None);
        let b = new_artist(&store, "B", None);
        new_album(&store, "Hits", vec![a.id, b.id]);

        assert!(store
            .find_album(&AlbumIdentity::TitleAndArtist {
                title: "Hits",
                artist_id: b.id,
            })
            .unwrap()
            .is_none());
    }

    #[test]
    fn track_identity_matches_whole_artist_set() {
        let (store, _temp_dir) = create_tmp_store();
        let a = new_artist(&store, "A", None);
        let b = new_artist(&store, "B", None);
        let album = new_album(&store, "Album", vec![a.id]);
        let duet = new_track(&store, "Song", album.id, &[a.id, b.id]);
        let solo = new_track(&store, "Song", album.id, &[a.id]);

        let found = store
            .find_track(&TrackIdentity::TitleAndArtists {
                title: "Song",
                artist_ids: &[b.id, a.id],
            })
            .unwrap()
            .unwrap();
        assert_eq!(found.id, duet.id);

        let found = store
            .find_track(&TrackIdentity::TitleAndArtists {
                title: "Song",
                artist_ids: &[a.id],
            })
            .unwrap()
            .unwrap();
        assert_eq!(found.id, solo.id);

        assert!(store
            .find_track(&TrackIdentity::TitleAndArtists {
                title: "Song",
                artist_ids: &[b.id],
            })
            .unwrap()
            .is_none());
    }

    #[test]
    fn duplicate_listen_is_ignored() {
        let (store, _temp_dir) = create_tmp_store();
        let user = store.create_user("alice").unwrap();
        let a = new_artist(&store, "A", None);
        let album = new_album(&store, "Album", vec![a.id]);
        let track = new_track(&store, "Song", album.id, &[a.id]);

        assert!(store.save_listen(&listen(user, track.id, 1000)).unwrap());
        assert!(!store.save_listen(&listen(user, track.id, 1000)).unwrap());
        assert!(store.save_listen(&listen(user, track.id, 1001)).unwrap());
        assert_eq!(store.count_listens(user).unwrap(), 2);
    }

    #[test]
    fn export_page_is_ordered_and_strictly_after_cursor() {
        let (store, _temp_dir) = create_tmp_store();
        let user = store.create_user("alice").unwrap();
        let other = store.create_user("bob").unwrap();
        let a = new_artist(&store, "A", None);
        let album = new_album(&store, "Album", vec![a.id]);
        let t1 = new_track(&store, "One", album.id, &[a.id]);
        let t2 = new_track(&store, "Two", album.id, &[a.id]);

        store.save_listen(&listen(user, t2.id, 500)).unwrap();
        store.save_listen(&listen(user, t1.id, 500)).unwrap();
        store.save_listen(&listen(user, t1.id, 100)).unwrap();
        store.save_listen(&listen(other, t1.id, 300)).unwrap();

        let page = store.get_export_page(user, ExportCursor::start(), 10).unwrap();
        let keys: Vec<_> = page.iter().map(|i| (i.listened_at.timestamp(), i.track_id)).collect();
        assert_eq!(keys, vec![(100, t1.id), (500, t1.id), (500, t2.id)]);

        let rest = store.get_export_page(user, page[1].cursor(), 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].track_id, t2.id);

        let item = &page[0];
        assert_eq!(item.track_duration, 200);
        assert_eq!(item.track_aliases[0].alias, "One");
        assert_eq!(item.album_aliases[0].alias, "Album");
        assert_eq!(
            item.album_image_source.as_deref(),
            Some("https://img.example/a.jpg")
        );
        assert_eq!(item.artists.len(), 1);
        assert!(item.artists[0].is_primary);
        assert_eq!(item.artists[0].aliases[0].alias, "A");
    }

    #[test]
    fn sub_second_listens_keep_their_time() {
        let (store, _temp_dir) = create_tmp_store();
        let user = store.create_user("alice").unwrap();
        let a = new_artist(&store, "A", None);
        let album = new_album(&store, "Album", vec![a.id]);
        let track = new_track(&store, "Song", album.id, &[a.id]);
        let second = Utc.timestamp_opt(1_704_067_200, 0).unwrap();
        let early = second + chrono::Duration::milliseconds(250);
        let late = second + chrono::Duration::milliseconds(750);

        for listened_at in [late, early] {
            assert!(store
                .save_listen(&NewListen {
                    user_id: user,
                    track_id: track.id,
                    listened_at,
                    client: None,
                })
                .unwrap());
        }

        let page = store.get_export_page(user, ExportCursor::start(), 10).unwrap();
        let times: Vec<_> = page.iter().map(|i| i.listened_at).collect();
        assert_eq!(times, vec![early, late]);

        let rest = store.get_export_page(user, page[0].cursor(), 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].listened_at, late);
    }

    #[test]
    fn export_page_carries_stored_names() {
        let (store, _temp_dir) = create_tmp_store();
        let user = store.create_user("alice").unwrap();
        let a = new_artist(&store, "A", None);
        let album = new_album(&store, "Album", vec![a.id]);
        let track = store
            .create_track(&NewTrack {
                mbid: None,
                title: "Unaliased".to_string(),
                duration: 10,
                album_id: album.id,
                artists: vec![TrackArtist {
                    artist_id: a.id,
                    is_primary: true,
                }],
            })
            .unwrap();
        store.save_listen(&listen(user, track.id, 100)).unwrap();

        let page = store.get_export_page(user, ExportCursor::start(), 10).unwrap();
        assert_eq!(page[0].track_title, "Unaliased");
        assert!(page[0].track_aliases.is_empty());
        assert_eq!(page[0].album_title, "Album");
        assert_eq!(page[0].artists[0].name, "A");
    }

    #[test]
    fn blobs_are_upserted() {
        let (store, _temp_dir) = create_tmp_store();
        let user = store.create_user("alice").unwrap();

        assert_eq!(store.get_user_preferences(user).unwrap(), None);
        store.save_user_preferences(user, r#"{"a":1}"#).unwrap();
        store.save_user_preferences(user, r#"{"a":2}"#).unwrap();
        assert_eq!(
            store.get_user_preferences(user).unwrap().as_deref(),
            Some(r#"{"a":2}"#)
        );

        store.save_user_theme(user, r#"{"accent":"red"}"#).unwrap();
        assert_eq!(
            store.get_user_theme(user).unwrap().as_deref(),
            Some(r#"{"accent":"red"}"#)
        );
    }

    #[test]
    fn counts_entities() {
        let (store, _temp_dir) = create_tmp_store();
        let a = new_artist(&store, "A", None);
        let album = new_album(&store, "Album", vec![a.id]);
        new_track(&store, "Song", album.id, &[a.id]);

        let counts = store.get_counts().unwrap();
        assert_eq!(
            counts,
            EntityCounts {
                artists: 1,
                albums: 1,
                tracks: 1,
                listens: 0
            }
        );
    }
}
