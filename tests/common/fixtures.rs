//! Document and database fixtures

use super::constants::*;
use listen_tracker::library_store::{SqliteLibraryStore, UserStore};
use serde_json::{json, Value};
use tempfile::TempDir;

/// A library database in a temporary directory with the fixture users.
pub struct TestLibrary {
    pub dir: TempDir,
    pub store: SqliteLibraryStore,
    pub user_id: usize,
    pub target_user_id: usize,
}

impl TestLibrary {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(dir.path().join("library.db")).unwrap();
        let user_id = store.create_user(TEST_USER).unwrap();
        let target_user_id = store.create_user(TARGET_USER).unwrap();
        Self {
            dir,
            store,
            user_id,
            target_user_id,
        }
    }
}

fn aliases(name: &str) -> Value {
    json!([{ "alias": name, "source": "Canonical", "is_primary": true }])
}

/// A listen by the fixture artist on the fixture album.
pub fn listen_json(listened_at: &str, track_title: &str, image_url: &str) -> Value {
    json!({
        "listened_at": listened_at,
        "track": { "mbid": null, "duration": 300, "aliases": aliases(track_title) },
        "album": {
            "image_url": "",
            "mbid": null,
            "aliases": aliases(ALBUM_TITLE),
            "various_artists": false
        },
        "artists": [{
            "image_url": image_url,
            "mbid": ARTIST_MBID,
            "is_primary": true,
            "aliases": aliases(ARTIST_NAME)
        }]
    })
}

/// Sets the external ids of a listen's track and album.
pub fn with_mbids(mut listen: Value, track_mbid: Option<&str>, album_mbid: Option<&str>) -> Value {
    listen["track"]["mbid"] = json!(track_mbid);
    listen["album"]["mbid"] = json!(album_mbid);
    listen
}

/// A listen whose track and album are credited to `artists`, in order.
pub fn credited_listen(
    listened_at: &str,
    track_title: &str,
    album_title: &str,
    artists: &[&str],
) -> Value {
    let artists: Vec<Value> = artists
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "image_url": "",
                "mbid": null,
                "is_primary": i == 0,
                "aliases": aliases(name)
            })
        })
        .collect();
    json!({
        "listened_at": listened_at,
        "track": { "mbid": null, "duration": 240, "aliases": aliases(track_title) },
        "album": {
            "image_url": "",
            "mbid": null,
            "aliases": aliases(album_title),
            "various_artists": false
        },
        "artists": artists
    })
}

/// A version 2 document with the given listens and settings.
pub fn document_json(listens: Vec<Value>, preferences: Value, theme: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "version": "2",
        "exported_at": "2024-05-01T10:00:00Z",
        "user": TEST_USER,
        "preferences": preferences,
        "theme": theme,
        "listens": listens
    }))
    .unwrap()
}

/// The two listen scenario: one artist, two tracks. Only the first track
/// carries an external id.
pub fn two_listen_document() -> Vec<u8> {
    document_json(
        vec![
            with_mbids(
                listen_json("2024-01-01T12:00:00Z", TRACK_1_TITLE, ARTIST_IMAGE_URL),
                Some(TRACK_1_MBID),
                None,
            ),
            listen_json("2024-01-01T12:06:00Z", TRACK_2_TITLE, ARTIST_IMAGE_URL),
        ],
        json!({}),
        json!({}),
    )
}
