//! SQLite schema for the library database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const USER_ID_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: USER_TABLE_V_0.name,
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARTIST_ID_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: ARTIST_TABLE_V_0.name,
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ALBUM_ID_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: ALBUM_TABLE_V_0.name,
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const TRACK_ID_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: TRACK_TABLE_V_0.name,
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

pub const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const ARTIST_TABLE_V_0: Table = Table {
    name: "artist",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("mbid", &SqlType::Text, is_unique = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("image", &SqlType::Text),
        sqlite_column!("image_source", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_artist_name", "name")],
    unique_constraints: &[],
};

pub const ARTIST_ALIAS_TABLE_V_0: Table = Table {
    name: "artist_alias",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_ID_FOREIGN_KEY)
        ),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["artist_id", "alias"]],
};

pub const ALBUM_TABLE_V_0: Table = Table {
    name: "album",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("mbid", &SqlType::Text, is_unique = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "various_artists",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("image", &SqlType::Text),
        sqlite_column!("image_source", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_album_title", "title")],
    unique_constraints: &[],
};

pub const ALBUM_ALIAS_TABLE_V_0: Table = Table {
    name: "album_alias",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_ID_FOREIGN_KEY)
        ),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["album_id", "alias"]],
};

pub const ALBUM_ARTIST_TABLE_V_0: Table = Table {
    name: "album_artist",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_ID_FOREIGN_KEY)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_artist_artist", "artist_id")],
    unique_constraints: &[&["album_id", "artist_id"]],
};

pub const TRACK_TABLE_V_0: Table = Table {
    name: "track",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("mbid", &SqlType::Text, is_unique = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "duration",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_track_title", "title")],
    unique_constraints: &[],
};

pub const TRACK_ALIAS_TABLE_V_0: Table = Table {
    name: "track_alias",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_ID_FOREIGN_KEY)
        ),
        sqlite_column!("alias", &SqlType::Text, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["track_id", "alias"]],
};

pub const TRACK_ARTIST_TABLE_V_0: Table = Table {
    name: "track_artist",
    columns: &[
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "is_primary",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_track_artist_artist", "artist_id")],
    unique_constraints: &[&["track_id", "artist_id"]],
};

/// Listens are append-only. `listened_at` is in unix microseconds. The
/// (user_id, track_id, listened_at) constraint makes a repeated insert of the
/// same listen a no-op.
pub const LISTEN_TABLE_V_0: Table = Table {
    name: "listen",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&USER_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_ID_FOREIGN_KEY)
        ),
        sqlite_column!("listened_at", &SqlType::Integer, non_null = true),
        sqlite_column!("client", &SqlType::Text),
    ],
    indices: &[("idx_listen_user_time", "user_id, listened_at, track_id")],
    unique_constraints: &[&["user_id", "track_id", "listened_at"]],
};

pub const USER_PREFERENCES_TABLE_V_0: Table = Table {
    name: "user_preferences",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            is_primary_key = true,
            foreign_key = Some(&USER_ID_FOREIGN_KEY)
        ),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const USER_THEME_TABLE_V_0: Table = Table {
    name: "user_theme",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            is_primary_key = true,
            foreign_key = Some(&USER_ID_FOREIGN_KEY)
        ),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        USER_TABLE_V_0,
        ARTIST_TABLE_V_0,
        ARTIST_ALIAS_TABLE_V_0,
        ALBUM_TABLE_V_0,
        ALBUM_ALIAS_TABLE_V_0,
        ALBUM_ARTIST_TABLE_V_0,
        TRACK_TABLE_V_0,
        TRACK_ALIAS_TABLE_V_0,
        TRACK_ARTIST_TABLE_V_0,
        LISTEN_TABLE_V_0,
        USER_PREFERENCES_TABLE_V_0,
        USER_THEME_TABLE_V_0,
    ],
    migration: None,
}];
