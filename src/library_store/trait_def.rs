use super::models::{
    Album, AlbumIdentity, Alias, Artist, ArtistIdentity, EntityCounts, ExportCursor, ExportItem,
    NewAlbum, NewArtist, NewListen, NewTrack, Track, TrackIdentity,
};
use anyhow::Result;

pub trait UserStore: Send + Sync {
    /// Creates a new user and returns the user id.
    /// Returns Err if the handle is already taken.
    fn create_user(&self, user_handle: &str) -> Result<usize>;

    /// Returns the user id for the given handle.
    /// Returns Ok(None) if the user does not exist.
    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>>;

    /// Returns the handle of the given user.
    /// Returns Ok(None) if the user does not exist.
    fn get_user_handle(&self, user_id: usize) -> Result<Option<String>>;
}

pub trait EntityStore: Send + Sync {
    /// Returns the artist matching the identity key.
    /// Returns Ok(None) if there is no such artist.
    fn find_artist(&self, identity: &ArtistIdentity) -> Result<Option<Artist>>;

    /// Creates an artist together with its aliases.
    fn create_artist(&self, artist: &NewArtist) -> Result<Artist>;

    /// Returns the album matching the identity key.
    /// Returns Ok(None) if there is no such album.
    fn find_album(&self, identity: &AlbumIdentity) -> Result<Option<Album>>;

    /// Creates an album together with its aliases and artist associations.
    fn create_album(&self, album: &NewAlbum) -> Result<Album>;

    /// Returns the track matching the identity key.
    /// Returns Ok(None) if there is no such track.
    fn find_track(&self, identity: &TrackIdentity) -> Result<Option<Track>>;

    /// Creates a track and its artist associations. Aliases are saved
    /// separately with `save_track_aliases`.
    fn create_track(&self, track: &NewTrack) -> Result<Track>;

    /// Adds aliases to an existing track, tagging them with `source`.
    /// Aliases the track already has are left untouched.
    fn save_track_aliases(&self, track_id: i64, aliases: &[Alias], source: &str) -> Result<()>;

    fn get_counts(&self) -> Result<EntityCounts>;
}

pub trait ListenStore: Send + Sync {
    /// Records a listen.
    /// Returns Ok(false) if the exact same listen (user, track, timestamp)
    /// already exists, in which case nothing is written.
    fn save_listen(&self, listen: &NewListen) -> Result<bool>;

    /// Returns up to `limit` listens of the user strictly after `after`,
    /// ordered by (timestamp, track id) ascending.
    fn get_export_page(
        &self,
        user_id: usize,
        after: ExportCursor,
        limit: usize,
    ) -> Result<Vec<ExportItem>>;

    fn count_listens(&self, user_id: usize) -> Result<usize>;
}

/// Opaque per-user JSON blobs. The store never interprets their content.
pub trait UserBlobStore: Send + Sync {
    /// Returns Ok(None) if the user never saved preferences.
    fn get_user_preferences(&self, user_id: usize) -> Result<Option<String>>;

    fn save_user_preferences(&self, user_id: usize, data: &str) -> Result<()>;

    /// Returns Ok(None) if the user never saved a theme.
    fn get_user_theme(&self, user_id: usize) -> Result<Option<String>>;

    fn save_user_theme(&self, user_id: usize, data: &str) -> Result<()>;
}

pub trait LibraryStore: UserStore + EntityStore + ListenStore + UserBlobStore {}

impl<T> LibraryStore for T where T: UserStore + EntityStore + ListenStore + UserBlobStore {}
