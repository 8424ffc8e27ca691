//! Shared constants for integration tests

/// Handle of the user that owns the fixture listens
pub const TEST_USER: &str = "listener";

/// Handle of the user that fresh imports go to
pub const TARGET_USER: &str = "restorer";

pub const ARTIST_MBID: &str = "0383dadf-2a4e-4d10-a46a-e9e041da8eb3";
pub const ARTIST_NAME: &str = "Queen";
pub const ARTIST_IMAGE_URL: &str = "https://images.example.org/queen.jpg";

pub const ALBUM_TITLE: &str = "A Night at the Opera";

pub const ALBUM_MBID: &str = "6defd963-fe91-4550-b18e-82c685603c2b";

pub const TRACK_1_TITLE: &str = "Bohemian Rhapsody";
pub const TRACK_1_MBID: &str = "ebf79ba5-085e-48d2-9eb8-2d992fbf0f6d";
pub const TRACK_2_TITLE: &str = "Love of My Life";
