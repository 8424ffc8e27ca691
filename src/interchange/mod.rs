//! Export and import of a user's listening history and settings.

mod document;
mod error;
mod export;
mod import;
mod queue;
mod upload;

pub use document::{
    check_version, display_name, AlbumRecord, ArtistRecord, InterchangeDocument, ListenRecord,
    TrackRecord, CURRENT_VERSION, VERSION_1, VERSION_2,
};
pub use error::{InterchangeError, InterchangeResult};
pub use export::{export_user_data, ExportOptions, ExportStats, DEFAULT_EXPORT_PAGE_SIZE};
pub use import::{
    restore_settings, EntityResolver, ImageFetchRequest, ImageOwner, ImportReport, RestorePolicy,
    SettingsRestore,
};
pub use queue::{
    import_document_file, FileImport, ImportQueue, QueueRun, COMPLETED_DIR, WEB_IMPORT_PREFIX,
};
pub use upload::{import_upload, UploadOptions, UploadSummary, DEFAULT_SYNC_IMPORT_MAX_LISTENS};
