//! Listen tracker library
//!
//! Persistence for the listening library plus the export/import machinery
//! that moves a user's history and settings in and out of it.

pub mod config;
pub mod enrichment;
pub mod interchange;
pub mod library_store;
pub mod preferences;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use interchange::{
    export_user_data, import_upload, EntityResolver, ImportQueue, InterchangeDocument,
    InterchangeError, RestorePolicy,
};
pub use library_store::{LibraryStore, SqliteLibraryStore};
