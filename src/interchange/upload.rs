//! Interactive upload of an interchange document.

use super::document::InterchangeDocument;
use super::error::InterchangeResult;
use super::import::{restore_settings, EntityResolver, RestorePolicy};
use super::queue::ImportQueue;
use crate::library_store::LibraryStore;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_SYNC_IMPORT_MAX_LISTENS: usize = 5000;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Uploads with more listens than this are queued instead of imported
    /// right away.
    pub sync_import_max_listens: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            sync_import_max_listens: DEFAULT_SYNC_IMPORT_MAX_LISTENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub version: String,
    pub prefs_restored: bool,
    pub theme_restored: bool,
    pub listens_imported: usize,
    pub listens_pending: usize,
    pub message: String,
}

fn summary_message(
    legacy: bool,
    prefs_restored: bool,
    theme_restored: bool,
    listens_imported: usize,
    listens_pending: usize,
) -> String {
    if legacy {
        return match (listens_imported, listens_pending) {
            (0, 0) => "Legacy export (v1) detected but no listens were found.".to_string(),
            (imported, 0) => format!("Legacy export (v1) received! {} listens imported.", imported),
            (_, pending) => format!(
                "Legacy export (v1) received! {} listens will be imported on the next queue run.",
                pending
            ),
        };
    }

    let mut parts = Vec::new();
    if prefs_restored {
        parts.push("settings".to_string());
    }
    if theme_restored {
        parts.push("theme".to_string());
    }
    if listens_imported > 0 {
        parts.push(format!("{} listens", listens_imported));
    }
    if listens_pending > 0 {
        parts.push(format!("{} listens (pending)", listens_pending));
    }

    if parts.is_empty() {
        "Import completed, but no data was found to restore.".to_string()
    } else {
        format!("Successfully processed: {}", parts.join(", "))
    }
}

/// Handles a document uploaded by a user.
///
/// The payload is decoded and checked before anything is written. Settings
/// are merged into the stored ones; listens are imported right away when
/// there are few enough of them, otherwise the raw payload is queued.
pub fn import_upload<S: LibraryStore + ?Sized>(
    store: &S,
    queue: &ImportQueue,
    user_id: usize,
    payload: &[u8],
    options: &UploadOptions,
    cancel: &CancellationToken,
) -> InterchangeResult<UploadSummary> {
    let document = InterchangeDocument::from_slice(payload)?;
    info!(
        "Received upload of version {} with {} listens for user {}",
        document.version,
        document.listen_count(),
        user_id
    );

    let settings = restore_settings(store, &document, user_id, RestorePolicy::Merge)?;

    let mut listens_imported = 0;
    let mut listens_pending = 0;
    let count = document.listen_count();
    if count > 0 && count <= options.sync_import_max_listens {
        let report = EntityResolver::new(store).import_listens(&document, user_id, cancel)?;
        listens_imported = report.listens_processed;
    } else if count > 0 {
        queue.enqueue(payload)?;
        listens_pending = count;
    }

    let message = summary_message(
        document.is_legacy(),
        settings.preferences,
        settings.theme,
        listens_imported,
        listens_pending,
    );
    info!("{}", message);

    Ok(UploadSummary {
        version: document.version,
        prefs_restored: settings.preferences,
        theme_restored: settings.theme,
        listens_imported,
        listens_pending,
        message,
    })
}
