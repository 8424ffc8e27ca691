//! Directory-backed queue of documents waiting to be imported.
//!
//! Pending documents are `*.json` files directly inside the queue directory
//! and are processed in file name order. A processed file is moved into the
//! `completed/` subdirectory; a file that fails stays where it is and is
//! retried on the next run.

use super::document::InterchangeDocument;
use super::error::{InterchangeError, InterchangeResult};
use super::import::{restore_settings, EntityResolver, ImportReport, RestorePolicy, SettingsRestore};
use crate::library_store::LibraryStore;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const COMPLETED_DIR: &str = "completed";

/// Prefix of files enqueued by an interactive upload. Their settings were
/// already applied when they were uploaded.
pub const WEB_IMPORT_PREFIX: &str = "web_import_";

#[derive(Debug, Clone, PartialEq)]
pub struct FileImport {
    pub file: PathBuf,
    pub settings: SettingsRestore,
    pub report: ImportReport,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueRun {
    pub imported: Vec<FileImport>,
}

impl QueueRun {
    pub fn listens_processed(&self) -> usize {
        self.imported.iter().map(|f| f.report.listens_processed).sum()
    }
}

/// Decodes a document file and imports it: settings first according to
/// `policy`, then the listens.
pub fn import_document_file<S: LibraryStore + ?Sized>(
    store: &S,
    path: &Path,
    user_id: usize,
    policy: RestorePolicy,
    cancel: &CancellationToken,
) -> InterchangeResult<FileImport> {
    info!("Importing {:?} with {:?} settings policy", path, policy);
    let bytes = fs::read(path)?;
    let document = InterchangeDocument::from_slice(&bytes)?;
    let settings = restore_settings(store, &document, user_id, policy)?;
    let report = EntityResolver::new(store).import_listens(&document, user_id, cancel)?;
    Ok(FileImport {
        file: path.to_path_buf(),
        settings,
        report,
    })
}

fn is_web_import(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(WEB_IMPORT_PREFIX))
}

pub struct ImportQueue {
    dir: PathBuf,
}

impl ImportQueue {
    /// Opens the queue rooted at `dir`, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> InterchangeResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(COMPLETED_DIR))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Settings policy for a queued file.
    pub fn policy_for(path: &Path) -> RestorePolicy {
        if is_web_import(path) {
            RestorePolicy::Skip
        } else {
            RestorePolicy::Overwrite
        }
    }

    /// Pending files, sorted by name.
    pub fn pending_files(&self) -> InterchangeResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Stores a raw payload for deferred processing and returns its path.
    ///
    /// The payload is written under a temporary name first so a concurrent
    /// queue run never picks up a partial file.
    pub fn enqueue(&self, payload: &[u8]) -> InterchangeResult<PathBuf> {
        let mut millis = Utc::now().timestamp_millis();
        let path = loop {
            let candidate = self
                .dir
                .join(format!("{}{}.json", WEB_IMPORT_PREFIX, millis));
            if !candidate.exists() {
                break candidate;
            }
            millis += 1;
        };

        let partial = path.with_extension("json.part");
        fs::write(&partial, payload)?;
        fs::rename(&partial, &path)?;
        info!("Queued {} bytes for import as {:?}", payload.len(), path);
        Ok(path)
    }

    /// Imports one queued file and moves it to the completed directory.
    pub fn import_file<S: LibraryStore + ?Sized>(
        &self,
        store: &S,
        path: &Path,
        user_id: usize,
        cancel: &CancellationToken,
    ) -> InterchangeResult<FileImport> {
        let mut imported =
            import_document_file(store, path, user_id, Self::policy_for(path), cancel)?;
        imported.file = self.complete(path)?;
        Ok(imported)
    }

    fn complete(&self, path: &Path) -> InterchangeResult<PathBuf> {
        let name = path.file_name().ok_or_else(|| {
            InterchangeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{:?} is not a file", path),
            ))
        })?;
        let target = self.dir.join(COMPLETED_DIR).join(name);
        if target.exists() {
            warn!("Replacing previously completed {:?}", target);
        }
        fs::rename(path, &target)?;
        Ok(target)
    }

    /// Imports every pending file in name order. Stops at the first failure,
    /// leaving the failing file and every later one in the queue.
    pub fn process_pending<S: LibraryStore + ?Sized>(
        &self,
        store: &S,
        user_id: usize,
        cancel: &CancellationToken,
    ) -> InterchangeResult<QueueRun> {
        let files = self.pending_files()?;
        if files.is_empty() {
            info!("No pending imports in {:?}", self.dir);
            return Ok(QueueRun::default());
        }
        info!("Processing {} pending imports in {:?}", files.len(), self.dir);

        let mut run = QueueRun::default();
        for path in files {
            if cancel.is_cancelled() {
                return Err(InterchangeError::Cancelled);
            }
            match self.import_file(store, &path, user_id, cancel) {
                Ok(imported) => run.imported.push(imported),
                Err(e) => {
                    error!("Import of {:?} failed, leaving it queued: {}", path, e);
                    return Err(e);
                }
            }
        }
        info!(
            "Imported {} files with {} listens",
            run.imported.len(),
            run.listens_processed()
        );
        Ok(run)
    }
}
