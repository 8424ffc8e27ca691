mod file_config;

pub use file_config::{FileConfig, InterchangeConfig};

use crate::interchange::{DEFAULT_EXPORT_PAGE_SIZE, DEFAULT_SYNC_IMPORT_MAX_LISTENS};
use anyhow::{bail, Result};
use std::path::PathBuf;

pub const LIBRARY_DB_FILE: &str = "library.db";
pub const DEFAULT_IMPORT_USER: &str = "admin";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub import_queue_dir: Option<PathBuf>,
    pub export_page_size: usize,
    pub sync_import_max_listens: usize,
    pub import_user: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            import_queue_dir: None,
            export_page_size: DEFAULT_EXPORT_PAGE_SIZE,
            sync_import_max_listens: DEFAULT_SYNC_IMPORT_MAX_LISTENS,
            import_user: DEFAULT_IMPORT_USER.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// Handle of the user that queued imports are attributed to.
    pub import_user: String,
    pub interchange: InterchangeSettings,
}

#[derive(Debug, Clone)]
pub struct InterchangeSettings {
    pub import_queue_dir: PathBuf,
    pub export_page_size: usize,
    pub sync_import_max_listens: usize,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let import_user = file.import_user.unwrap_or_else(|| cli.import_user.clone());
        if import_user.trim().is_empty() {
            bail!("import_user must not be empty");
        }

        let interchange_file = file.interchange.unwrap_or_default();
        let import_queue_dir = interchange_file
            .import_queue_dir
            .map(PathBuf::from)
            .or_else(|| cli.import_queue_dir.clone())
            .unwrap_or_else(|| db_dir.join("import"));
        let export_page_size = interchange_file
            .export_page_size
            .unwrap_or(cli.export_page_size);
        if export_page_size == 0 {
            bail!("export_page_size must be at least 1");
        }
        let sync_import_max_listens = interchange_file
            .sync_import_max_listens
            .unwrap_or(cli.sync_import_max_listens);

        Ok(Self {
            db_dir,
            import_user,
            interchange: InterchangeSettings {
                import_queue_dir,
                export_page_size,
                sync_import_max_listens,
            },
        })
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join(LIBRARY_DB_FILE)
    }
}
