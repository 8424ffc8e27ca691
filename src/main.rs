use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listen_tracker::config::{AppConfig, CliConfig, FileConfig, DEFAULT_IMPORT_USER};
use listen_tracker::interchange::{
    export_user_data, import_document_file, import_upload, ExportOptions, ImportQueue,
    RestorePolicy, UploadOptions, DEFAULT_EXPORT_PAGE_SIZE, DEFAULT_SYNC_IMPORT_MAX_LISTENS,
};
use listen_tracker::library_store::{SqliteLibraryStore, UserStore};
use listen_tracker::preferences;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Listening history export, import and settings maintenance")]
struct CliArgs {
    /// Directory holding the library database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file. Its values override command line flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory of documents waiting to be imported. Defaults to <db-dir>/import.
    #[clap(long, value_parser = parse_path)]
    pub import_queue_dir: Option<PathBuf>,

    /// Number of listens fetched per database query while exporting.
    #[clap(long, default_value_t = DEFAULT_EXPORT_PAGE_SIZE)]
    pub export_page_size: usize,

    /// Uploads with more listens than this are queued instead of imported right away.
    #[clap(long, default_value_t = DEFAULT_SYNC_IMPORT_MAX_LISTENS)]
    pub sync_import_max_listens: usize,

    /// User that queued imports are attributed to.
    #[clap(long, default_value = DEFAULT_IMPORT_USER)]
    pub import_user: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a user with the given handle.
    CreateUser { user_handle: String },

    /// Writes the export document of a user to a file, or to stdout.
    Export {
        user_handle: String,
        #[clap(short, long, value_parser = parse_path)]
        output: Option<PathBuf>,
    },

    /// Imports a document, replacing the user's stored preferences with the
    /// ones it carries.
    Import {
        user_handle: String,
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Handles a document the way an interactive upload does: settings are
    /// merged and large listen histories are queued.
    Upload {
        user_handle: String,
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Imports every pending document of the import queue.
    ProcessQueue,

    /// Applies a preferences edit read from a JSON object file.
    SavePreferences {
        user_handle: String,
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Removes every cached AI entry of a user.
    ClearAiCache { user_handle: String },

    /// Prints the cached AI entries of a user.
    ExportAiCache { user_handle: String },
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            import_queue_dir: self.import_queue_dir.clone(),
            export_page_size: self.export_page_size,
            sync_import_max_listens: self.sync_import_max_listens,
            import_user: self.import_user.clone(),
        }
    }
}

fn resolve_user(store: &SqliteLibraryStore, user_handle: &str) -> Result<usize> {
    store
        .get_user_id(user_handle)?
        .with_context(|| format!("User '{}' does not exist", user_handle))
}

fn run_command(command: Command, config: &AppConfig, cancel: &CancellationToken) -> Result<()> {
    let store = SqliteLibraryStore::new(config.library_db_path())?;

    match command {
        Command::CreateUser { user_handle } => {
            let user_id = store.create_user(&user_handle)?;
            info!("Created user '{}' with id {}", user_handle, user_id);
        }
        Command::Export {
            user_handle,
            output,
        } => {
            let user_id = resolve_user(&store, &user_handle)?;
            let options = ExportOptions {
                page_size: config.interchange.export_page_size,
            };
            let stats = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create export file {:?}", path))?;
                    export_user_data(&store, user_id, BufWriter::new(file), &options, cancel)?
                }
                None => {
                    let stdout = std::io::stdout();
                    export_user_data(&store, user_id, BufWriter::new(stdout.lock()), &options, cancel)?
                }
            };
            info!("Export finished: {} listens", stats.listens);
        }
        Command::Import { user_handle, file } => {
            let user_id = resolve_user(&store, &user_handle)?;
            let imported =
                import_document_file(&store, &file, user_id, RestorePolicy::Overwrite, cancel)?;
            info!(
                "Imported {:?}: {} listens, {} image fetches pending",
                imported.file,
                imported.report.listens_processed,
                imported.report.image_fetch_requests.len()
            );
        }
        Command::Upload { user_handle, file } => {
            let user_id = resolve_user(&store, &user_handle)?;
            let payload =
                std::fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let queue = ImportQueue::new(&config.interchange.import_queue_dir)?;
            let options = UploadOptions {
                sync_import_max_listens: config.interchange.sync_import_max_listens,
            };
            let summary = import_upload(&store, &queue, user_id, &payload, &options, cancel)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::ProcessQueue => {
            let user_id = resolve_user(&store, &config.import_user)?;
            let queue = ImportQueue::new(&config.interchange.import_queue_dir)?;
            let run = queue.process_pending(&store, user_id, cancel)?;
            info!(
                "Queue processed: {} files, {} listens",
                run.imported.len(),
                run.listens_processed()
            );
        }
        Command::SavePreferences { user_handle, file } => {
            let user_id = resolve_user(&store, &user_handle)?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let incoming: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{:?} is not valid JSON", file))?;
            let Value::Object(incoming) = incoming else {
                bail!("{:?} must contain a JSON object", file);
            };
            let cleared = preferences::save_client_preferences(&store, user_id, incoming)?;
            println!("Preferences saved, {} cached entries invalidated", cleared);
        }
        Command::ClearAiCache { user_handle } => {
            let user_id = resolve_user(&store, &user_handle)?;
            let cleared = preferences::clear_ai_cache(&store, user_id)?;
            println!("AI cache cleared, {} entries removed", cleared);
        }
        Command::ExportAiCache { user_handle } => {
            let user_id = resolve_user(&store, &user_handle)?;
            let cache: Map<String, Value> = preferences::export_ai_cache(&store, user_id)?;
            let mut stdout = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &cache)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    info!(
        "listen-tracker {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current step...");
            ctrl_c_cancel.cancel();
        }
    });

    let command = cli_args.command;
    tokio::task::spawn_blocking(move || run_command(command, &config, &cancel))
        .await
        .context("Command task failed")?
}
