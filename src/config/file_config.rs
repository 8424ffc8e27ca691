use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub import_user: Option<String>,

    // Feature configs
    pub interchange: Option<InterchangeConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct InterchangeConfig {
    pub import_queue_dir: Option<String>,
    pub export_page_size: Option<usize>,
    pub sync_import_max_listens: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_nested_interchange_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
db_dir = "/var/lib/listens"

[interchange]
export_page_size = 250
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_dir.as_deref(), Some("/var/lib/listens"));
        assert_eq!(config.import_user, None);
        let interchange = config.interchange.unwrap();
        assert_eq!(interchange.export_page_size, Some(250));
        assert_eq!(interchange.sync_import_max_listens, None);
    }

    #[test]
    fn rejects_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "db_dir = ").unwrap();
        assert!(FileConfig::load(file.path()).is_err());
    }
}
