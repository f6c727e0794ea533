use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::headers::AliasTables;

pub const DEFAULT_DATABASE_URL: &str = "folio_ingest.db";
pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_PLACEHOLDER_DOMAIN: &str = "import.placeholder";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub database_url: String,
    pub server_port: u16,
    pub placeholder_email_domain: String,
    pub alias_file: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            server_port: DEFAULT_SERVER_PORT,
            placeholder_email_domain: DEFAULT_PLACEHOLDER_DOMAIN.to_string(),
            alias_file: None,
        }
    }
}

impl IngestConfig {
    /// Loads `.env` if present, then reads the `INGEST_*` variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let server_port = match value("INGEST_SERVER_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("INGEST_SERVER_PORT is not a port number: {}", port))?,
            None => defaults.server_port,
        };

        Ok(Self {
            database_url: value("INGEST_DATABASE_URL").unwrap_or(defaults.database_url),
            server_port,
            placeholder_email_domain: value("INGEST_PLACEHOLDER_EMAIL_DOMAIN")
                .unwrap_or(defaults.placeholder_email_domain),
            alias_file: value("INGEST_ALIAS_FILE").map(PathBuf::from),
        })
    }

    /// Built-in header aliases, extended by the alias file when one is configured.
    pub fn load_aliases(&self) -> Result<AliasTables> {
        match &self.alias_file {
            Some(path) => AliasTables::from_overrides_file(path)
                .with_context(|| format!("Failed to load alias file {}", path.display())),
            None => Ok(AliasTables::builtin()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, IngestConfig::default());
        assert_eq!(config.server_port, 8000);
    }

    #[test]
    fn test_overrides() {
        let config = IngestConfig::from_lookup(lookup(&[
            ("INGEST_DATABASE_URL", ":memory:"),
            ("INGEST_SERVER_PORT", " 9100 "),
            ("INGEST_PLACEHOLDER_EMAIL_DOMAIN", "example.invalid"),
            ("INGEST_ALIAS_FILE", "aliases.json"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, ":memory:");
        assert_eq!(config.server_port, 9100);
        assert_eq!(config.placeholder_email_domain, "example.invalid");
        assert_eq!(config.alias_file, Some(PathBuf::from("aliases.json")));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = IngestConfig::from_lookup(lookup(&[("INGEST_DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_bad_port_is_rejected() {
        assert!(IngestConfig::from_lookup(lookup(&[("INGEST_SERVER_PORT", "eighty")])).is_err());
    }

    #[test]
    fn test_load_aliases_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"wbr": {{"HOLDER NAME": "investor_name"}}}}"#).unwrap();

        let config = IngestConfig {
            alias_file: Some(file.path().to_path_buf()),
            ..IngestConfig::default()
        };
        let aliases = config.load_aliases().unwrap();
        assert!(aliases.wbr.lookup("HOLDER NAME").is_some());
        assert!(aliases.mis.lookup("HOLDER NAME").is_none());
    }

    #[test]
    fn test_missing_alias_file_is_an_error() {
        let config = IngestConfig {
            alias_file: Some(PathBuf::from("/nonexistent/aliases.json")),
            ..IngestConfig::default()
        };
        assert!(config.load_aliases().is_err());
    }
}
