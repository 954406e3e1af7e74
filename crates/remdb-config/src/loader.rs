//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.remdb/config.toml`
//! 2. Local config: `.remdb/config.toml` (working directory)
//! 3. Environment: `P8_DB_PATH`, `P8_TENANT_ID`
//! 4. CLI overrides
//!
//! Later sources override earlier ones. Merging is section-by-section: a
//! local file that only sets `[embedding]` inherits `[storage]` from the
//! global file.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::{ConfigOverrides, RemConfig, ENV_DB_PATH, ENV_TENANT_ID};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name for both global (`~/.remdb`) and local (`./.remdb`).
const CONFIG_DIR: &str = ".remdb";

/// Raw per-file form: every section optional so partial files merge.
#[derive(Debug, Default, serde::Deserialize)]
struct PartialConfig {
    storage: Option<toml::Value>,
    embedding: Option<toml::Value>,
    replication: Option<toml::Value>,
    logging: Option<toml::Value>,
}

/// Configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g. `~/.remdb`).
    global_config_dir: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader rooted at the user's home directory.
    pub fn new() -> Self {
        Self {
            global_config_dir: dirs::home_dir().map(|h| h.join(CONFIG_DIR)),
        }
    }

    /// Create a loader with a custom global directory. Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load and merge configuration for a working directory.
    pub fn load(
        &self,
        working_dir: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<RemConfig, ConfigError> {
        let mut merged = toml::Value::try_from(RemConfig::default())?;

        if let Some(global_path) = self.global_config_path() {
            if global_path.exists() {
                debug!(path = %global_path.display(), "merging global config");
                merge_file(&mut merged, &global_path)?;
            }
        }

        let local_path = self.local_config_path(working_dir);
        if local_path.exists() {
            debug!(path = %local_path.display(), "merging local config");
            merge_file(&mut merged, &local_path)?;
        }

        let mut config: RemConfig = merged
            .try_into()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            if !path.is_empty() {
                config.storage.path = PathBuf::from(path);
            }
        }
        if let Ok(tenant) = std::env::var(ENV_TENANT_ID) {
            if !tenant.is_empty() {
                config.storage.tenant = tenant;
            }
        }

        if let Some(path) = &overrides.db_path {
            config.storage.path = path.clone();
        }
        if let Some(tenant) = &overrides.tenant {
            config.storage.tenant = tenant.clone();
        }
        if let Some(provider) = &overrides.embedding_provider {
            config.embedding.provider = provider.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Write a config file (used by `rem init`).
    pub fn write(&self, path: &Path, config: &RemConfig) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::write_file(parent, e))?;
        }
        let text = toml::to_string_pretty(config)?;
        std::fs::write(path, text).map_err(|e| ConfigError::write_file(path, e))
    }
}

/// Merge one TOML file into the accumulated value, section by section and
/// key by key within a section.
fn merge_file(merged: &mut toml::Value, path: &Path) -> Result<(), ConfigError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let partial: PartialConfig =
        toml::from_str(&text).map_err(|e| ConfigError::parse_toml(path, e))?;

    for (section, value) in [
        ("storage", partial.storage),
        ("embedding", partial.embedding),
        ("replication", partial.replication),
        ("logging", partial.logging),
    ] {
        if let Some(value) = value {
            merge_section(merged, section, value);
        }
    }
    Ok(())
}

fn merge_section(merged: &mut toml::Value, section: &str, incoming: toml::Value) {
    let Some(table) = merged.as_table_mut() else {
        return;
    };
    match (table.get_mut(section), incoming) {
        (Some(toml::Value::Table(existing)), toml::Value::Table(new)) => {
            for (key, value) in new {
                existing.insert(key, value);
            }
        }
        (_, incoming) => {
            table.insert(section.to_string(), incoming);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn merges_global_then_local_then_overrides() {
        let home = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();

        write(
            &home.path().join(".remdb-global/config.toml"),
            "[storage]\ntenant = \"global-tenant\"\n\n[logging]\nlevel = \"debug\"\n",
        );
        write(
            &workspace.path().join(".remdb/config.toml"),
            "[storage]\ntenant = \"local-tenant\"\n",
        );

        let loader = ConfigLoader::with_global_dir(home.path().join(".remdb-global"));
        let config = loader
            .load(workspace.path(), &ConfigOverrides::default())
            .unwrap();
        // Local wins over global, and untouched sections survive.
        assert_eq!(config.storage.tenant, "local-tenant");
        assert_eq!(config.logging.level, "debug");

        let config = loader
            .load(
                workspace.path(),
                &ConfigOverrides {
                    tenant: Some("cli-tenant".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(config.storage.tenant, "cli-tenant");
    }

    #[test]
    fn partial_local_section_inherits_other_keys() {
        let home = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        write(
            &workspace.path().join(".remdb/config.toml"),
            "[storage]\npath = \"/srv/rem\"\n",
        );

        let loader = ConfigLoader::with_global_dir(home.path().join("nope"));
        let config = loader
            .load(workspace.path(), &ConfigOverrides::default())
            .unwrap();
        assert_eq!(config.storage.path, PathBuf::from("/srv/rem"));
        // Tenant untouched by the partial file.
        assert_eq!(config.storage.tenant, "default");
    }

    #[test]
    fn invalid_toml_reports_the_file() {
        let home = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        write(&workspace.path().join(".remdb/config.toml"), "not [valid");

        let loader = ConfigLoader::with_global_dir(home.path().join("nope"));
        let err = loader
            .load(workspace.path(), &ConfigOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn write_and_reload() {
        let dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_global_dir(dir.path().join(".remdb"));
        let path = loader.global_config_path().unwrap();
        loader.write(&path, &RemConfig::default()).unwrap();
        assert!(path.exists());
    }
}
