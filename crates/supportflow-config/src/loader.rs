use std::path::{Path, PathBuf};

use supportflow_common::{Error, Result};
use tracing::info;

use crate::model::AppConfig;

const STORE_FILE_NAME: &str = "supportflow.db";

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        let home_config = dirs::home_dir().map(|h| h.join(".supportflow"));
        let xdg_config = dirs::config_dir().map(|c| c.join("supportflow"));

        match (xdg_config, home_config) {
            (Some(xdg), Some(home)) => {
                if xdg.exists() {
                    xdg
                }
                // Legacy location, only used when XDG is absent.
                else if home.exists() {
                    home
                } else {
                    xdg
                }
            }
            (Some(xdg), None) => xdg,
            (None, Some(home)) => home,
            (None, None) => PathBuf::from(".supportflow"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn load(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    pub fn data_dir(&self, config: &AppConfig) -> PathBuf {
        config
            .data_dir
            .clone()
            .unwrap_or_else(|| self.config_dir.join("data"))
    }

    /// Location of the ticket store: explicit `store.path`, else `<data_dir>/supportflow.db`.
    pub fn store_path(&self, config: &AppConfig) -> PathBuf {
        config
            .store
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir(config).join(STORE_FILE_NAME))
    }

    pub fn ensure_dirs(&self, config: &AppConfig) -> Result<()> {
        let dirs = [self.config_dir.clone(), self.data_dir(config)];

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigLoader;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "supportflow-config-test-{}-{}-{}",
            label,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn load_returns_default_when_no_config_exists() {
        let dir = temp_dir("default");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.import.table_prefix, "support_");
        assert_eq!(config.import.status_prefix, "imported_");
        assert!(!config.import.strip_quoted_replies);
        assert!(config.imap.host.is_none());
        assert!(config.email_replies.command.is_none());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_prefers_yaml_over_toml_when_both_exist() {
        let dir = temp_dir("yaml-precedence");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(
            dir.join("config.yml"),
            "import:\n  table_prefix: \"sp_\"\nimap:\n  password: \"from-yaml\"\n",
        )
        .expect("failed to write yaml config");
        fs::write(
            dir.join("config.toml"),
            "[import]\ntable_prefix = \"toml_\"\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(config.import.table_prefix, "sp_");
        assert_eq!(config.import.status_prefix, "imported_");
        assert_eq!(config.imap.password.as_deref(), Some("from-yaml"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_reads_toml_when_yaml_missing() {
        let dir = temp_dir("toml");
        fs::create_dir_all(&dir).expect("failed to create temp dir");

        fs::write(
            dir.join("config.toml"),
            "[email_replies]\ncommand = \"fetch-replies\"\nargs = [\"--verbose\"]\n",
        )
        .expect("failed to write toml config");

        let loader = ConfigLoader::with_dir(&dir);
        let config = loader.load().expect("load should succeed");

        assert_eq!(
            config.email_replies.command.as_deref(),
            Some("fetch-replies")
        );
        assert_eq!(config.email_replies.args, vec!["--verbose".to_string()]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn load_rejects_malformed_yaml() {
        let dir = temp_dir("bad-yaml");
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        fs::write(dir.join("config.yml"), "import: [unclosed").expect("failed to write yaml");

        let loader = ConfigLoader::with_dir(&dir);
        let err = loader.load().expect_err("malformed yaml should fail");
        assert!(err.to_string().contains("failed to parse YAML config"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn store_path_prefers_explicit_setting() {
        let dir = temp_dir("store-path");
        let loader = ConfigLoader::with_dir(&dir);

        let mut config = crate::model::AppConfig::default();
        assert_eq!(
            loader.store_path(&config),
            dir.join("data").join("supportflow.db")
        );

        config.data_dir = Some(dir.join("elsewhere"));
        assert_eq!(
            loader.store_path(&config),
            dir.join("elsewhere").join("supportflow.db")
        );

        config.store.path = Some(PathBuf::from("/tmp/explicit.db"));
        assert_eq!(
            loader.store_path(&config),
            PathBuf::from("/tmp/explicit.db")
        );
    }

    #[test]
    fn ensure_dirs_creates_config_and_data_directories() {
        let dir = temp_dir("ensure-dirs");
        let loader = ConfigLoader::with_dir(&dir);
        let config = crate::model::AppConfig::default();

        loader
            .ensure_dirs(&config)
            .expect("ensure_dirs should succeed");

        assert!(dir.exists());
        assert!(dir.join("data").exists());

        let _ = fs::remove_dir_all(dir);
    }
}
