use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{DriveError, Result};

/// Directory name used under the per-user config directory
pub const APP_DIR_NAME: &str = "drive-provisioner";

/// Environment variable overriding `oauth.client_id`
pub const CLIENT_ID_ENV: &str = "DRIVE_CLIENT_ID";
/// Environment variable overriding `oauth.client_secret`
pub const CLIENT_SECRET_ENV: &str = "DRIVE_CLIENT_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            callback_port: default_callback_port(),
            open_browser: default_open_browser(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: String,
    #[serde(default = "default_remember_root_folder")]
    pub remember_root_folder: bool,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            root_folder_name: default_root_folder_name(),
            remember_root_folder: default_remember_root_folder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_callback_port() -> u16 {
    8085
}

fn default_open_browser() -> bool {
    true
}

fn default_root_folder_name() -> String {
    "Model Distributions".to_string()
}

fn default_remember_root_folder() -> bool {
    true
}

fn default_retention_days() -> i64 {
    30
}

fn default_min_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    1000
}

/// Per-user directory holding the token file and the root folder hint
pub fn default_app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn default_token_path() -> PathBuf {
    default_app_dir().join("token.json")
}

pub fn default_hint_path() -> PathBuf {
    default_app_dir().join("root_folder_id")
}

pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            let mut config = Self::default();
            config.apply_env_overrides();
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DriveError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| DriveError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DriveError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DriveError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| DriveError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Client credentials from the environment take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(client_id) = env::var(CLIENT_ID_ENV) {
            if !client_id.is_empty() {
                self.oauth.client_id = client_id;
            }
        }
        if let Ok(client_secret) = env::var(CLIENT_SECRET_ENV) {
            if !client_secret.is_empty() {
                self.oauth.client_secret = client_secret;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.oauth.callback_port == 0 {
            return Err(DriveError::ConfigError(
                "oauth.callback_port must be a fixed, non-zero port".to_string(),
            ));
        }

        let root = self.drive.root_folder_name.trim();
        if root.is_empty() {
            return Err(DriveError::ConfigError(
                "drive.root_folder_name cannot be empty".to_string(),
            ));
        }

        if self.cleanup.retention_days < 0 {
            return Err(DriveError::ConfigError(
                "cleanup.retention_days cannot be negative".to_string(),
            ));
        }
        if self.cleanup.retention_days > 3650 {
            return Err(DriveError::ConfigError(
                "cleanup.retention_days cannot exceed 3650 (10 years)".to_string(),
            ));
        }

        if self.throttle.min_delay_ms > self.throttle.max_delay_ms {
            return Err(DriveError::ConfigError(
                "throttle.min_delay_ms cannot exceed throttle.max_delay_ms".to_string(),
            ));
        }
        if self.throttle.max_delay_ms > 60_000 {
            return Err(DriveError::ConfigError(
                "throttle.max_delay_ms cannot exceed 60000 (one minute)".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Fail early when a command needs OAuth client credentials that are missing
    pub fn require_client_credentials(&self) -> Result<()> {
        if self.oauth.client_id.trim().is_empty() || self.oauth.client_secret.trim().is_empty() {
            return Err(DriveError::ConfigError(format!(
                "OAuth client credentials missing: set oauth.client_id/oauth.client_secret or {}/{}",
                CLIENT_ID_ENV, CLIENT_SECRET_ENV
            )));
        }
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.oauth.callback_port, 8085);
        assert!(config.oauth.open_browser);
        assert!(config.oauth.client_id.is_empty());

        assert_eq!(config.drive.root_folder_name, "Model Distributions");
        assert!(config.drive.remember_root_folder);

        assert_eq!(config.cleanup.retention_days, 30);
        assert!(!config.cleanup.dry_run);

        assert_eq!(config.throttle.min_delay_ms, 250);
        assert_eq!(config.throttle.max_delay_ms, 1000);
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_port() {
        let mut config = Config::default();
        config.oauth.callback_port = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("callback_port"));
    }

    #[test]
    fn test_config_validation_empty_root_name() {
        let mut config = Config::default();
        config.drive.root_folder_name = "   ".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("root_folder_name cannot be empty"));
    }

    #[test]
    fn test_config_validation_retention_bounds() {
        let mut config = Config::default();

        config.cleanup.retention_days = -1;
        assert!(config.validate().is_err());

        config.cleanup.retention_days = 0;
        assert!(config.validate().is_ok());

        config.cleanup.retention_days = 3650;
        assert!(config.validate().is_ok());

        config.cleanup.retention_days = 3651;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_throttle_order() {
        let mut config = Config::default();
        config.throttle.min_delay_ms = 2000;
        config.throttle.max_delay_ms = 1000;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("min_delay_ms"));
    }

    #[test]
    fn test_require_client_credentials() {
        let mut config = Config::default();
        assert!(config.require_client_credentials().is_err());

        config.oauth.client_id = "id.apps.googleusercontent.com".to_string();
        config.oauth.client_secret = "secret".to_string();
        assert!(config.require_client_credentials().is_ok());
    }

    #[tokio::test]
    #[serial]
    async fn test_config_load_save_roundtrip() {
        env::remove_var(CLIENT_ID_ENV);
        env::remove_var(CLIENT_SECRET_ENV);

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.drive.root_folder_name = "Event Builds".to_string();
        config.cleanup.retention_days = 14;
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.drive.root_folder_name, "Event Builds");
        assert_eq!(loaded.cleanup.retention_days, 14);
        assert_eq!(loaded.oauth.callback_port, config.oauth.callback_port);
    }

    #[tokio::test]
    #[serial]
    async fn test_config_load_nonexistent_returns_default() {
        env::remove_var(CLIENT_ID_ENV);
        env::remove_var(CLIENT_SECRET_ENV);

        let path = Path::new("/tmp/nonexistent-drive-provisioner-config-12345.toml");
        let config = Config::load(path).await.unwrap();

        assert_eq!(config.cleanup.retention_days, 30);
        assert_eq!(config.oauth.callback_port, 8085);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    #[serial]
    async fn test_config_partial_with_defaults() {
        env::remove_var(CLIENT_ID_ENV);
        env::remove_var(CLIENT_SECRET_ENV);

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let partial_config = r#"
[cleanup]
retention_days = 7
dry_run = true

[oauth]
client_id = "file-id"
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.cleanup.retention_days, 7);
        assert!(config.cleanup.dry_run);
        assert_eq!(config.oauth.client_id, "file-id");

        assert_eq!(config.oauth.callback_port, 8085);
        assert_eq!(config.drive.root_folder_name, "Model Distributions");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_overrides_file_credentials() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();
        tokio::fs::write(
            path,
            "[oauth]\nclient_id = \"file-id\"\nclient_secret = \"file-secret\"\n",
        )
        .await
        .unwrap();

        env::set_var(CLIENT_ID_ENV, "env-id");
        env::set_var(CLIENT_SECRET_ENV, "env-secret");

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.oauth.client_id, "env-id");
        assert_eq!(config.oauth.client_secret, "env-secret");

        env::remove_var(CLIENT_ID_ENV);
        env::remove_var(CLIENT_SECRET_ENV);
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        assert!(path.exists());

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.contains("[cleanup]"));
        assert!(content.contains("retention_days = 30"));
    }

    #[test]
    fn test_default_paths_share_app_dir() {
        let app_dir = default_app_dir();
        assert!(app_dir.ends_with(APP_DIR_NAME));
        assert!(default_token_path().starts_with(&app_dir));
        assert!(default_hint_path().starts_with(&app_dir));
    }
}
