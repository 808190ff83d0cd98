//! On-disk persistence of OAuth credentials

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;

/// The unit of credential state written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_epoch_millis: Option<i64>,
}

impl TokenRecord {
    /// A token is expired once its expiry instant is at or before `now_millis`.
    /// Records without an expiry never expire locally.
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        matches!(self.expiry_epoch_millis, Some(expiry) if expiry <= now_millis)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

/// Reads and writes the token record at a fixed path
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record
    ///
    /// Missing and unparsable files both yield `None`.
    pub async fn load(&self) -> Option<TokenRecord> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {:?}", self.path);
                return None;
            }
            Err(e) => {
                warn!("Failed to read token file {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<TokenRecord>(&content) {
            Ok(record) if !record.access_token.is_empty() => Some(record),
            Ok(_) => {
                warn!("Token file {:?} has an empty access token, ignoring it", self.path);
                None
            }
            Err(e) => {
                warn!("Token file {:?} is not valid, ignoring it: {}", self.path, e);
                None
            }
        }
    }

    /// Replace the stored record as a whole
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// see either the old record or the new one.
    pub async fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(record)?;
        let tmp_path = self.temp_path();
        tokio::fs::write(&tmp_path, json).await?;
        secure_token_file(&tmp_path).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Saved token record to {:?}", self.path);
        Ok(())
    }

    /// Forget the stored record; a missing file is not an error
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Restrict token file permissions to the owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; the file inherits the profile directory's ACL
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
