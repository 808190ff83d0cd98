//! Remembered root folder ID
//!
//! The hint only saves a search; it is never trusted without verification.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::DriveConfig;
use crate::error::Result;

#[async_trait]
pub trait FolderHintStore: Send + Sync {
    /// The remembered folder ID, if any
    async fn load(&self) -> Option<String>;

    /// Remember a folder ID for the next run
    async fn save(&self, folder_id: &str) -> Result<()>;
}

/// Keeps the ID in a plain text file
#[derive(Debug, Clone)]
pub struct FileFolderHintStore {
    path: PathBuf,
}

impl FileFolderHintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FolderHintStore for FileFolderHintStore {
    async fn load(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let id = content.trim();
                if id.is_empty() {
                    None
                } else {
                    Some(id.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read folder hint {:?}: {}", self.path, e);
                None
            }
        }
    }

    async fn save(&self, folder_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, folder_id.trim()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        debug!("Remembered root folder {} in {:?}", folder_id, self.path);
        Ok(())
    }
}

/// Used when remembering the root folder is turned off
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledFolderHintStore;

#[async_trait]
impl FolderHintStore for DisabledFolderHintStore {
    async fn load(&self) -> Option<String> {
        None
    }

    async fn save(&self, _folder_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Pick the hint store for this run
pub fn hint_store_from_config(config: &DriveConfig, path: PathBuf) -> Box<dyn FolderHintStore> {
    if config.remember_root_folder {
        Box::new(FileFolderHintStore::new(path))
    } else {
        debug!("Root folder hint disabled");
        Box::new(DisabledFolderHintStore)
    }
}
