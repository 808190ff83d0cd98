//! Idempotent folder provisioning and public-link issuance
//!
//! Every `ensure_*` operation searches before it creates, so running the
//! same provisioning twice leaves the remote tree unchanged. Resources this
//! provisioner creates are recorded so a failed run can be rolled back on
//! request.

use tracing::{debug, info, warn};

use crate::client::DriveApi;
use crate::error::{DriveError, Result};
use crate::folder_hint::FolderHintStore;
use crate::models::{FolderRef, PublishedFile, UploadTarget};
use crate::throttle::CallThrottle;

/// Direct download link for a published file
pub fn file_download_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?export=download&id={}", file_id)
}

/// Sharing link for a published folder
pub fn folder_share_url(folder_id: &str) -> String {
    format!("https://drive.google.com/drive/folders/{}?usp=sharing", folder_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedKind {
    Folder,
    File,
}

/// A resource created during this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub id: String,
    pub name: String,
    pub kind: CreatedKind,
}

#[derive(Debug, Clone)]
pub struct RollbackFailure {
    pub resource: CreatedResource,
    pub reason: String,
}

/// Result of undoing this run's creations
#[derive(Debug, Clone, Default)]
pub struct RollbackOutcome {
    pub deleted: Vec<CreatedResource>,
    pub failures: Vec<RollbackFailure>,
}

impl RollbackOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Provisions the distribution tree on Drive
pub struct ResourceProvisioner {
    client: Box<dyn DriveApi>,
    hints: Box<dyn FolderHintStore>,
    root_name: String,
    created: Vec<CreatedResource>,
}

impl ResourceProvisioner {
    pub fn new(
        client: Box<dyn DriveApi>,
        hints: Box<dyn FolderHintStore>,
        root_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            hints,
            root_name: root_name.into(),
            created: Vec::new(),
        }
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Resources created so far, in creation order
    pub fn created_resources(&self) -> &[CreatedResource] {
        &self.created
    }

    /// Hand the client back, e.g. to run a cleanup with it
    pub fn into_client(self) -> Box<dyn DriveApi> {
        self.client
    }

    /// Locate or create the top-level distribution folder
    ///
    /// A remembered ID is reused only if it still names a folder. When it
    /// does not, or the check itself fails, the folder is looked up by name
    /// and created as a last resort.
    pub async fn ensure_root_folder(&mut self, remembered_id: Option<&str>) -> Result<FolderRef> {
        if let Some(found) = self.find_root_with(remembered_id).await? {
            return Ok(found);
        }

        info!("Creating root folder '{}'", self.root_name);
        let created = self.client.create_folder(&self.root_name, None).await?;
        self.track(&created.id, &created.name, CreatedKind::Folder);
        Ok(created)
    }

    /// Locate the root folder without ever creating it
    pub async fn find_root_folder(&self) -> Result<Option<FolderRef>> {
        let remembered = self.hints.load().await;
        self.find_root_with(remembered.as_deref()).await
    }

    /// Resolve the root folder through the hint store and update the hint
    pub async fn resolve_root_folder(&mut self) -> Result<FolderRef> {
        let remembered = self.hints.load().await;
        let root = self.ensure_root_folder(remembered.as_deref()).await?;

        if remembered.as_deref() != Some(root.id.as_str()) {
            if let Err(e) = self.hints.save(&root.id).await {
                warn!("Failed to remember root folder {}: {}", root.id, e);
            }
        }
        Ok(root)
    }

    async fn find_root_with(&self, remembered_id: Option<&str>) -> Result<Option<FolderRef>> {
        if let Some(id) = remembered_id {
            match self.client.verify_is_folder(id).await {
                Ok(true) => {
                    debug!("Reusing remembered root folder {}", id);
                    return Ok(Some(FolderRef {
                        id: id.to_string(),
                        name: self.root_name.clone(),
                        parent_id: None,
                    }));
                }
                Ok(false) => warn!(
                    "Remembered root folder {} no longer exists, searching by name",
                    id
                ),
                Err(e) => warn!(
                    "Could not verify remembered root folder {}: {}; searching by name",
                    id, e
                ),
            }
        }

        self.client.search_folder(&self.root_name, None).await
    }

    /// Search-or-create a folder directly under `parent_id`
    pub async fn ensure_child_folder(&mut self, parent_id: &str, name: &str) -> Result<FolderRef> {
        if let Some(existing) = self.client.search_folder(name, Some(parent_id)).await? {
            debug!("Folder '{}' already exists ({})", name, existing.id);
            return Ok(existing);
        }

        let created = self.client.create_folder(name, Some(parent_id)).await?;
        self.track(&created.id, &created.name, CreatedKind::Folder);
        Ok(created)
    }

    /// Ensure each level of `names` below `parent_id`, returning the deepest
    pub async fn ensure_folder_path<S: AsRef<str>>(
        &mut self,
        parent_id: &str,
        names: &[S],
    ) -> Result<FolderRef> {
        let mut current: Option<FolderRef> = None;
        for name in names {
            let parent = current.as_ref().map_or(parent_id, |f| f.id.as_str()).to_string();
            current = Some(self.ensure_child_folder(&parent, name.as_ref()).await?);
        }
        current.ok_or_else(|| DriveError::ConfigError("Folder path must not be empty".to_string()))
    }

    /// Make a file readable by anyone and return its download link
    pub async fn publish_file(&self, file_id: &str) -> Result<String> {
        self.client.set_public_read_permission(file_id, true).await?;
        Ok(file_download_url(file_id))
    }

    /// Make a folder readable by anyone with the link and return that link
    pub async fn publish_folder(&self, folder_id: &str) -> Result<String> {
        self.client.set_public_read_permission(folder_id, false).await?;
        Ok(folder_share_url(folder_id))
    }

    pub async fn upload_and_publish(&mut self, target: &UploadTarget) -> Result<PublishedFile> {
        let file_id = self.client.upload_file(target).await?;
        self.track(&file_id, &target.desired_name, CreatedKind::File);
        let url = self.publish_file(&file_id).await?;
        Ok(PublishedFile {
            file_id,
            name: target.desired_name.clone(),
            url,
        })
    }

    /// Delete everything this provisioner created, newest first
    ///
    /// Each deletion is independent; failures are collected, not raised.
    pub async fn rollback_created(&mut self, throttle: &mut CallThrottle) -> RollbackOutcome {
        let mut outcome = RollbackOutcome::default();

        while let Some(resource) = self.created.pop() {
            throttle.pause().await;
            match self.client.delete_item(&resource.id).await {
                Ok(()) => {
                    info!("Rolled back {:?} '{}' ({})", resource.kind, resource.name, resource.id);
                    outcome.deleted.push(resource);
                }
                Err(e) => {
                    warn!("Failed to roll back '{}' ({}): {}", resource.name, resource.id, e);
                    outcome.failures.push(RollbackFailure {
                        resource,
                        reason: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    fn track(&mut self, id: &str, name: &str, kind: CreatedKind) {
        self.created.push(CreatedResource {
            id: id.to_string(),
            name: name.to_string(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls() {
        assert_eq!(
            file_download_url("1xYz"),
            "https://drive.google.com/uc?export=download&id=1xYz"
        );
        assert_eq!(
            folder_share_url("0Fold"),
            "https://drive.google.com/drive/folders/0Fold?usp=sharing"
        );
    }

    #[test]
    fn test_rollback_outcome_partial() {
        let mut outcome = RollbackOutcome::default();
        assert!(!outcome.is_partial());
        outcome.failures.push(RollbackFailure {
            resource: CreatedResource {
                id: "a".to_string(),
                name: "Event".to_string(),
                kind: CreatedKind::Folder,
            },
            reason: "HTTP 403".to_string(),
        });
        assert!(outcome.is_partial());
    }
}
