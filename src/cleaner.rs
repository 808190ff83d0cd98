//! Retention-based removal of stale event folders

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::DriveApi;
use crate::error::Result;
use crate::models::{CleanupOutcome, CleanupReport, EventFolderInfo};
use crate::throttle::CallThrottle;

/// Called after each stale folder has been handled during an executed run
pub type ProgressCallback = Arc<dyn Fn(&EventFolderInfo) + Send + Sync>;

pub struct RetentionCleaner {
    client: Box<dyn DriveApi>,
    throttle: CallThrottle,
    on_progress: Option<ProgressCallback>,
}

impl RetentionCleaner {
    pub fn new(client: Box<dyn DriveApi>, throttle: CallThrottle) -> Self {
        Self {
            client,
            throttle,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Child folders of `parent_id` with their age as of now
    pub async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<EventFolderInfo>> {
        self.list_child_folders_at(parent_id, Utc::now()).await
    }

    pub async fn list_child_folders_at(
        &self,
        parent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventFolderInfo>> {
        let folders = self.client.list_child_folders(parent_id).await?;
        Ok(folders
            .into_iter()
            .map(|folder| EventFolderInfo::at(folder, now))
            .collect())
    }

    /// Folders strictly older than `retention_days`
    pub fn select_stale(folders: Vec<EventFolderInfo>, retention_days: i64) -> Vec<EventFolderInfo> {
        folders
            .into_iter()
            .filter(|folder| folder.age_days > retention_days)
            .collect()
    }

    pub async fn run(
        &mut self,
        parent_id: &str,
        retention_days: i64,
        dry_run: bool,
    ) -> Result<CleanupReport> {
        self.run_at(parent_id, retention_days, dry_run, Utc::now()).await
    }

    /// List, filter and (unless `dry_run`) delete stale folders
    ///
    /// Listing errors abort the run. Deletion errors are recorded per folder
    /// and never stop the remaining deletions.
    pub async fn run_at(
        &mut self,
        parent_id: &str,
        retention_days: i64,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport> {
        let folders = self.list_child_folders_at(parent_id, now).await?;
        let total = folders.len();
        let stale = Self::select_stale(folders, retention_days);
        info!(
            "{} of {} folders are older than {} days",
            stale.len(),
            total,
            retention_days
        );

        if dry_run {
            return Ok(CleanupReport::DryRun(stale));
        }

        let mut outcome = CleanupOutcome::default();
        for folder in stale {
            self.throttle.pause().await;
            match self.client.delete_item(&folder.id).await {
                Ok(()) => {
                    debug!("Deleted '{}' ({} days old)", folder.name, folder.age_days);
                    if let Some(callback) = &self.on_progress {
                        callback(&folder);
                    }
                    outcome.record_deleted(folder);
                }
                Err(e) => {
                    warn!("Failed to delete '{}' ({}): {}", folder.name, folder.id, e);
                    if let Some(callback) = &self.on_progress {
                        callback(&folder);
                    }
                    let kind = e.kind();
                    outcome.record_failure(folder, e.to_string(), kind);
                }
            }
        }

        info!(
            "Cleanup finished: {} deleted, {} failed",
            outcome.deleted_count,
            outcome.failures.len()
        );
        Ok(CleanupReport::Executed(outcome))
    }
}
