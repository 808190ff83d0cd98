use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ErrorKind;

/// Milliseconds in one day, the unit of folder age
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// A child folder as returned by a listing, before age is derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveFolder {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A dated child folder of the distribution root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFolderInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub age_days: i64,
}

impl EventFolderInfo {
    /// Derive the age of a folder relative to `now`, floored to whole days
    pub fn at(folder: DriveFolder, now: DateTime<Utc>) -> Self {
        let age_days = age_in_days(folder.created_at, now);
        Self {
            id: folder.id,
            name: folder.name,
            created_at: folder.created_at,
            age_days,
        }
    }
}

/// Whole days elapsed between `created_at` and `now`
///
/// Floors towards negative infinity, so a folder created in the future
/// (clock skew) has a negative age and is never stale.
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// One deletion that did not go through
#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub item: EventFolderInfo,
    pub reason: String,
    #[serde(skip)]
    pub kind: ErrorKind,
}

/// Aggregated result of an executed cleanup
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub deleted_count: usize,
    pub deleted: Vec<EventFolderInfo>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupOutcome {
    pub fn record_deleted(&mut self, item: EventFolderInfo) {
        self.deleted.push(item);
        self.deleted_count = self.deleted.len();
    }

    pub fn record_failure(&mut self, item: EventFolderInfo, reason: String, kind: ErrorKind) {
        self.failures.push(CleanupFailure { item, reason, kind });
    }

    /// True when at least one deletion failed
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// What a cleanup run produced: the would-be deletions, or what happened
#[derive(Debug, Clone)]
pub enum CleanupReport {
    DryRun(Vec<EventFolderInfo>),
    Executed(CleanupOutcome),
}

impl CleanupReport {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, CleanupReport::DryRun(_))
    }
}

/// One local file headed for a remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub local_path: PathBuf,
    pub remote_parent_id: String,
    pub desired_name: String,
}

impl UploadTarget {
    /// Target that keeps the local file name
    pub fn new(local_path: impl Into<PathBuf>, remote_parent_id: impl Into<String>) -> Self {
        let local_path = local_path.into();
        let desired_name = file_name_of(&local_path);
        Self {
            local_path,
            remote_parent_id: remote_parent_id.into(),
            desired_name,
        }
    }

    pub fn with_name(mut self, desired_name: impl Into<String>) -> Self {
        self.desired_name = desired_name.into();
        self
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// An uploaded file and its public link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedFile {
    pub file_id: String,
    pub name: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn folder(created_at: DateTime<Utc>) -> DriveFolder {
        DriveFolder {
            id: "f1".to_string(),
            name: "2024-05-01 Spring Event".to_string(),
            created_at,
        }
    }

    #[test]
    fn test_age_floors_to_whole_days() {
        let now = Utc::now();
        let info = EventFolderInfo::at(folder(now - Duration::days(31)), now);
        assert_eq!(info.age_days, 31);

        let info = EventFolderInfo::at(
            folder(now - Duration::days(31) + Duration::milliseconds(1)),
            now,
        );
        assert_eq!(info.age_days, 30);

        let info = EventFolderInfo::at(folder(now - Duration::hours(23)), now);
        assert_eq!(info.age_days, 0);
    }

    #[test]
    fn test_age_negative_for_future_folder() {
        let now = Utc::now();
        assert_eq!(age_in_days(now + Duration::hours(1), now), -1);
    }

    #[test]
    fn test_upload_target_defaults_to_file_name() {
        let target = UploadTarget::new("/tmp/build/model-a.zip", "parent-1");
        assert_eq!(target.desired_name, "model-a.zip");
        assert_eq!(target.remote_parent_id, "parent-1");

        let renamed = target.with_name("Model A.zip");
        assert_eq!(renamed.desired_name, "Model A.zip");
    }

    #[test]
    fn test_cleanup_outcome_counts() {
        let now = Utc::now();
        let mut outcome = CleanupOutcome::default();
        outcome.record_deleted(EventFolderInfo::at(folder(now - Duration::days(40)), now));
        outcome.record_failure(
            EventFolderInfo::at(folder(now - Duration::days(50)), now),
            "HTTP 403".to_string(),
            ErrorKind::RemoteApi,
        );

        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_folder_ref_serialization_omits_missing_parent() {
        let folder = FolderRef {
            id: "abc".to_string(),
            name: "Distributions".to_string(),
            parent_id: None,
        };
        let json = serde_json::to_string(&folder).unwrap();
        assert!(!json.contains("parentId"));
    }
}
