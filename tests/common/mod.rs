//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use drive_provisioner::client::DriveApi;
use drive_provisioner::error::{DriveError, Result};
use drive_provisioner::models::{DriveFolder, FolderRef, UploadTarget};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A fixed "now" so ages are exact
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// One Drive call as seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search { name: String, parent: Option<String> },
    Create { name: String, parent: Option<String> },
    Verify(String),
    Upload { name: String, parent: String },
    Permission { id: String, discoverable: bool },
    Delete(String),
    List(String),
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Call::Create { .. } | Call::Upload { .. } | Call::Permission { .. } | Call::Delete(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FakeFolder {
    pub id: String,
    pub name: String,
    pub parent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub trashed: bool,
}

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub id: String,
    pub name: String,
    pub parent: String,
}

#[derive(Default)]
struct DriveState {
    folders: Vec<FakeFolder>,
    files: Vec<FakeFile>,
    calls: Vec<Call>,
    next_id: u64,
    fail_delete: HashSet<String>,
    fail_create: HashSet<String>,
    fail_upload: HashSet<String>,
    fail_verify: bool,
    fail_list: bool,
}

impl DriveState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// In-memory Drive; clones share the same state
#[derive(Clone, Default)]
pub struct FakeDrive {
    state: Arc<Mutex<DriveState>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn DriveApi> {
        Box::new(self.clone())
    }

    pub fn add_folder(&self, name: &str, parent: Option<&str>, created_at: DateTime<Utc>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("folder");
        state.folders.push(FakeFolder {
            id: id.clone(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            created_at,
            trashed: false,
        });
        id
    }

    pub fn trash(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(folder) = state.folders.iter_mut().find(|f| f.id == id) {
            folder.trashed = true;
        }
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.state.lock().unwrap().fail_delete.insert(id.to_string());
    }

    pub fn fail_create_of(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    pub fn fail_upload_of(&self, name: &str) {
        self.state.lock().unwrap().fail_upload.insert(name.to_string());
    }

    pub fn fail_verification(&self) {
        self.state.lock().unwrap().fail_verify = true;
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .count()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Live (non-trashed) folders
    pub fn folders(&self) -> Vec<FakeFolder> {
        self.state
            .lock()
            .unwrap()
            .folders
            .iter()
            .filter(|f| !f.trashed)
            .cloned()
            .collect()
    }

    pub fn files(&self) -> Vec<FakeFile> {
        self.state.lock().unwrap().files.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl DriveApi for FakeDrive {
    async fn search_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Option<FolderRef>> {
        self.record(Call::Search {
            name: name.to_string(),
            parent: parent_id.map(str::to_string),
        });
        let state = self.state.lock().unwrap();
        Ok(state
            .folders
            .iter()
            .filter(|f| !f.trashed && f.name == name)
            .find(|f| parent_id.map_or(true, |p| f.parent.as_deref() == Some(p)))
            .map(|f| FolderRef {
                id: f.id.clone(),
                name: f.name.clone(),
                parent_id: f.parent.clone(),
            }))
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderRef> {
        self.record(Call::Create {
            name: name.to_string(),
            parent: parent_id.map(str::to_string),
        });
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(name) {
            return Err(DriveError::remote(500, r#"{"error":{"message":"backendError"}}"#));
        }
        let id = state.next_id("folder");
        state.folders.push(FakeFolder {
            id: id.clone(),
            name: name.to_string(),
            parent: parent_id.map(str::to_string),
            created_at: Utc::now(),
            trashed: false,
        });
        Ok(FolderRef {
            id,
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
        })
    }

    async fn verify_is_folder(&self, id: &str) -> Result<bool> {
        self.record(Call::Verify(id.to_string()));
        let state = self.state.lock().unwrap();
        if state.fail_verify {
            return Err(DriveError::Transport("connection reset".to_string()));
        }
        Ok(state.folders.iter().any(|f| f.id == id && !f.trashed))
    }

    async fn upload_file(&self, target: &UploadTarget) -> Result<String> {
        self.record(Call::Upload {
            name: target.desired_name.clone(),
            parent: target.remote_parent_id.clone(),
        });
        let mut state = self.state.lock().unwrap();
        if state.fail_upload.contains(&target.desired_name) {
            return Err(DriveError::remote(403, r#"{"error":{"message":"storageQuotaExceeded"}}"#));
        }
        let id = state.next_id("file");
        state.files.push(FakeFile {
            id: id.clone(),
            name: target.desired_name.clone(),
            parent: target.remote_parent_id.clone(),
        });
        Ok(id)
    }

    async fn set_public_read_permission(&self, id: &str, discoverable: bool) -> Result<()> {
        self.record(Call::Permission {
            id: id.to_string(),
            discoverable,
        });
        let state = self.state.lock().unwrap();
        let known = state.folders.iter().any(|f| f.id == id) || state.files.iter().any(|f| f.id == id);
        if known {
            Ok(())
        } else {
            Err(DriveError::remote(404, format!("File not found: {}", id)))
        }
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        self.record(Call::Delete(id.to_string()));
        let mut state = self.state.lock().unwrap();
        if state.fail_delete.contains(id) {
            return Err(DriveError::remote(
                403,
                r#"{"error":{"message":"insufficientFilePermissions"}}"#,
            ));
        }
        state.folders.retain(|f| f.id != id);
        state.files.retain(|f| f.id != id);
        Ok(())
    }

    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<DriveFolder>> {
        self.record(Call::List(parent_id.to_string()));
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(DriveError::remote(500, "backendError"));
        }
        Ok(state
            .folders
            .iter()
            .filter(|f| !f.trashed && f.parent.as_deref() == Some(parent_id))
            .map(|f| DriveFolder {
                id: f.id.clone(),
                name: f.name.clone(),
                created_at: f.created_at,
            })
            .collect())
    }
}
