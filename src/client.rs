//! Drive v3 REST client
//!
//! Every operation is a single request carrying the bearer token, except the
//! paginated child listing. Non-2xx responses become
//! [`DriveError::RemoteApi`] with the raw body; nothing is retried here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::error::{DriveError, Result};
use crate::http::{endpoint, HttpResponse, HttpTransport, RequestBuilder};
use crate::models::{DriveFolder, FolderRef, UploadTarget, FOLDER_MIME_TYPE};

/// Boundary separating the metadata and content parts of an upload
pub const MULTIPART_BOUNDARY: &str = "drive_provisioner_boundary";

const LIST_PAGE_SIZE: &str = "1000";

/// Trait defining Drive operations for easier testing
#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Find a non-trashed folder by exact name, optionally scoped to a parent.
    /// When several match, the first one returned wins.
    async fn search_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Option<FolderRef>>;

    /// Create a folder, at the top level when `parent_id` is `None`
    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderRef>;

    /// True when the ID names an existing, non-trashed folder
    async fn verify_is_folder(&self, id: &str) -> Result<bool>;

    /// Upload a local file and return the new file ID
    async fn upload_file(&self, target: &UploadTarget) -> Result<String>;

    /// Grant read access to anyone with the link
    async fn set_public_read_permission(&self, id: &str, discoverable: bool) -> Result<()>;

    /// Delete a file or folder
    async fn delete_item(&self, id: &str) -> Result<()>;

    /// All non-trashed child folders of a parent, across pages
    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<DriveFolder>>;
}

/// Base URLs of the Drive API
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub api_base: String,
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

impl DriveEndpoints {
    /// Both bases under one root, as served by a local mock server
    pub fn local(root: &str) -> Self {
        let root = root.trim_end_matches('/');
        Self {
            api_base: format!("{}/drive/v3", root),
            upload_base: format!("{}/upload/drive/v3", root),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    trashed: bool,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
}

impl FileResource {
    fn into_folder_ref(self) -> FolderRef {
        FolderRef {
            id: self.id,
            name: self.name,
            parent_id: self.parents.into_iter().next(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Production implementation of DriveApi
pub struct DriveClient {
    transport: HttpTransport,
    access_token: String,
    endpoints: DriveEndpoints,
}

impl DriveClient {
    pub fn new(transport: HttpTransport, access_token: impl Into<String>) -> Self {
        Self {
            transport,
            access_token: access_token.into(),
            endpoints: DriveEndpoints::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: DriveEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn api_url(&self, path: &str) -> Result<Url> {
        endpoint(&self.endpoints.api_base, path)
    }

    fn file_url(&self, id: &str, suffix: &str) -> Result<Url> {
        let mut url = self.api_url("files")?;
        url.path_segments_mut()
            .map_err(|_| DriveError::ConfigError("Drive API base cannot hold a path".to_string()))?
            .push(id)
            .extend(suffix.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<HttpResponse> {
        let request = request.bearer(&self.access_token).build()?;
        self.transport
            .send(request)
            .await
            .map_err(|e| DriveError::Transport(e.to_string()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<HttpResponse> {
        self.send(request).await?.error_for_status()
    }
}

#[async_trait]
impl DriveApi for DriveClient {
    async fn search_folder(&self, name: &str, parent_id: Option<&str>) -> Result<Option<FolderRef>> {
        let mut query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query_value(name),
            FOLDER_MIME_TYPE
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
        }

        let mut url = self.api_url("files")?;
        url.query_pairs_mut()
            .append_pair("q", &query)
            .append_pair("fields", "files(id,name,parents)")
            .append_pair("spaces", "drive");

        debug!("Searching for folder '{}' (parent: {:?})", name, parent_id);
        let list: FileList = self
            .execute(RequestBuilder::new(Method::GET, url))
            .await?
            .json()?;

        Ok(list.files.into_iter().next().map(FileResource::into_folder_ref))
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<FolderRef> {
        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = json!([parent]);
        }

        let mut url = self.api_url("files")?;
        url.query_pairs_mut().append_pair("fields", "id,name,parents");

        let created: FileResource = self
            .execute(RequestBuilder::new(Method::POST, url).json(&metadata)?)
            .await?
            .json()?;

        info!("Created folder '{}' ({})", name, created.id);
        let mut folder = created.into_folder_ref();
        if folder.name.is_empty() {
            folder.name = name.to_string();
        }
        if folder.parent_id.is_none() {
            folder.parent_id = parent_id.map(str::to_string);
        }
        Ok(folder)
    }

    async fn verify_is_folder(&self, id: &str) -> Result<bool> {
        let mut url = self.file_url(id, "")?;
        url.query_pairs_mut().append_pair("fields", "id,mimeType,trashed");

        let response = self.send(RequestBuilder::new(Method::GET, url)).await?;
        if response.status == StatusCode::NOT_FOUND {
            debug!("Folder {} not found", id);
            return Ok(false);
        }

        let file: FileResource = response.error_for_status()?.json()?;
        Ok(!file.trashed && file.mime_type.as_deref() == Some(FOLDER_MIME_TYPE))
    }

    async fn upload_file(&self, target: &UploadTarget) -> Result<String> {
        let content = tokio::fs::read(&target.local_path).await?;
        let metadata = json!({
            "name": target.desired_name,
            "parents": [target.remote_parent_id],
        });
        let body = build_multipart_body(&serde_json::to_string(&metadata)?, &content);

        let mut url = endpoint(&self.endpoints.upload_base, "files")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id");

        debug!(
            "Uploading {:?} as '{}' ({} bytes)",
            target.local_path,
            target.desired_name,
            content.len()
        );
        let uploaded: FileResource = self
            .execute(RequestBuilder::new(Method::POST, url).raw(
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
                body,
            ))
            .await?
            .json()?;

        info!("Uploaded '{}' ({})", target.desired_name, uploaded.id);
        Ok(uploaded.id)
    }

    async fn set_public_read_permission(&self, id: &str, discoverable: bool) -> Result<()> {
        let permission = json!({
            "role": "reader",
            "type": "anyone",
            "allowFileDiscovery": discoverable,
        });
        let url = self.file_url(id, "permissions")?;
        self.execute(RequestBuilder::new(Method::POST, url).json(&permission)?)
            .await?;
        debug!("Granted public read on {} (discoverable: {})", id, discoverable);
        Ok(())
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        let url = self.file_url(id, "")?;
        self.execute(RequestBuilder::new(Method::DELETE, url)).await?;
        debug!("Deleted {}", id);
        Ok(())
    }

    async fn list_child_folders(&self, parent_id: &str) -> Result<Vec<DriveFolder>> {
        let query = format!(
            "'{}' in parents and mimeType = '{}' and trashed = false",
            escape_query_value(parent_id),
            FOLDER_MIME_TYPE
        );

        let mut folders = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.api_url("files")?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs
                    .append_pair("q", &query)
                    .append_pair("fields", "nextPageToken,files(id,name,createdTime)")
                    .append_pair("pageSize", LIST_PAGE_SIZE);
                if let Some(token) = &page_token {
                    pairs.append_pair("pageToken", token);
                }
            }

            let page: FileList = self
                .execute(RequestBuilder::new(Method::GET, url))
                .await?
                .json()?;

            for file in page.files {
                let created_at = file.created_time.ok_or_else(|| {
                    DriveError::InvalidResponse(format!("Folder {} has no createdTime", file.id))
                })?;
                folders.push(DriveFolder {
                    id: file.id,
                    name: file.name,
                    created_at,
                });
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} child folders of {}", folders.len(), parent_id);
        Ok(folders)
    }
}

/// Escape a value for use inside a single-quoted Drive query literal
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Assemble a multipart/related upload body: JSON metadata first, then the
/// raw content, then the closing boundary
pub fn build_multipart_body(metadata_json: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata_json.len() + content.len() + 192);

    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");

    body.extend_from_slice(format!("--{}--", MULTIPART_BOUNDARY).as_bytes());
    body
}
