//! Drive Provisioner
//!
//! Provisions and tears down the Google Drive folder tree used to distribute
//! build artifacts per event and model.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 authorization-code flow with a local callback
//!   listener, token persistence, validity probing and refresh
//! - **Provisioning**: search-or-create folders, upload files and issue
//!   public links, with an explicit rollback of what a run created
//! - **Retention**: list dated event folders and delete the stale ones, in
//!   dry-run or execute mode, collecting per-folder failures
//!
//! # Example Usage
//!
//! ```no_run
//! use drive_provisioner::auth::{ClientCredentials, ConsolePrompt, OAuthSession};
//! use drive_provisioner::client::DriveClient;
//! use drive_provisioner::config::{default_hint_path, default_token_path, Config};
//! use drive_provisioner::credential_store::CredentialStore;
//! use drive_provisioner::folder_hint::FileFolderHintStore;
//! use drive_provisioner::http::HttpTransport;
//! use drive_provisioner::provisioner::ResourceProvisioner;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let transport = HttpTransport::new()?;
//!
//!     let mut session = OAuthSession::new(
//!         transport.clone(),
//!         CredentialStore::new(default_token_path()),
//!         ([127, 0, 0, 1], config.oauth.callback_port).into(),
//!         Box::new(ConsolePrompt::new(true)),
//!     );
//!     let token = session
//!         .get_access_token(&ClientCredentials::from_config(&config.oauth))
//!         .await?;
//!
//!     let mut provisioner = ResourceProvisioner::new(
//!         Box::new(DriveClient::new(transport, token)),
//!         Box::new(FileFolderHintStore::new(default_hint_path())),
//!         config.drive.root_folder_name.clone(),
//!     );
//!     let root = provisioner.resolve_root_folder().await?;
//!     let event = provisioner.ensure_child_folder(&root.id, "2024 Spring").await?;
//!     println!("{}", provisioner.publish_folder(&event.id).await?);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 session state machine
//! - [`callback`] - One-shot local listener for the OAuth redirect
//! - [`cleaner`] - Retention-based cleanup of event folders
//! - [`cli`] - Command-line interface and report rendering
//! - [`client`] - Drive v3 REST client behind the [`client::DriveApi`] trait
//! - [`config`] - Configuration management
//! - [`credential_store`] - Token file persistence
//! - [`error`] - Error types and result aliases
//! - [`folder_hint`] - Remembered root folder ID
//! - [`http`] - Shared HTTPS transport
//! - [`models`] - Core data structures
//! - [`provisioner`] - Idempotent folder provisioning and publishing
//! - [`throttle`] - Randomized pause between mutating calls

pub mod auth;
pub mod callback;
pub mod cleaner;
pub mod cli;
pub mod client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod folder_hint;
pub mod http;
pub mod models;
pub mod provisioner;
pub mod throttle;

pub use auth::{ClientCredentials, OAuthSession, SessionState};
pub use cleaner::RetentionCleaner;
pub use client::{DriveApi, DriveClient};
pub use config::Config;
pub use credential_store::{CredentialStore, TokenRecord};
pub use error::{DriveError, ErrorKind, Result};
pub use models::*;
pub use provisioner::ResourceProvisioner;
