//! OAuth2 session management for the Drive API
//!
//! [`OAuthSession`] owns the token lifecycle: it loads the stored record,
//! probes or refreshes it, and falls back to the interactive
//! authorization-code flow through a local [`CallbackListener`].

use async_trait::async_trait;
use chrono::Utc;
use hyper::Method;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::{debug, info, warn};
use url::Url;

use crate::callback::CallbackListener;
use crate::config::OAuthConfig;
use crate::credential_store::{CredentialStore, TokenRecord};
use crate::error::{DriveError, Result};
use crate::http::{HttpResponse, HttpTransport, RequestBuilder};

/// Full Drive access, needed to create, share and delete folders
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DRIVE_PROBE_URL: &str = "https://www.googleapis.com/drive/v3/about?fields=user";

/// OAuth client identity registered with the provider
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(config.client_id.clone(), config.client_secret.clone())
    }
}

/// Provider endpoints; overridable so tests can point at a local server
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub probe_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            probe_url: DRIVE_PROBE_URL.to_string(),
        }
    }
}

/// Observable lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoToken,
    Authenticated,
    Expired,
    Refreshing,
    Invalid,
    ReAuthenticating,
}

/// What the user has to see to grant access
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub redirect_uri: String,
    pub callback_addr: SocketAddr,
}

/// Shows the authorization URL to the user
///
/// Called after the callback listener is bound, so the redirect cannot race
/// the listener.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn present(&self, request: &AuthorizationRequest) -> Result<()>;
}

/// Prints the URL and optionally opens the system browser
pub struct ConsolePrompt {
    open_browser: bool,
}

impl ConsolePrompt {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

#[async_trait]
impl AuthorizationPrompt for ConsolePrompt {
    async fn present(&self, request: &AuthorizationRequest) -> Result<()> {
        println!("Open this URL in your browser to authorize access to Google Drive:\n");
        println!("  {}\n", request.url);
        println!("Waiting for the redirect on {} ...", request.redirect_uri);

        if self.open_browser {
            if let Err(e) = open::that(&request.url) {
                warn!("Could not open a browser automatically: {}", e);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Turn a token response into the record to persist, keeping the previous
    /// refresh token when the provider does not issue a new one
    fn into_record(self, previous_refresh: Option<String>, now_millis: i64) -> TokenRecord {
        TokenRecord {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expiry_epoch_millis: self.expires_in.map(|secs| now_millis + secs * 1000),
        }
    }
}

pub struct OAuthSession {
    transport: HttpTransport,
    store: CredentialStore,
    endpoints: OAuthEndpoints,
    callback_addr: SocketAddr,
    prompt: Box<dyn AuthorizationPrompt>,
    state: SessionState,
    record: Option<TokenRecord>,
    loaded: bool,
    verified: bool,
}

impl OAuthSession {
    pub fn new(
        transport: HttpTransport,
        store: CredentialStore,
        callback_addr: SocketAddr,
        prompt: Box<dyn AuthorizationPrompt>,
    ) -> Self {
        Self {
            transport,
            store,
            endpoints: OAuthEndpoints::default(),
            callback_addr,
            prompt,
            state: SessionState::NoToken,
            record: None,
            loaded: false,
            verified: false,
        }
    }

    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a usable access token, refreshing or re-authorizing as needed
    pub async fn get_access_token(&mut self, credentials: &ClientCredentials) -> Result<String> {
        if !self.loaded {
            self.record = self.store.load().await;
            self.loaded = true;
        }

        let record = match self.record.clone() {
            Some(record) => record,
            None => {
                debug!("No stored token, starting the authorization flow");
                return self.run_authorization_flow(credentials).await;
            }
        };

        if record.is_expired_at(Utc::now().timestamp_millis()) {
            self.transition(SessionState::Expired);
            return self.refresh(credentials, &record).await;
        }

        if self.verified {
            return Ok(record.access_token);
        }

        if self.probe(&record.access_token).await? {
            self.verified = true;
            self.transition(SessionState::Authenticated);
            return Ok(record.access_token);
        }

        self.transition(SessionState::Invalid);
        if record.refresh_token.is_some() {
            match self.refresh(credentials, &record).await {
                Ok(token) => return Ok(token),
                Err(DriveError::ReauthRequired(reason)) => {
                    debug!("Refresh after failed probe was rejected: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }

        self.reauthenticate(credentials).await
    }

    /// Force the interactive flow regardless of the stored token
    pub async fn reauthenticate(&mut self, credentials: &ClientCredentials) -> Result<String> {
        self.loaded = true;
        self.transition(SessionState::ReAuthenticating);
        self.run_authorization_flow(credentials).await
    }

    /// Forget the stored token; the next call starts from scratch
    pub async fn sign_out(&mut self) -> Result<()> {
        self.store.clear().await?;
        self.record = None;
        self.loaded = true;
        self.verified = false;
        self.transition(SessionState::NoToken);
        Ok(())
    }

    /// Build the provider URL the user visits to grant access
    pub fn authorization_url(
        &self,
        credentials: &ClientCredentials,
        redirect_uri: &str,
    ) -> Result<String> {
        let mut url = Url::parse(&self.endpoints.auth_url).map_err(|e| {
            DriveError::ConfigError(format!(
                "Invalid authorization URL {}: {}",
                self.endpoints.auth_url, e
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &credentials.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", DRIVE_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url.into())
    }

    async fn run_authorization_flow(&mut self, credentials: &ClientCredentials) -> Result<String> {
        let listener = CallbackListener::bind(self.callback_addr).await?;
        let redirect_uri = listener.redirect_uri()?;
        let request = AuthorizationRequest {
            url: self.authorization_url(credentials, &redirect_uri)?,
            redirect_uri: redirect_uri.clone(),
            callback_addr: listener.local_addr()?,
        };

        self.prompt.present(&request).await?;
        let code = listener.wait_for_code().await?;

        let response = self
            .token_request(&[
                ("code", code.as_str()),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        if !response.is_success() {
            return Err(DriveError::AuthorizationFailed(format!(
                "Token endpoint rejected the authorization code (HTTP {}): {}",
                response.status.as_u16(),
                response.text()
            )));
        }

        let token: TokenResponse = response.json()?;
        let record = token.into_record(None, Utc::now().timestamp_millis());
        if record.refresh_token.is_none() {
            warn!("Authorization response did not include a refresh token");
        }
        self.store.save(&record).await?;
        info!("Authorization complete, token saved to {:?}", self.store.path());
        Ok(self.adopt(record))
    }

    async fn refresh(&mut self, credentials: &ClientCredentials, record: &TokenRecord) -> Result<String> {
        let refresh_token = match record.refresh_token.clone() {
            Some(token) => token,
            None => {
                self.transition(SessionState::Invalid);
                return Err(DriveError::ReauthRequired(
                    "stored token has no refresh token".to_string(),
                ));
            }
        };

        self.transition(SessionState::Refreshing);
        let response = self
            .token_request(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .await?;

        if !response.is_success() {
            self.transition(SessionState::Invalid);
            return Err(DriveError::ReauthRequired(format!(
                "token endpoint rejected the refresh (HTTP {}): {}",
                response.status.as_u16(),
                response.text()
            )));
        }

        let token: TokenResponse = response.json()?;
        let updated = token.into_record(Some(refresh_token), Utc::now().timestamp_millis());
        self.store.save(&updated).await?;
        debug!("Access token refreshed");
        Ok(self.adopt(updated))
    }

    /// Ask the Drive API whether the token is still accepted
    async fn probe(&self, access_token: &str) -> Result<bool> {
        let url = Url::parse(&self.endpoints.probe_url).map_err(|e| {
            DriveError::ConfigError(format!("Invalid probe URL {}: {}", self.endpoints.probe_url, e))
        })?;
        let request = RequestBuilder::new(Method::GET, url)
            .bearer(access_token)
            .build()?;
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| DriveError::AuthTransport(e.to_string()))?;

        if !response.is_success() {
            debug!("Stored token rejected by probe (HTTP {})", response.status.as_u16());
        }
        Ok(response.is_success())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let url = Url::parse(&self.endpoints.token_url).map_err(|e| {
            DriveError::ConfigError(format!("Invalid token URL {}: {}", self.endpoints.token_url, e))
        })?;
        let request = RequestBuilder::new(Method::POST, url).form(form).build()?;
        self.transport
            .send(request)
            .await
            .map_err(|e| DriveError::AuthTransport(e.to_string()))
    }

    fn adopt(&mut self, record: TokenRecord) -> String {
        let token = record.access_token.clone();
        self.record = Some(record);
        self.verified = true;
        self.transition(SessionState::Authenticated);
        token
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("OAuth session {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
