//! One-shot local HTTP listener receiving the OAuth redirect
//!
//! The listener resolves exactly once: the first request to `/` carrying a
//! `code` or an `error` query parameter settles the pending outcome and
//! cancels the shutdown token, which closes the socket. Every other request
//! gets a 404 and the listener keeps waiting.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DriveError, Result};

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>Authorization complete</title></head>\
<body><h1>Authorization complete</h1><p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><title>Authorization failed</title></head>\
<body><h1>Authorization failed</h1><p>Access was not granted. Return to the terminal for details.</p></body></html>";

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html><html><body><h1>Not found</h1></body></html>";

/// Terminal result of the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
enum CallbackOutcome {
    Code(String),
    Denied(String),
}

/// The pending outcome; the sender is taken by whichever request settles it
struct Pending {
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
    shutdown: CancellationToken,
}

impl Pending {
    fn take_sender(&self) -> Option<oneshot::Sender<CallbackOutcome>> {
        match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Settle the outcome and stop listening; false if already settled
    fn resolve(&self, outcome: CallbackOutcome) -> bool {
        match self.take_sender() {
            Some(sender) => {
                let _ = sender.send(outcome);
                self.shutdown.cancel();
                true
            }
            None => false,
        }
    }
}

/// Local listener bound before the authorization URL is shown
pub struct CallbackListener {
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl CallbackListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            DriveError::AuthorizationFailed(format!(
                "Failed to bind OAuth callback listener on {}: {}",
                addr, e
            ))
        })?;
        debug!("OAuth callback listener bound on {}", addr);
        Ok(Self {
            listener,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Redirect URI registered with the authorization request
    pub fn redirect_uri(&self) -> Result<String> {
        Ok(format!("http://localhost:{}", self.local_addr()?.port()))
    }

    /// Token cancelled once the listener stops; cancelling it from outside
    /// abandons the wait
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve requests until the first terminal outcome, then stop
    pub async fn wait_for_code(self) -> Result<String> {
        let CallbackListener { listener, shutdown } = self;
        let (sender, receiver) = oneshot::channel();
        let pending = Arc::new(Pending {
            sender: Mutex::new(Some(sender)),
            shutdown: shutdown.clone(),
        });

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("OAuth callback connection from {}", peer);
                        let pending = Arc::clone(&pending);
                        tokio::spawn(async move {
                            let service = service_fn(move |request: Request<Incoming>| {
                                let pending = Arc::clone(&pending);
                                async move { Ok::<_, Infallible>(handle_request(&request, &pending)) }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                debug!("OAuth callback connection ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => warn!("OAuth callback accept failed: {}", e),
                },
            }
        }

        // Close the socket before waiting so later requests are refused
        drop(listener);
        // Cancelled from outside: drop the sender so the receiver wakes up
        drop(pending.take_sender());

        match receiver.await {
            Ok(CallbackOutcome::Code(code)) => {
                info!("Received OAuth authorization code");
                Ok(code)
            }
            Ok(CallbackOutcome::Denied(reason)) => Err(DriveError::AuthorizationFailed(format!(
                "Authorization was denied: {}",
                reason
            ))),
            Err(_) => Err(DriveError::AuthorizationFailed(
                "OAuth callback listener stopped before a redirect arrived".to_string(),
            )),
        }
    }
}

fn handle_request(request: &Request<Incoming>, pending: &Pending) -> Response<Full<Bytes>> {
    if request.uri().path() != "/" {
        return page(StatusCode::NOT_FOUND, NOT_FOUND_PAGE);
    }

    let mut code = None;
    let mut error = None;
    if let Some(query) = request.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" if !value.is_empty() => code = Some(value.into_owned()),
                "error" if !value.is_empty() => error = Some(value.into_owned()),
                _ => {}
            }
        }
    }

    if let Some(code) = code {
        if pending.resolve(CallbackOutcome::Code(code)) {
            return page(StatusCode::OK, SUCCESS_PAGE);
        }
    } else if let Some(error) = error {
        if pending.resolve(CallbackOutcome::Denied(error)) {
            return page(StatusCode::OK, FAILURE_PAGE);
        }
    }

    page(StatusCode::NOT_FOUND, NOT_FOUND_PAGE)
}

fn page(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}
