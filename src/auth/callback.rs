// One-shot loopback listener for the OAuth2 login redirect
use crate::error::{OidcError, Result};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Time the server gets to finish sending the result page before it is dropped
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<String>,
    // Taken by the first request; later requests only get a page
    sender: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

/// Loopback HTTP listener bound before the browser is sent to the provider
pub struct CallbackServer {
    listener: TcpListener,
    redirect_uri: String,
}

impl CallbackServer {
    /// Bind on 127.0.0.1, on `port` or an ephemeral port when `None`
    pub async fn bind(port: Option<u16>) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port.unwrap_or(0)));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            OidcError::Authorization(format!(
                "Cannot start local http server on {} to handle login redirect: {}",
                addr, e
            ))
        })?;

        let local_addr = listener.local_addr()?;
        tracing::debug!("Login callback listener bound on {}", local_addr);

        Ok(Self {
            listener,
            redirect_uri: format!("http://{}/", local_addr),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Serve until the first redirect arrives and return its authorization
    /// code, or an empty string when the redirect carried an error or a
    /// foreign `state`. Waits forever unless `timeout` is given.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Option<Duration>) -> Result<String> {
        let (code_tx, code_rx) = oneshot::channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            expected_state: Arc::new(expected_state.to_string()),
            sender: Arc::new(Mutex::new(Some(code_tx))),
        };
        let app = Router::new()
            .route("/", get(handle_callback))
            .with_state(state);

        let listener = self.listener;
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, code_rx)
                .await
                .map_err(|_| OidcError::LoginTimeout(limit.as_secs())),
            None => Ok(code_rx.await),
        };

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => tracing::debug!("Login callback listener stopped"),
            Ok(Ok(Err(e))) => tracing::debug!("Login callback listener failed: {}", e),
            Ok(Err(e)) => tracing::debug!("Login callback task failed: {}", e),
            Err(_) => {
                tracing::debug!("Login callback listener still busy after grace period, aborting");
                server.abort();
            }
        }

        received?.map_err(|_| {
            OidcError::Authorization("Login callback listener stopped unexpectedly".to_string())
        })
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    query: std::result::Result<Query<CallbackParams>, QueryRejection>,
) -> impl IntoResponse {
    let code = match query {
        Ok(Query(params)) => code_from_params(params, &state.expected_state),
        Err(rejection) => {
            tracing::warn!("Ignoring malformed login redirect: {}", rejection);
            String::new()
        }
    };

    let message = if code.is_empty() {
        "Login failed"
    } else {
        "Login successful"
    };

    let sender = state.sender.lock().ok().and_then(|mut slot| slot.take());
    if let Some(sender) = sender {
        let _ = sender.send(code);
    }

    (
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Html(format!(
            "<!DOCTYPE html>\n<html>\n<body>\n{}\n</body>\n</html>\n",
            message
        )),
    )
}

/// The authorization code, or empty when the provider reported an error or
/// the `state` is not ours
fn code_from_params(params: CallbackParams, expected_state: &str) -> String {
    if let Some(error) = params.error.as_deref() {
        tracing::warn!(
            "Provider returned an error to the login redirect: {} {}",
            error,
            params.error_description.as_deref().unwrap_or("")
        );
        String::new()
    } else if params.state.as_deref() != Some(expected_state) {
        tracing::warn!("Ignoring login redirect with unexpected state parameter");
        String::new()
    } else {
        params.code.unwrap_or_default()
    }
}
