use crate::config::ProviderConfig;
use crate::error::{OidcError, Result};
use crate::models::TokenResponse;
use async_trait::async_trait;
use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// The OAuth2 token endpoint of an OIDC provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeem an authorization code (`authorization_code` grant)
    async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse>;

    /// Obtain fresh tokens with a refresh token (`refresh_token` grant).
    /// Failures are reported as [`OidcError::Refresh`].
    async fn refresh(&self, provider: &ProviderConfig, refresh_token: &str)
        -> Result<TokenResponse>;
}

/// Endpoints advertised by an OIDC discovery document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

/// URL of the discovery document for `server`. A bare host name is assumed
/// to be served over https.
pub fn discovery_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("https://") || server.starts_with("http://") {
        format!("{}/{}", server, DISCOVERY_PATH)
    } else {
        format!("https://{}/{}", server, DISCOVERY_PATH)
    }
}

/// HTTP client for the provider's token and discovery endpoints
pub struct OidcClient {
    http: reqwest::Client,
}

impl OidcClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Fetch the provider's discovery document
    pub async fn discover(&self, server: &str) -> Result<ProviderMetadata> {
        let url = discovery_url(server);
        tracing::debug!("Fetching OIDC discovery document from {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| OidcError::Http(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OidcError::Http(format!(
                "Discovery document request to {} returned HTTP {}",
                url, status
            )));
        }

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| OidcError::Http(format!("Invalid discovery document at {}: {}", url, e)))
    }

    /// POST a grant to the token endpoint. Errors carry the provider's
    /// response verbatim.
    async fn request_token(
        &self,
        provider: &ProviderConfig,
        grant: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, String> {
        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("client_id", provider.client_id.as_str()));
        if !provider.client_secret.is_empty() {
            form.push(("client_secret", provider.client_secret.as_str()));
        }

        let response = self
            .http
            .post(&provider.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", provider.token_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read token response: {}", e))?;

        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status, body));
        }

        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {}", e))
    }
}

impl Default for OidcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenEndpoint for OidcClient {
    async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        tracing::debug!("Exchanging authorization code at {}", provider.token_url);
        self.request_token(
            provider,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
        .map_err(|e| OidcError::Authorization(format!("Error during token exchange: {}", e)))
    }

    async fn refresh(
        &self,
        provider: &ProviderConfig,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        tracing::debug!("Refreshing tokens at {}", provider.token_url);
        self.request_token(
            provider,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
        .map_err(OidcError::Refresh)
    }
}
