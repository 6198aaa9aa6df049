// OIDC authentication: cached identity tokens, silent refresh, browser login
mod callback;
mod login;
mod oidc;

pub use login::{AuthorizationFlow, BrowserLogin};
pub use oidc::{discovery_url, OidcClient, TokenEndpoint};

#[cfg(test)]
pub(crate) use login::{test_provider, MockAuthorizationFlow, RedirectingOpener};
#[cfg(test)]
pub(crate) use oidc::MockTokenEndpoint;

use crate::cache::{identity_token_key, CacheStore};
use crate::config::ProviderConfig;
use crate::error::{OidcError, Result};
use crate::models::IdentityToken;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Where a cached identity token stands before any network call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Missing,
    Valid(IdentityToken),
    Expired(IdentityToken),
}

impl TokenState {
    pub fn classify(cached: Option<IdentityToken>, now: DateTime<Utc>) -> Self {
        match cached {
            None => TokenState::Missing,
            Some(token) if token.is_valid_at(now) => TokenState::Valid(token),
            Some(token) => TokenState::Expired(token),
        }
    }
}

/// Result of trying to renew an expired token without user interaction
#[derive(Debug)]
enum RefreshOutcome {
    Refreshed(IdentityToken),
    NoRefreshToken,
    Failed(OidcError),
}

/// High-level authentication interface: returns a usable identity token,
/// refreshing or logging in again as needed.
pub struct AuthManager {
    endpoint: Arc<dyn TokenEndpoint>,
    login: Arc<dyn AuthorizationFlow>,
}

impl AuthManager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, login: Arc<dyn AuthorizationFlow>) -> Self {
        Self { endpoint, login }
    }

    /// Get an identity token for assuming `role_arn` through `provider`.
    ///
    /// A valid cached token is returned without any network call. An expired
    /// one is refreshed silently when possible; a failed refresh is not an
    /// error and leads to an interactive login instead. Any new token is
    /// written to the cache before it is returned.
    pub async fn get_oidc_token(
        &self,
        cache: &CacheStore,
        provider: &ProviderConfig,
        role_arn: &str,
    ) -> Result<IdentityToken> {
        let key = identity_token_key(&provider.name, role_arn);

        let cached = cache.get_identity_token(&key).unwrap_or_else(|e| {
            tracing::warn!("Could not read cached identity token: {}", e);
            None
        });

        let token = match TokenState::classify(cached, Utc::now()) {
            TokenState::Valid(token) => {
                tracing::debug!("Using cached identity token for {}", provider.name);
                return Ok(token);
            }
            TokenState::Missing => {
                tracing::debug!("No cached identity token for {}", provider.name);
                self.login.login(provider).await?
            }
            TokenState::Expired(token) => match self.refresh(provider, &token).await {
                RefreshOutcome::Refreshed(token) => token,
                RefreshOutcome::NoRefreshToken => {
                    tracing::info!("Identity token expired and no refresh token, logging in");
                    self.login.login(provider).await?
                }
                RefreshOutcome::Failed(e) => {
                    tracing::info!("Token refresh failed, falling back to interactive login: {}", e);
                    self.login.login(provider).await?
                }
            },
        };

        cache.put_identity_token(&key, token.clone())?;
        Ok(token)
    }

    async fn refresh(&self, provider: &ProviderConfig, token: &IdentityToken) -> RefreshOutcome {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return RefreshOutcome::NoRefreshToken;
        };

        tracing::debug!("Identity token expired, refreshing");
        match self.endpoint.refresh(provider, refresh_token).await {
            Ok(response) => match token.refreshed(response, Utc::now()) {
                Ok(token) => RefreshOutcome::Refreshed(token),
                Err(e) => RefreshOutcome::Failed(e),
            },
            Err(e) => RefreshOutcome::Failed(e),
        }
    }
}
