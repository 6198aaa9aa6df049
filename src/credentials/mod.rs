// Exchange of identity tokens for temporary AWS credentials
mod sts;

pub use sts::StsFederation;

use crate::config::{ProviderConfig, MAX_SESSION_DURATION_SECONDS, MIN_SESSION_DURATION_SECONDS};
use crate::error::Result;
use crate::models::{CloudCredential, IdentityToken};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// STS limit on RoleSessionName
const MAX_SESSION_NAME_LEN: usize = 64;

/// Parameters of one AssumeRoleWithWebIdentity call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub web_identity_token: String,
    pub duration_seconds: i32,
    pub region: String,
}

/// A web-identity federation endpoint (AWS STS)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WebIdentityFederation: Send + Sync {
    /// Perform exactly one federation call. Failures are reported as
    /// [`crate::error::OidcError::Federation`] carrying the provider's message.
    async fn assume_role(&self, request: FederationRequest) -> Result<CloudCredential>;
}

/// Turns a valid identity token into role credentials
pub struct CredentialExchanger {
    federation: Arc<dyn WebIdentityFederation>,
    username: String,
}

impl CredentialExchanger {
    pub fn new(federation: Arc<dyn WebIdentityFederation>) -> Self {
        Self::with_username(federation, local_username())
    }

    pub fn with_username(federation: Arc<dyn WebIdentityFederation>, username: impl Into<String>) -> Self {
        Self {
            federation,
            username: username.into(),
        }
    }

    /// Exchange `token` for credentials of `role_arn`.
    ///
    /// `requested_seconds` is clamped against the provider's configured
    /// maximum; the credential's expiry is whatever STS reports.
    pub async fn exchange(
        &self,
        provider: &ProviderConfig,
        token: &IdentityToken,
        role_arn: &str,
        requested_seconds: i64,
    ) -> Result<CloudCredential> {
        let request = FederationRequest {
            role_arn: role_arn.to_string(),
            role_session_name: session_name(&self.username, role_arn, &provider.name),
            web_identity_token: token.id_token.clone(),
            duration_seconds: resolve_duration(requested_seconds, provider.max_session_duration_seconds),
            region: provider.sts_region().to_string(),
        };

        tracing::info!(
            "Requesting AWS credentials for {} as {} ({}s)",
            request.role_arn,
            request.role_session_name,
            request.duration_seconds
        );
        self.federation.assume_role(request).await
    }
}

/// Segment of a role ARN after the last `/`
pub fn role_short_name(role_arn: &str) -> Option<&str> {
    role_arn
        .rsplit_once('/')
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
}

/// `<user>@<role short name>`, restricted to what STS accepts.
/// Falls back to the provider name when the role has no path.
pub fn session_name(username: &str, role_arn: &str, provider_name: &str) -> String {
    let role = role_short_name(role_arn).unwrap_or(provider_name);
    let raw = format!("{}@{}", normalize_username(username), role);

    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .take(MAX_SESSION_NAME_LEN)
        .collect()
}

/// Strip a Windows `DOMAIN\` prefix, upper-casing the remaining account name
pub fn normalize_username(username: &str) -> String {
    match username.split_once('\\') {
        Some((_, user)) => user.to_uppercase(),
        None => username.to_string(),
    }
}

/// Name of the local OS user
pub fn local_username() -> String {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Clamp a requested duration to `[900, ceiling]`. Zero or anything above the
/// ceiling means "as long as allowed". The ceiling itself is kept within the
/// STS range.
pub fn resolve_duration(requested_seconds: i64, ceiling_seconds: i64) -> i32 {
    let ceiling = ceiling_seconds.clamp(MIN_SESSION_DURATION_SECONDS, MAX_SESSION_DURATION_SECONDS);

    let seconds = if requested_seconds <= 0 || requested_seconds > ceiling {
        ceiling
    } else {
        requested_seconds.max(MIN_SESSION_DURATION_SECONDS)
    };

    // Bounded by MAX_SESSION_DURATION_SECONDS
    seconds as i32
}
