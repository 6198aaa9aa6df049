use super::{FederationRequest, WebIdentityFederation};
use crate::error::{OidcError, Result};
use crate::models::CloudCredential;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, TimeZone, Utc};

/// AssumeRoleWithWebIdentity against AWS STS.
///
/// The call is authenticated by the identity token alone, so the SDK is
/// configured without any AWS credentials.
#[derive(Debug, Default)]
pub struct StsFederation;

impl StsFederation {
    pub fn new() -> Self {
        Self
    }

    async fn client(region: &str) -> StsClient {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .no_credentials()
            .load()
            .await;

        StsClient::new(&config)
    }
}

fn to_chrono(timestamp: &aws_smithy_types::DateTime) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp.secs(), timestamp.subsec_nanos())
        .single()
        .ok_or_else(|| OidcError::Federation("Invalid expiration timestamp".to_string()))
}

#[async_trait]
impl WebIdentityFederation for StsFederation {
    async fn assume_role(&self, request: FederationRequest) -> Result<CloudCredential> {
        tracing::debug!("Calling AWS STS AssumeRoleWithWebIdentity in {}", request.region);

        let client = Self::client(&request.region).await;
        let response = client
            .assume_role_with_web_identity()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name)
            .web_identity_token(&request.web_identity_token)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|e| OidcError::Federation(DisplayErrorContext(&e).to_string()))?;

        let creds = response
            .credentials()
            .ok_or_else(|| OidcError::Federation("AWS STS returned no credentials".to_string()))?;

        let principal_arn = response
            .assumed_role_user()
            .map(|user| user.arn().to_string())
            .unwrap_or_default();

        tracing::debug!("Obtained AWS credentials for {}", principal_arn);

        Ok(CloudCredential {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration: to_chrono(creds.expiration())?,
            principal_arn,
        })
    }
}
