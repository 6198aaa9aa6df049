// AWS Console federation and URL generation
use crate::error::{OidcError, Result};
use crate::models::CloudCredential;
use serde::Deserialize;
use serde_json::json;

pub const FEDERATION_ENDPOINT: &str = "https://signin.aws.amazon.com/federation";
const DEFAULT_CONSOLE_REGION: &str = "us-east-1";
const ISSUER: &str = "aws-cli-oidc";

#[derive(Debug, Deserialize)]
struct SigninTokenResponse {
    #[serde(rename = "SigninToken")]
    signin_token: Option<String>,
}

/// Client for the AWS sign-in federation endpoint
pub struct ConsoleSignIn {
    http: reqwest::Client,
    federation_url: String,
}

impl ConsoleSignIn {
    pub fn new() -> Self {
        Self::with_endpoint(FEDERATION_ENDPOINT)
    }

    pub fn with_endpoint(federation_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            federation_url: federation_url.into(),
        }
    }

    /// Trade temporary credentials for a console sign-in token
    pub async fn signin_token(&self, creds: &CloudCredential) -> Result<String> {
        let session = json!({
            "sessionId": creds.access_key_id,
            "sessionKey": creds.secret_access_key,
            "sessionToken": creds.session_token,
        })
        .to_string();

        tracing::debug!("Requesting sign-in token from AWS federation endpoint");
        let response = self
            .http
            .get(&self.federation_url)
            .query(&[("Action", "getSigninToken"), ("Session", session.as_str())])
            .send()
            .await
            .map_err(|e| OidcError::Http(format!("Failed to get sign-in token: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OidcError::Http(format!(
                "Sign-in token request returned HTTP {}: {}",
                status, body
            )));
        }

        let parsed: SigninTokenResponse = response
            .json()
            .await
            .map_err(|e| OidcError::Http(format!("Failed to parse sign-in token response: {}", e)))?;

        parsed
            .signin_token
            .ok_or_else(|| OidcError::Http("Response does not contain a sign-in token".to_string()))
    }

    /// Build the console login URL for a sign-in token
    pub fn login_url(&self, signin_token: &str, region: Option<&str>) -> String {
        let destination = format!(
            "https://console.aws.amazon.com/?region={}",
            region.unwrap_or(DEFAULT_CONSOLE_REGION)
        );

        format!(
            "{}?Action=login&Issuer={}&Destination={}&SigninToken={}",
            self.federation_url,
            ISSUER,
            urlencoding::encode(&destination),
            urlencoding::encode(signin_token)
        )
    }

    /// Generate an AWS Console sign-in URL from temporary credentials
    pub async fn console_url(&self, creds: &CloudCredential, region: Option<&str>) -> Result<String> {
        let token = self.signin_token(creds).await?;
        Ok(self.login_url(&token, region))
    }
}

impl Default for ConsoleSignIn {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the AWS Console in the default browser
pub fn open_console(url: &str) -> Result<()> {
    tracing::info!("Opening AWS Console in browser");
    webbrowser::open(url).map_err(|e| OidcError::BrowserLaunchFailed(e.to_string()))
}
