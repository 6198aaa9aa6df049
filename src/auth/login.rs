use super::callback::CallbackServer;
use super::oidc::TokenEndpoint;
use crate::config::ProviderConfig;
use crate::error::{OidcError, Result};
use crate::models::IdentityToken;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

const SCOPES: &str = "openid email";

/// Interactive login producing a fresh identity token
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    async fn login(&self, provider: &ProviderConfig) -> Result<IdentityToken>;
}

/// Something that can show a URL to the user
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs in the user's default browser
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        webbrowser::open(url)
    }
}

/// Build the provider's authorization URL for the code grant
pub fn authorization_url(provider: &ProviderConfig, redirect_uri: &str, state: &str) -> String {
    let separator = if provider.authorization_url.contains('?') {
        '&'
    } else {
        '?'
    };

    format!(
        "{}{}client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
        provider.authorization_url,
        separator,
        urlencoding::encode(&provider.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(SCOPES),
        urlencoding::encode(state),
    )
}

/// Authorization-code login through the system browser and a loopback redirect
pub struct BrowserLogin {
    endpoint: Arc<dyn TokenEndpoint>,
    opener: Box<dyn UrlOpener>,
    headless: bool,
}

impl BrowserLogin {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, headless: bool) -> Self {
        Self::with_opener(endpoint, Box::new(SystemBrowser), headless)
    }

    pub fn with_opener(
        endpoint: Arc<dyn TokenEndpoint>,
        opener: Box<dyn UrlOpener>,
        headless: bool,
    ) -> Self {
        Self {
            endpoint,
            opener,
            headless,
        }
    }

    /// Print the login URL and, outside headless sessions, try to open it.
    /// Failing to launch a browser is not fatal: the user can open the URL.
    fn display_authorization_prompt(&self, provider: &ProviderConfig, url: &str) {
        eprintln!("\n=== Login to {} ===", provider.name);

        if self.headless {
            eprintln!("Running in headless mode - please open this URL in a browser:");
            eprintln!("  {}", url);
        } else {
            eprintln!("Opening browser to log in. If it doesn't open automatically, visit:");
            eprintln!("  {}", url);

            if let Err(e) = self.opener.open(url) {
                eprintln!("Could not open browser automatically: {}", e);
                eprintln!("Please open the URL manually.");
            }
        }

        eprintln!("\nWaiting for login to complete...");
    }
}

#[async_trait]
impl AuthorizationFlow for BrowserLogin {
    async fn login(&self, provider: &ProviderConfig) -> Result<IdentityToken> {
        let server = CallbackServer::bind(provider.redirect_port).await?;
        let redirect_uri = server.redirect_uri().to_string();
        let state = Uuid::new_v4().to_string();

        let url = authorization_url(provider, &redirect_uri, &state);
        self.display_authorization_prompt(provider, &url);

        let timeout = provider.login_timeout_seconds.map(Duration::from_secs);
        let code = server.wait_for_code(&state, timeout).await?;
        if code.is_empty() {
            return Err(OidcError::Authorization(
                "No authorization code received from the login redirect".to_string(),
            ));
        }

        let response = self
            .endpoint
            .exchange_code(provider, &code, &redirect_uri)
            .await?;
        tracing::info!("Login to {} successful", provider.name);

        IdentityToken::from_code_response(response, Utc::now())
    }
}

/// Plays the browser in tests: follows the authorization URL straight to the
/// redirect URI with a fixed code and the state it was given.
#[cfg(test)]
pub(crate) struct RedirectingOpener {
    pub query: String,
    pub fail_launch: bool,
}

#[cfg(test)]
impl RedirectingOpener {
    pub fn with_code(code: &str) -> Self {
        Self {
            query: format!("code={}", code),
            fail_launch: false,
        }
    }
}

#[cfg(test)]
impl UrlOpener for RedirectingOpener {
    fn open(&self, url: &str) -> std::io::Result<()> {
        let parsed = reqwest::Url::parse(url).expect("authorization url");
        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .expect("query parameter")
        };
        let target = format!("{}?{}&state={}", param("redirect_uri"), self.query, param("state"));

        tokio::spawn(async move {
            let _ = reqwest::get(target).await;
        });

        if self.fail_launch {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no browser"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
pub(crate) fn test_provider(token_url: &str) -> ProviderConfig {
    ProviderConfig {
        name: "corp".to_string(),
        oidc_server: "login.example.com".to_string(),
        authorization_url: "https://login.example.com/authorize".to_string(),
        token_url: token_url.to_string(),
        client_id: "my-client".to_string(),
        client_secret: "s3cret".to_string(),
        max_session_duration_seconds: 3600,
        redirect_port: None,
        login_timeout_seconds: Some(10),
        sts_region: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::oidc::MockTokenEndpoint;
    use crate::models::TokenResponse;

    struct PanickingOpener;

    impl UrlOpener for PanickingOpener {
        fn open(&self, _url: &str) -> std::io::Result<()> {
            panic!("browser must not be launched in headless mode");
        }
    }

    fn code_response() -> TokenResponse {
        TokenResponse {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            id_token: Some("id-token".to_string()),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_authorization_url_parameters() {
        let provider = test_provider("https://login.example.com/token");
        let url = authorization_url(&provider, "http://127.0.0.1:4321/", "state-1");

        let parsed = reqwest::Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(parsed.path(), "/authorize");
        assert_eq!(pairs["client_id"], "my-client");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:4321/");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email");
        assert_eq!(pairs["state"], "state-1");
        assert_eq!(pairs["access_type"], "offline");
    }

    #[test]
    fn test_authorization_url_keeps_existing_query() {
        let mut provider = test_provider("https://login.example.com/token");
        provider.authorization_url = "https://login.example.com/authorize?tenant=corp".to_string();

        let url = authorization_url(&provider, "http://127.0.0.1:4321/", "s");
        assert!(url.starts_with("https://login.example.com/authorize?tenant=corp&client_id="));
    }

    #[tokio::test]
    async fn test_login_exchanges_received_code() {
        let mut endpoint = MockTokenEndpoint::new();
        endpoint
            .expect_exchange_code()
            .withf(|_, code, redirect_uri| {
                code == "abc123" && redirect_uri.starts_with("http://127.0.0.1:")
            })
            .times(1)
            .returning(|_, _, _| Ok(code_response()));

        let login = BrowserLogin::with_opener(
            Arc::new(endpoint),
            Box::new(RedirectingOpener::with_code("abc123")),
            false,
        );
        let token = login
            .login(&test_provider("https://login.example.com/token"))
            .await
            .unwrap();

        assert_eq!(token.id_token, "id-token");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert!(token.is_valid_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_login_proceeds_when_browser_launch_fails() {
        let mut endpoint = MockTokenEndpoint::new();
        endpoint
            .expect_exchange_code()
            .times(1)
            .returning(|_, _, _| Ok(code_response()));

        let opener = RedirectingOpener {
            query: "code=abc123".to_string(),
            fail_launch: true,
        };
        let login = BrowserLogin::with_opener(Arc::new(endpoint), Box::new(opener), false);

        assert!(login
            .login(&test_provider("https://login.example.com/token"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_denied_login_skips_token_exchange() {
        // No expectations: any call to the token endpoint fails the test
        let endpoint = MockTokenEndpoint::new();
        let opener = RedirectingOpener {
            query: "error=access_denied".to_string(),
            fail_launch: false,
        };
        let login = BrowserLogin::with_opener(Arc::new(endpoint), Box::new(opener), false);

        let err = login
            .login(&test_provider("https://login.example.com/token"))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_missing_id_token_is_authorization_error() {
        let mut endpoint = MockTokenEndpoint::new();
        endpoint.expect_exchange_code().returning(|_, _, _| {
            Ok(TokenResponse {
                id_token: None,
                ..code_response()
            })
        });

        let login = BrowserLogin::with_opener(
            Arc::new(endpoint),
            Box::new(RedirectingOpener::with_code("abc123")),
            false,
        );
        let err = login
            .login(&test_provider("https://login.example.com/token"))
            .await
            .unwrap_err();
        assert!(matches!(err, OidcError::Authorization(msg) if msg.contains("id_token")));
    }

    #[tokio::test]
    async fn test_headless_login_does_not_launch_browser() {
        let endpoint = MockTokenEndpoint::new();
        let login = BrowserLogin::with_opener(Arc::new(endpoint), Box::new(PanickingOpener), true);

        let mut provider = test_provider("https://login.example.com/token");
        provider.login_timeout_seconds = Some(1);

        let err = login.login(&provider).await.unwrap_err();
        assert!(matches!(err, OidcError::LoginTimeout(1)));
    }
}
