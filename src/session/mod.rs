// Credential lifecycle: cached token -> cached credential -> STS
use crate::auth::{AuthManager, BrowserLogin, OidcClient};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::credentials::{CredentialExchanger, StsFederation};
use crate::error::Result;
use crate::models::CloudCredential;
use std::sync::Arc;

pub struct SessionManager {
    config: Config,
    cache: CacheStore,
    auth: AuthManager,
    exchanger: CredentialExchanger,
}

impl SessionManager {
    pub fn new(
        config: Config,
        cache: CacheStore,
        auth: AuthManager,
        exchanger: CredentialExchanger,
    ) -> Self {
        Self {
            config,
            cache,
            auth,
            exchanger,
        }
    }

    /// Wire up the real provider, browser, and STS clients with the cache
    /// next to the config file.
    pub fn from_environment(config: Config, headless: bool) -> Result<Self> {
        let cache = CacheStore::open(Config::cache_file_path()?);

        let endpoint = Arc::new(OidcClient::new());
        let login = Arc::new(BrowserLogin::new(endpoint.clone(), headless));
        let auth = AuthManager::new(endpoint, login);
        let exchanger = CredentialExchanger::new(Arc::new(StsFederation::new()));

        Ok(Self::new(config, cache, auth, exchanger))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Get credentials for `role_arn` through `provider_name`, logging in,
    /// refreshing, or calling STS only when the cached values are not valid.
    pub async fn get_credential(
        &self,
        provider_name: &str,
        role_arn: &str,
        requested_seconds: i64,
    ) -> Result<CloudCredential> {
        let provider = self.config.provider(provider_name)?;

        let token = self
            .auth
            .get_oidc_token(&self.cache, provider, role_arn)
            .await?;

        match self.cache.get_credential(role_arn) {
            Ok(Some(creds)) if creds.is_valid() => {
                tracing::debug!("Using cached AWS credentials for {}", role_arn);
                return Ok(creds);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Could not read cached AWS credentials: {}", e),
        }

        let creds = self
            .exchanger
            .exchange(provider, &token, role_arn, requested_seconds)
            .await?;

        self.cache.put_credential(role_arn, creds.clone())?;
        Ok(creds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        test_provider, MockAuthorizationFlow, MockTokenEndpoint, RedirectingOpener,
    };
    use crate::cache::identity_token_key;
    use crate::credentials::MockWebIdentityFederation;
    use crate::error::OidcError;
    use crate::models::IdentityToken;
    use chrono::{Duration, Utc};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ROLE: &str = "arn:aws:iam::123456789012:role/Deploy";

    fn config_with(provider: crate::config::ProviderConfig) -> Config {
        let mut config = Config::default();
        config.upsert_provider(provider);
        config
    }

    fn login_token() -> IdentityToken {
        IdentityToken {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            id_token: "id-token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn credential(expiration: chrono::DateTime<Utc>) -> CloudCredential {
        CloudCredential {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "session".to_string(),
            expiration,
            principal_arn: "arn:aws:sts::123456789012:assumed-role/Deploy/alice@Deploy"
                .to_string(),
        }
    }

    fn manager(
        cache: CacheStore,
        login: MockAuthorizationFlow,
        federation: MockWebIdentityFederation,
    ) -> SessionManager {
        SessionManager::new(
            config_with(test_provider("https://login.example.com/token")),
            cache,
            AuthManager::new(Arc::new(MockTokenEndpoint::new()), Arc::new(login)),
            CredentialExchanger::with_username(Arc::new(federation), "alice"),
        )
    }

    #[tokio::test]
    async fn test_second_call_uses_cache_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache.json"));

        let mut login = MockAuthorizationFlow::new();
        login.expect_login().times(1).returning(|_| Ok(login_token()));

        let mut federation = MockWebIdentityFederation::new();
        federation
            .expect_assume_role()
            .times(1)
            .returning(|_| Ok(credential(Utc::now() + Duration::hours(1))));

        let session = manager(cache, login, federation);
        let first = session.get_credential("corp", ROLE, 0).await.unwrap();
        let second = session.get_credential("corp", ROLE, 0).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_credential_with_valid_token_calls_sts_only() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache.json"));
        cache
            .put_identity_token(&identity_token_key("corp", ROLE), login_token())
            .unwrap();
        cache
            .put_credential(ROLE, credential(Utc::now() - Duration::minutes(5)))
            .unwrap();

        let mut federation = MockWebIdentityFederation::new();
        federation
            .expect_assume_role()
            .withf(|request| request.web_identity_token == "id-token")
            .times(1)
            .returning(|_| Ok(credential(Utc::now() + Duration::hours(1))));

        let session = manager(cache, MockAuthorizationFlow::new(), federation);
        let creds = session.get_credential("corp", ROLE, 0).await.unwrap();

        assert!(creds.is_valid());
        assert_eq!(session.cache().get_credential(ROLE).unwrap(), Some(creds));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache.json"));

        let session = manager(
            cache,
            MockAuthorizationFlow::new(),
            MockWebIdentityFederation::new(),
        );
        let err = session.get_credential("other", ROLE, 0).await.unwrap_err();
        assert!(matches!(err, OidcError::Config(msg) if msg.contains("setup other")));
    }

    #[tokio::test]
    async fn test_federation_failure_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::open(dir.path().join("cache.json"));

        let mut login = MockAuthorizationFlow::new();
        login.expect_login().times(1).returning(|_| Ok(login_token()));

        let mut federation = MockWebIdentityFederation::new();
        federation.expect_assume_role().times(1).returning(|_| {
            Err(OidcError::Federation(
                "InvalidIdentityToken: Couldn't retrieve verification key".to_string(),
            ))
        });

        let session = manager(cache, login, federation);
        let err = session.get_credential("corp", ROLE, 0).await.unwrap_err();
        assert!(matches!(err, OidcError::Federation(msg) if msg.contains("InvalidIdentityToken")));

        // The identity token is kept; only the credential is missing
        let entries = session.cache().snapshot().unwrap();
        assert_eq!(entries.identity_tokens.len(), 1);
        assert!(entries.credentials.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_login_and_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "id_token": "id-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(&format!("{}/token", server.uri()));
        let expiry = Utc::now() + Duration::seconds(3600);

        let mut federation = MockWebIdentityFederation::new();
        federation
            .expect_assume_role()
            .withf(|request| {
                request.web_identity_token == "id-token"
                    && request.role_session_name == "alice@Deploy"
            })
            .times(1)
            .returning(move |_| Ok(credential(expiry)));

        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");

        let endpoint = Arc::new(OidcClient::new());
        let login = Arc::new(BrowserLogin::with_opener(
            endpoint.clone(),
            Box::new(RedirectingOpener::with_code("abc123")),
            false,
        ));
        let session = SessionManager::new(
            config_with(provider),
            CacheStore::open(&cache_path),
            AuthManager::new(endpoint, login),
            CredentialExchanger::with_username(Arc::new(federation), "alice"),
        );

        let creds = session.get_credential("corp", ROLE, 0).await.unwrap();
        assert_eq!(creds.expiration, expiry);

        let reloaded = CacheStore::load(&cache_path).unwrap();
        assert_eq!(
            reloaded.identity_tokens[&identity_token_key("corp", ROLE)].id_token,
            "id-token"
        );
        assert_eq!(reloaded.credentials[ROLE], creds);
    }
}
