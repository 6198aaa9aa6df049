use thiserror::Error;

#[derive(Error, Debug)]
pub enum OidcError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Timed out after {0}s waiting for the browser login to complete")]
    LoginTimeout(u64),

    /// Only produced by the token refresh grant; the refresher recovers from it
    /// by falling back to an interactive login.
    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Unable to get AWS credentials: {0}")]
    Federation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, OidcError>;
