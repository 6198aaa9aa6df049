use crate::auth::{discovery_url, OidcClient};
use crate::config::{
    Config, ProviderConfig, DEFAULT_SESSION_DURATION_SECONDS, MAX_SESSION_DURATION_SECONDS,
    MIN_SESSION_DURATION_SECONDS,
};
use crate::error::{OidcError, Result};
use std::io::{self, BufRead, Write};

/// Line-based questions on a reader/writer pair
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask once and return the trimmed answer, or `default` for an empty one
    pub fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) if !d.is_empty() => write!(self.output, "{} [{}]: ", question, d)?,
            _ => write!(self.output, "{}: ", question)?,
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(OidcError::Config(
                "Input closed before setup completed".to_string(),
            ));
        }

        let answer = line.trim();
        Ok(match default {
            Some(d) if answer.is_empty() => d.to_string(),
            _ => answer.to_string(),
        })
    }

    /// Ask until the answer passes `validate`
    pub fn ask_valid<T, F>(&mut self, question: &str, default: Option<&str>, validate: F) -> Result<T>
    where
        F: Fn(&str) -> std::result::Result<T, String>,
    {
        loop {
            let answer = self.ask(question, default)?;
            match validate(&answer) {
                Ok(value) => return Ok(value),
                Err(msg) => writeln!(self.output, "  {}", msg)?,
            }
        }
    }

    fn say(&mut self, message: &str) -> Result<()> {
        writeln!(self.output, "{}", message)?;
        Ok(())
    }
}

pub fn parse_session_duration(answer: &str) -> std::result::Result<i64, String> {
    let range = format!(
        "Input must be {}-{}",
        MIN_SESSION_DURATION_SECONDS, MAX_SESSION_DURATION_SECONDS
    );
    match answer.trim().parse::<i64>() {
        Ok(seconds)
            if (MIN_SESSION_DURATION_SECONDS..=MAX_SESSION_DURATION_SECONDS).contains(&seconds) =>
        {
            Ok(seconds)
        }
        _ => Err(range),
    }
}

fn require_non_empty(answer: &str) -> std::result::Result<String, String> {
    if answer.is_empty() {
        Err("A value is required".to_string())
    } else {
        Ok(answer.to_string())
    }
}

/// Collect provider settings interactively. Endpoints come from the server's
/// discovery document; optional settings of an existing entry are kept.
pub async fn prompt_provider<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    client: &OidcClient,
    name: &str,
    existing: Option<&ProviderConfig>,
) -> Result<ProviderConfig> {
    let (oidc_server, metadata) = loop {
        let server = prompter.ask_valid(
            "OIDC provider metadata server name (https://<server>/.well-known/openid-configuration)",
            existing.map(|p| p.oidc_server.as_str()),
            require_non_empty,
        )?;

        match client.discover(&server).await {
            Ok(metadata) => break (server, metadata),
            Err(e) => {
                tracing::debug!("Discovery against {} failed: {}", discovery_url(&server), e);
                prompter.say(&format!("  {}", e))?;
            }
        }
    };

    let client_id = prompter.ask_valid(
        "Client ID which is registered in the OIDC provider",
        existing.map(|p| p.client_id.as_str()),
        require_non_empty,
    )?;

    let client_secret = prompter.ask(
        "Client secret which is registered in the OIDC provider (empty for none)",
        Some(existing.map(|p| p.client_secret.as_str()).unwrap_or("")),
    )?;

    let default_duration = existing
        .map(|p| p.max_session_duration_seconds)
        .unwrap_or(DEFAULT_SESSION_DURATION_SECONDS)
        .to_string();
    let max_session_duration_seconds = prompter.ask_valid(
        &format!(
            "The max session duration, in seconds, of the role session [{}-{}]",
            MIN_SESSION_DURATION_SECONDS, MAX_SESSION_DURATION_SECONDS
        ),
        Some(&default_duration),
        parse_session_duration,
    )?;

    Ok(ProviderConfig {
        name: name.to_string(),
        oidc_server,
        authorization_url: metadata.authorization_endpoint,
        token_url: metadata.token_endpoint,
        client_id,
        client_secret,
        max_session_duration_seconds,
        redirect_port: existing.and_then(|p| p.redirect_port),
        login_timeout_seconds: existing.and_then(|p| p.login_timeout_seconds),
        sts_region: existing.and_then(|p| p.sts_region.clone()),
    })
}

pub async fn execute(provider: &str) -> Result<()> {
    let mut config = Config::load()?;

    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());
    let updated = prompt_provider(
        &mut prompter,
        &OidcClient::new(),
        provider,
        config.providers.get(provider),
    )
    .await?;

    config.upsert_provider(updated);
    config.save()?;

    println!(
        "✓ Saved provider '{}' to {}",
        provider,
        Config::config_file_path()?.display()
    );
    Ok(())
}
