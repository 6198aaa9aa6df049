use crate::config::Config;
use crate::error::Result;
use crate::models::{CloudCredential, CredentialProcessOutput};
use crate::session::SessionManager;

pub async fn execute(
    provider: &str,
    role: &str,
    print: bool,
    duration: i64,
    headless: bool,
) -> Result<()> {
    let config = Config::load()?;
    let session = SessionManager::from_environment(config, headless)?;

    let creds = session.get_credential(provider, role, duration).await?;

    // Nothing reaches stdout until everything above succeeded
    let output = if print {
        render_exports(&creds, cfg!(windows))
    } else {
        render_json(&creds)?
    };
    println!("{}", output);

    Ok(())
}

/// `credential_process` JSON
pub fn render_json(creds: &CloudCredential) -> Result<String> {
    Ok(serde_json::to_string_pretty(&CredentialProcessOutput::from(creds))?)
}

/// Shell lines setting the standard AWS environment variables
pub fn render_exports(creds: &CloudCredential, windows: bool) -> String {
    let keyword = if windows { "set" } else { "export" };

    [
        ("AWS_ACCESS_KEY_ID", &creds.access_key_id),
        ("AWS_SECRET_ACCESS_KEY", &creds.secret_access_key),
        ("AWS_SESSION_TOKEN", &creds.session_token),
    ]
    .iter()
    .map(|(key, value)| format!("{} {}={}", keyword, key, value))
    .collect::<Vec<_>>()
    .join("\n")
}
