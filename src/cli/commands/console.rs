use crate::config::Config;
use crate::console::{open_console, ConsoleSignIn};
use crate::error::Result;
use crate::session::SessionManager;

pub async fn execute(
    provider: &str,
    role: &str,
    region: Option<&str>,
    headless: bool,
) -> Result<()> {
    let config = Config::load()?;
    let session = SessionManager::from_environment(config, headless)?;
    let creds = session.get_credential(provider, role, 0).await?;

    let url = ConsoleSignIn::new().console_url(&creds, region).await?;

    eprintln!("AWS Console sign-in URL for {}:", role);
    eprintln!("  {}", url);

    if headless {
        return Ok(());
    }

    eprintln!("Opening AWS Console in browser...");
    if let Err(e) = open_console(&url) {
        eprintln!("{}", e);
        eprintln!("Please open the URL manually.");
    }

    Ok(())
}
