use crate::cache::{CacheEntrySet, CacheStore};
use crate::cli::CacheAction;
use crate::config::Config;
use crate::error::Result;
use crate::expiry::format_time_remaining;

pub fn execute(action: CacheAction) -> Result<()> {
    let path = Config::cache_file_path()?;

    match action {
        CacheAction::Show => {
            let entries = CacheStore::load(&path)?;
            print!("{}", render_entries(&entries));
        }
        CacheAction::Clear => {
            let store = CacheStore::open(&path);
            store.clear()?;
            println!("✓ Cleared cache at {}", store.path().display());
        }
    }

    Ok(())
}

/// Keys and expiry of every entry, without secret material
pub fn render_entries(entries: &CacheEntrySet) -> String {
    let mut out = String::new();

    out.push_str("Identity tokens:\n");
    if entries.identity_tokens.is_empty() {
        out.push_str("  (none)\n");
    }
    for (key, token) in &entries.identity_tokens {
        let refresh = if token.refresh_token.is_some() {
            ", refreshable"
        } else {
            ""
        };
        out.push_str(&format!(
            "  {}  expires {} ({}{})\n",
            key,
            token.expires_at.to_rfc3339(),
            format_time_remaining(&token.expires_at),
            refresh
        ));
    }

    out.push_str("AWS credentials:\n");
    if entries.credentials.is_empty() {
        out.push_str("  (none)\n");
    }
    for (role, creds) in &entries.credentials {
        out.push_str(&format!(
            "  {}  expires {} ({})\n",
            role,
            creds.expiration.to_rfc3339(),
            format_time_remaining(&creds.expiration)
        ));
    }

    out
}
