// Environment detection utilities

/// Check if we're running in a headless environment, where launching a
/// browser is pointless and the login URL is only printed.
///
/// Headless mode is detected when:
/// - `force` is set (the --headless flag)
/// - SSH_TTY or SSH_CONNECTION is set (SSH session)
/// - CI is set
/// - TERM is "dumb" or empty
/// - On Linux and other non-macOS Unix: neither DISPLAY nor WAYLAND_DISPLAY is set
pub fn is_headless_environment(force: bool) -> bool {
    detect_headless(force, |name| std::env::var(name).ok())
}

pub fn detect_headless<F>(force: bool, lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    if force {
        tracing::debug!("Headless mode: forced by --headless flag");
        return true;
    }

    for var in ["SSH_TTY", "SSH_CONNECTION", "CI"] {
        if lookup(var).is_some() {
            tracing::debug!("Headless detected: {} set", var);
            return true;
        }
    }

    if let Some(term) = lookup("TERM") {
        if term == "dumb" || term.is_empty() {
            tracing::debug!("Headless detected: TERM is '{}'", term);
            return true;
        }
    }

    // macOS and Windows don't use DISPLAY
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        if lookup("DISPLAY").is_none() && lookup("WAYLAND_DISPLAY").is_none() {
            tracing::debug!("Headless detected: no DISPLAY or WAYLAND_DISPLAY");
            return true;
        }
    }

    tracing::debug!("Not headless: detected graphical environment");
    false
}
