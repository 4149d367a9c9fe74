//! Optional desktop browser launcher for the authorization URL.
//!
//! The authorization flow never depends on which launcher is active; the URL
//! is always printed as well.

use anyhow::{Context, Result};
use tracing::debug;

pub trait BrowserLauncher: Send + Sync {
    /// Opens `url`. `Ok(false)` means no browser was launched.
    fn open(&self, url: &str) -> Result<bool>;

    fn name(&self) -> &'static str;
}

/// Uses the platform's default browser.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<bool> {
        open::that(url).context("Failed to launch system browser")?;
        debug!("System browser launched");
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Never launches anything.
pub struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, _url: &str) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Picks [`NoBrowser`] when disabled or when no graphical session is found.
pub fn select_launcher(disabled: bool) -> Box<dyn BrowserLauncher> {
    if disabled || !graphical_session_available() {
        debug!(disabled, "Browser launch unavailable");
        Box::new(NoBrowser)
    } else {
        Box::new(SystemBrowser)
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn graphical_session_available() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|var| std::env::var_os(var).map_or(false, |v| !v.is_empty()))
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn graphical_session_available() -> bool {
    true
}
