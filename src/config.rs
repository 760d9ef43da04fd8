//! Process configuration from the environment

use crate::browser::SessionSettings;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub transport: Transport,
    /// HTTP listen port
    pub port: u16,
    pub session: SessionSettings,
    /// Explicit Chrome executable; otherwise the system install, then a download
    pub chrome_executable: Option<PathBuf>,
    /// Where downloaded Chromium builds are kept
    pub chrome_cache_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values fall back to
    /// the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SessionSettings::default();

        let transport = match lookup("BROWSER_MONITOR_TRANSPORT").as_deref() {
            None | Some("stdio") => Transport::Stdio,
            Some("http") => Transport::Http,
            Some(other) => {
                tracing::warn!(value = other, "Unknown transport, using stdio");
                Transport::Stdio
            }
        };

        let nav_timeout_secs = parsed(&lookup, "BROWSER_MONITOR_NAV_TIMEOUT_SECS", defaults.navigation_timeout.as_secs());
        let idle_ms = parsed(
            &lookup,
            "BROWSER_MONITOR_IDLE_MS",
            u64::try_from(defaults.idle_window.as_millis()).unwrap_or(500),
        );

        let chrome_cache_dir = lookup("BROWSER_MONITOR_CHROME_CACHE").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.cache/browser-monitor/chromium"))
            },
            PathBuf::from,
        );

        Self {
            transport,
            port: parsed(&lookup, "BROWSER_MONITOR_PORT", 8000),
            session: SessionSettings {
                navigation_timeout: Duration::from_secs(nav_timeout_secs),
                idle_window: Duration::from_millis(idle_ms),
                event_buffer: parsed(&lookup, "BROWSER_MONITOR_EVENT_BUFFER", defaults.event_buffer).max(1),
            },
            chrome_executable: lookup("CHROME_BIN").filter(|p| !p.is_empty()).map(PathBuf::from),
            chrome_cache_dir,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            default
        }),
    }
}
