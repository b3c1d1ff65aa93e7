//! Browser process launch: executable discovery, launch flags, and per-site
//! profile directories.
//!
//! A profile under `<profile_root>/<site>` keeps the human's login between runs.
//! Chromium refuses to share a profile between two processes, so a second
//! concurrent session for the same site gets a throwaway profile instead,
//! removed again when its [`ProfileLease`] drops.

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use rand::seq::IndexedRandom;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::core::config::BrowserSettings;

// ── User-Agent pool ──────────────────────────────────────────────────────────

// Chromium-family only: the UA must agree with the engine actually driving the page.
const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `explicit` (from `handoff.json` / `CHROME_EXECUTABLE`), if it exists
/// 2. PATH scan
/// 3. OS-specific well-known install paths
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit {
        if Path::new(p).exists() {
            return Some(p.to_string());
        }
        warn!("configured browser executable not found: {}", p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "brave-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch config ────────────────────────────────────────────────────────────

/// Build the `BrowserConfig` for one session.
///
/// Headed unless `settings.headless`: the human logs in and places the final
/// order in this window.
pub fn build_session_config(
    exe: &str,
    profile_dir: &Path,
    settings: &BrowserSettings,
) -> Result<BrowserConfig> {
    let (width, height) = (settings.window_width, settings.window_height);

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .user_data_dir(profile_dir)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", random_user_agent()));

    if !settings.headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Profile leases ───────────────────────────────────────────────────────────

/// Tracks which persistent profile directories are held by a live browser.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    root: PathBuf,
    in_use: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ProfileRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_use: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim the persistent profile for `site`, or a fresh temporary profile
    /// when the persistent one is already held.
    pub fn lease(&self, site: &str) -> Result<ProfileLease> {
        let persistent = self.root.join(site);
        {
            let mut held = self
                .in_use
                .lock()
                .map_err(|_| anyhow!("profile registry lock poisoned"))?;
            if !held.contains(&persistent) {
                // Claimed only after the directory exists.
                std::fs::create_dir_all(&persistent).with_context(|| {
                    format!("failed to create profile dir {}", persistent.display())
                })?;
                held.insert(persistent.clone());
                debug!("using persistent profile {}", persistent.display());
                return Ok(ProfileLease {
                    path: persistent,
                    temporary: false,
                    registry: Some(self.in_use.clone()),
                });
            }
        }

        let temp = std::env::temp_dir().join(format!("handoff-{}-{}", site, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&temp)
            .with_context(|| format!("failed to create temp profile {}", temp.display()))?;
        warn!(
            "profile for {} is busy; using temporary profile {} (login will not persist)",
            site,
            temp.display()
        );
        Ok(ProfileLease {
            path: temp,
            temporary: true,
            registry: None,
        })
    }

    #[cfg(test)]
    pub fn is_held(&self, site: &str) -> bool {
        self.in_use
            .lock()
            .map(|held| held.contains(&self.root.join(site)))
            .unwrap_or(false)
    }
}

/// A profile directory claimed for the lifetime of one browser process.
#[derive(Debug)]
pub struct ProfileLease {
    path: PathBuf,
    temporary: bool,
    registry: Option<Arc<Mutex<HashSet<PathBuf>>>>,
}

impl ProfileLease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }
}

impl Drop for ProfileLease {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            if let Ok(mut held) = registry.lock() {
                held.remove(&self.path);
            }
        }
        if self.temporary {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    "failed to remove temporary profile {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
