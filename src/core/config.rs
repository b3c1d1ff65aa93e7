use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// FileConfig: file-based config loader (handoff.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "HANDOFF_CONFIG";
pub const ENV_PORT: &str = "HANDOFF_PORT";
pub const ENV_HEADLESS: &str = "BROWSER_HEADLESS";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_PROFILE_DIR: &str = "HANDOFF_PROFILE_DIR";
pub const ENV_CANCEL_WINDOW: &str = "CANCEL_WINDOW_SECONDS";
pub const ENV_STOREFRONT_URL: &str = "STOREFRONT_URL";
pub const ENV_MARKETPLACE_URL: &str = "MARKETPLACE_URL";

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BrowserFileConfig {
    /// Run without a visible window. Defaults to `false`: a human has to be
    /// able to log in and finish the transaction in the driven browser.
    pub headless: Option<bool>,
    /// Explicit Chromium-family executable. Auto-discovered when absent.
    pub executable: Option<String>,
    /// Root directory for per-site persistent profiles.
    pub profile_dir: Option<String>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    pub navigation_timeout_secs: Option<u64>,
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct StorefrontFileConfig {
    pub url: Option<String>,
    pub cancel_window_secs: Option<u64>,
    pub max_store_attempts: Option<usize>,
    pub items_per_store: Option<u32>,
    pub default_quantity: Option<u32>,
    pub max_quantity: Option<u32>,
    pub modal_poll_interval_ms: Option<u64>,
    pub modal_poll_attempts: Option<u32>,
    pub manual_confirmation_secs: Option<u64>,
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct MarketplaceFileConfig {
    pub url: Option<String>,
    pub default_target: Option<u32>,
    pub max_target: Option<u32>,
    pub send_poll_interval_ms: Option<u64>,
    pub send_poll_attempts: Option<u32>,
    /// Fraction of the listed price offered in the drafted message.
    pub offer_ratio: Option<f64>,
    pub review_hold_secs: Option<u64>,
    pub scroll_passes: Option<u32>,
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct SessionFileConfig {
    pub auth_poll_interval_ms: Option<u64>,
    pub auth_poll_attempts: Option<u32>,
    /// How long a finished session stays queryable before eviction.
    pub eviction_delay_secs: Option<u64>,
}

/// Top-level config loaded from `handoff.json`. Every field is optional.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub browser: BrowserFileConfig,
    #[serde(default)]
    pub storefront: StorefrontFileConfig,
    #[serde(default)]
    pub marketplace: MarketplaceFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Load `handoff.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `HANDOFF_CONFIG` env var path
/// 2. `./handoff.json`
/// 3. `../handoff.json`
///
/// Missing file → `FileConfig::default()` (silent, env-var fallbacks apply).
/// Parse error → log a warning, return `FileConfig::default()`.
pub fn load_file_config() -> FileConfig {
    let mut candidates = vec![
        PathBuf::from("handoff.json"),
        PathBuf::from("../handoff.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        return match serde_json::from_str::<FileConfig>(&contents) {
            Ok(cfg) => {
                tracing::info!("handoff.json loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    "handoff.json parse error at {}: {} (using defaults)",
                    path.display(),
                    e
                );
                FileConfig::default()
            }
        };
    }

    FileConfig::default()
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> Option<bool> {
    let v = std::env::var(key).ok()?;
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Settings: fully resolved, typed values used by the rest of the crate
// ---------------------------------------------------------------------------

/// Fixed-interval, bounded-attempt polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on how long a poll with these settings can take.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub executable: Option<String>,
    pub profile_root: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    pub navigation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub storefront_url: String,
    pub cancel_window: Duration,
    pub max_store_attempts: usize,
    /// Items added per store attempt, regardless of requested quantity.
    pub items_per_store: u32,
    pub default_quantity: u32,
    pub max_quantity: u32,
    pub modal_poll: PollSettings,
    pub manual_confirmation_window: Duration,
}

#[derive(Debug, Clone)]
pub struct MessagingSettings {
    pub marketplace_url: String,
    pub default_target: u32,
    pub max_target: u32,
    pub send_poll: PollSettings,
    pub offer_ratio: f64,
    pub review_hold: Duration,
    pub scroll_passes: u32,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub browser: BrowserSettings,
    pub auth_poll: PollSettings,
    pub order: OrderSettings,
    pub messaging: MessagingSettings,
    pub eviction_delay: Duration,
}

fn default_profile_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".handoff").join("profiles"))
        .unwrap_or_else(|| std::env::temp_dir().join("handoff-profiles"))
}

impl Default for Settings {
    /// Built-in defaults only; no file or environment lookups.
    fn default() -> Self {
        Self {
            port: 3000,
            browser: BrowserSettings {
                headless: false,
                executable: None,
                profile_root: default_profile_root(),
                window_width: 1200,
                window_height: 900,
                navigation_timeout: Duration::from_secs(30),
            },
            auth_poll: PollSettings::new(Duration::from_secs(3), 30),
            order: OrderSettings {
                storefront_url: "https://www.doordash.com".to_string(),
                cancel_window: Duration::from_secs(10),
                max_store_attempts: 5,
                items_per_store: 2,
                default_quantity: 6,
                max_quantity: 12,
                modal_poll: PollSettings::new(Duration::from_secs(3), 3),
                manual_confirmation_window: Duration::from_secs(300),
            },
            messaging: MessagingSettings {
                marketplace_url: "https://www.facebook.com".to_string(),
                default_target: 30,
                max_target: 100,
                send_poll: PollSettings::new(Duration::from_millis(500), 60),
                offer_ratio: 0.2,
                review_hold: Duration::from_secs(30),
                scroll_passes: 5,
            },
            eviction_delay: Duration::from_secs(300),
        }
    }
}

impl FileConfig {
    /// Port: JSON field → `HANDOFF_PORT` → `PORT` → 3000.
    pub fn resolve_port(&self, default: u16) -> u16 {
        self.server
            .port
            .or_else(|| env_parsed(ENV_PORT))
            .or_else(|| env_parsed("PORT"))
            .unwrap_or(default)
    }

    /// Headless: JSON field → `BROWSER_HEADLESS` (`true`/`false`, `1`/`0`) → headed.
    pub fn resolve_headless(&self, default: bool) -> bool {
        self.browser
            .headless
            .or_else(|| env_flag(ENV_HEADLESS))
            .unwrap_or(default)
    }

    /// Executable: JSON field → `CHROME_EXECUTABLE` → auto-discovery (`None`).
    pub fn resolve_executable(&self) -> Option<String> {
        self.browser
            .executable
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| env_string(ENV_CHROME_EXECUTABLE))
    }

    /// Profile root: JSON field → `HANDOFF_PROFILE_DIR` → `~/.handoff/profiles`.
    pub fn resolve_profile_root(&self, default: PathBuf) -> PathBuf {
        self.browser
            .profile_dir
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| env_string(ENV_PROFILE_DIR))
            .map(PathBuf::from)
            .unwrap_or(default)
    }

    /// Cancel window: JSON field → `CANCEL_WINDOW_SECONDS` → 10 s.
    pub fn resolve_cancel_window(&self, default: Duration) -> Duration {
        self.storefront
            .cancel_window_secs
            .or_else(|| env_parsed(ENV_CANCEL_WINDOW))
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    pub fn resolve_storefront_url(&self, default: String) -> String {
        self.storefront
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| env_string(ENV_STOREFRONT_URL))
            .unwrap_or(default)
    }

    pub fn resolve_marketplace_url(&self, default: String) -> String {
        self.marketplace
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| env_string(ENV_MARKETPLACE_URL))
            .unwrap_or(default)
    }

    /// Overlay this file (and the environment) on top of the built-in defaults.
    pub fn resolve(&self) -> Settings {
        let d = Settings::default();
        let secs = |v: Option<u64>, fallback: Duration| v.map(Duration::from_secs).unwrap_or(fallback);
        let millis =
            |v: Option<u64>, fallback: Duration| v.map(Duration::from_millis).unwrap_or(fallback);

        let sf = &self.storefront;
        let mp = &self.marketplace;
        let ss = &self.session;

        Settings {
            port: self.resolve_port(d.port),
            browser: BrowserSettings {
                headless: self.resolve_headless(d.browser.headless),
                executable: self.resolve_executable(),
                profile_root: self.resolve_profile_root(d.browser.profile_root),
                window_width: self.browser.window_width.unwrap_or(d.browser.window_width),
                window_height: self.browser.window_height.unwrap_or(d.browser.window_height),
                navigation_timeout: secs(
                    self.browser.navigation_timeout_secs,
                    d.browser.navigation_timeout,
                ),
            },
            auth_poll: PollSettings::new(
                millis(ss.auth_poll_interval_ms, d.auth_poll.interval),
                ss.auth_poll_attempts.unwrap_or(d.auth_poll.max_attempts),
            ),
            order: OrderSettings {
                storefront_url: self.resolve_storefront_url(d.order.storefront_url),
                cancel_window: self.resolve_cancel_window(d.order.cancel_window),
                max_store_attempts: sf.max_store_attempts.unwrap_or(d.order.max_store_attempts).max(1),
                items_per_store: sf.items_per_store.unwrap_or(d.order.items_per_store).max(1),
                default_quantity: sf.default_quantity.unwrap_or(d.order.default_quantity),
                max_quantity: sf.max_quantity.unwrap_or(d.order.max_quantity).max(1),
                modal_poll: PollSettings::new(
                    millis(sf.modal_poll_interval_ms, d.order.modal_poll.interval),
                    sf.modal_poll_attempts.unwrap_or(d.order.modal_poll.max_attempts),
                ),
                manual_confirmation_window: secs(
                    sf.manual_confirmation_secs,
                    d.order.manual_confirmation_window,
                ),
            },
            messaging: MessagingSettings {
                marketplace_url: self.resolve_marketplace_url(d.messaging.marketplace_url),
                default_target: mp.default_target.unwrap_or(d.messaging.default_target),
                max_target: mp.max_target.unwrap_or(d.messaging.max_target).max(1),
                send_poll: PollSettings::new(
                    millis(mp.send_poll_interval_ms, d.messaging.send_poll.interval),
                    mp.send_poll_attempts.unwrap_or(d.messaging.send_poll.max_attempts),
                ),
                offer_ratio: mp
                    .offer_ratio
                    .filter(|r| r.is_finite() && *r > 0.0 && *r < 1.0)
                    .unwrap_or(d.messaging.offer_ratio),
                review_hold: secs(mp.review_hold_secs, d.messaging.review_hold),
                scroll_passes: mp.scroll_passes.unwrap_or(d.messaging.scroll_passes),
            },
            eviction_delay: secs(ss.eviction_delay_secs, d.eviction_delay),
        }
    }
}

impl Settings {
    /// `handoff.json` + environment + built-in defaults.
    pub fn load() -> Self {
        load_file_config().resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let s = Settings::default();
        assert_eq!(s.auth_poll.budget(), Duration::from_secs(90));
        assert_eq!(s.order.cancel_window, Duration::from_secs(10));
        assert_eq!(s.order.items_per_store, 2);
        assert_eq!(s.order.max_store_attempts, 5);
        assert_eq!(s.messaging.send_poll.budget(), Duration::from_secs(30));
        assert_eq!(s.eviction_delay, Duration::from_secs(300));
        assert!(!s.browser.headless);
    }

    #[test]
    fn poll_budget_saturates() {
        let poll = PollSettings::new(Duration::from_secs(u64::MAX / 2), u32::MAX);
        assert_eq!(poll.budget(), Duration::MAX);
    }

    #[test]
    fn file_values_override_defaults() {
        let cfg: FileConfig = serde_json::from_str(
            r#"{
                "storefront": { "cancel_window_secs": 25, "items_per_store": 1 },
                "marketplace": { "offer_ratio": 0.5, "send_poll_attempts": 10 },
                "session": { "eviction_delay_secs": 60 }
            }"#,
        )
        .unwrap();
        let s = cfg.resolve();
        assert_eq!(s.order.cancel_window, Duration::from_secs(25));
        assert_eq!(s.order.items_per_store, 1);
        assert_eq!(s.messaging.offer_ratio, 0.5);
        assert_eq!(s.messaging.send_poll.max_attempts, 10);
        assert_eq!(s.eviction_delay, Duration::from_secs(60));
    }

    #[test]
    fn out_of_range_offer_ratio_falls_back() {
        let cfg: FileConfig =
            serde_json::from_str(r#"{ "marketplace": { "offer_ratio": 3.0 } }"#).unwrap();
        assert_eq!(cfg.resolve().messaging.offer_ratio, 0.2);
    }

    #[test]
    fn empty_object_parses() {
        let cfg: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.storefront.url.is_none());
        assert!(cfg.browser.executable.is_none());
    }
}
