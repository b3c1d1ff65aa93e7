//! `PageDriver` over the Chrome DevTools Protocol via `chromiumoxide`.
//!
//! Element queries are evaluated in-page by a single matcher function that
//! receives the JSON-serialized [`ElementQuery`]; handles are re-resolved by
//! index on every action so a stale handle fails instead of hitting a
//! different node.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::driver::{DriverError, ElementHandle, ElementQuery, PageDriver, Probe, WaitPolicy};
use super::launch::{build_session_config, find_chrome_executable, ProfileLease, ProfileRegistry};
use super::DriverFactory;
use crate::core::config::BrowserSettings;

const WAIT_POLL: Duration = Duration::from_millis(250);

const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

const QUERY_SCRIPT: &str = r#"(q, action) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const root = q.within ? document.querySelector(q.within) : document;
  const visible = (el) => {
    const r = el.getBoundingClientRect();
    const cs = window.getComputedStyle(el);
    return r.width > 0 && r.height > 0 && cs.visibility !== 'hidden' && cs.display !== 'none';
  };
  const textOk = (el) => {
    if (!q.text || q.text.length === 0) return true;
    const seen = [norm(el.innerText || el.textContent), norm(el.getAttribute('aria-label'))];
    return q.text.some((m) => seen.some((t) => {
      if (!t) return false;
      if (m.kind === 'exact') return t === m.value;
      if (m.kind === 'prefix') return t.startsWith(m.value);
      return t.includes(m.value);
    }));
  };
  const hrefOk = (el) => {
    const href = el.getAttribute('href') || '';
    if (q.hrefIncludes && !href.includes(q.hrefIncludes)) return false;
    return !(q.hrefExcludes || []).some((x) => href.includes(x));
  };
  const attrOk = (el) => {
    if (!q.attr) return true;
    const v = el.getAttribute(q.attr.name);
    return v !== null && v.toLowerCase().includes(q.attr.contains.toLowerCase());
  };
  const outsideOk = (el) => !q.outside || !el.parentElement || !el.parentElement.closest(q.outside);
  const matches = root
    ? Array.from(root.querySelectorAll(q.css)).filter((el) =>
        textOk(el) && hrefOk(el) && attrOk(el) && outsideOk(el) && (!q.visibleOnly || visible(el)))
    : [];
  switch (action.op) {
    case 'count':
      return matches.length;
    case 'list':
      return matches.map((el) => ({
        text: (el.innerText || el.textContent || '').trim().slice(0, 300),
        href: el.href || el.getAttribute('href') || null,
        value: typeof el.value === 'string' ? el.value : null,
      }));
    case 'click': {
      const el = matches[action.index];
      if (!el) return false;
      el.scrollIntoView({ block: 'center' });
      el.click();
      return true;
    }
    case 'focus': {
      const el = matches[action.index];
      if (!el) return false;
      el.scrollIntoView({ block: 'center' });
      el.focus();
      if (typeof el.value === 'string') {
        const proto = el instanceof HTMLTextAreaElement
          ? HTMLTextAreaElement.prototype
          : HTMLInputElement.prototype;
        const desc = Object.getOwnPropertyDescriptor(proto, 'value');
        if (desc && desc.set) desc.set.call(el, ''); else el.value = '';
        el.dispatchEvent(new Event('input', { bubbles: true }));
      } else if (el.isContentEditable) {
        document.execCommand('selectAll', false, null);
        document.execCommand('delete', false, null);
      }
      return true;
    }
    default:
      return null;
  }
}"#;

fn classify(err: impl std::fmt::Display) -> DriverError {
    let msg = err.to_string();
    if msg.contains("Execution context was destroyed")
        || msg.contains("Cannot find context")
        || msg.contains("Inspected target navigated")
    {
        DriverError::ContextLost(msg)
    } else if msg.contains("channel closed") || msg.contains("ChannelSendError") {
        DriverError::Closed
    } else {
        DriverError::Protocol(msg)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ListedElement {
    #[serde(default)]
    text: String,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Production [`DriverFactory`]: one Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    settings: BrowserSettings,
    profiles: ProfileRegistry,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        let profiles = ProfileRegistry::new(settings.profile_root.clone());
        Self { settings, profiles }
    }

    /// `true` when a browser binary can be found on this machine.
    pub fn browser_available(&self) -> bool {
        find_chrome_executable(self.settings.executable.as_deref()).is_some()
    }
}

#[async_trait]
impl DriverFactory for ChromiumLauncher {
    async fn open(&self, site: &str) -> Result<Box<dyn PageDriver>> {
        let driver = ChromiumDriver::launch(&self.settings, &self.profiles, site).await?;
        Ok(Box::new(driver))
    }
}

// ── Driver ───────────────────────────────────────────────────────────────────

pub struct ChromiumDriver {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    /// Set by the handler task when the CDP connection ends (e.g. the human
    /// closed the window).
    disconnected: Arc<AtomicBool>,
    released: AtomicBool,
    profile: std::sync::Mutex<Option<ProfileLease>>,
    navigation_timeout: Duration,
}

fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    disconnected: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        disconnected.store(true, Ordering::SeqCst);
    })
}

impl ChromiumDriver {
    pub async fn launch(
        settings: &BrowserSettings,
        profiles: &ProfileRegistry,
        site: &str,
    ) -> Result<Self> {
        let exe = find_chrome_executable(settings.executable.as_deref()).ok_or_else(|| {
            anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
        })?;
        let lease = profiles.lease(site)?;
        let config = build_session_config(&exe, lease.path(), settings)?;

        info!(
            "launching browser for {} ({}, profile {})",
            site,
            exe,
            lease.path().display()
        );
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let disconnected = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&disconnected));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create page: {}", e))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| anyhow!("Failed to inject stealth script: {}", e))?;

        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            handler_task,
            disconnected,
            released: AtomicBool::new(false),
            profile: std::sync::Mutex::new(Some(lease)),
            navigation_timeout: settings.navigation_timeout,
        })
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.released.load(Ordering::SeqCst) || self.disconnected.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }

    async fn eval_json(&self, expression: String) -> Result<Value, DriverError> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate_expression(expression)
            .await
            .map_err(classify)?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn run_query(&self, query: &ElementQuery, action: Value) -> Result<Value, DriverError> {
        let q = serde_json::to_string(query).map_err(|e| DriverError::Protocol(e.to_string()))?;
        self.eval_json(format!("({})({}, {})", QUERY_SCRIPT, q, action))
            .await
    }

    async fn act_on(&self, element: &ElementHandle, op: &str) -> Result<(), DriverError> {
        let done = self
            .run_query(&element.query, json!({ "op": op, "index": element.index }))
            .await?;
        if done.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::ElementGone {
                css: element.query.css.clone(),
                index: element.index,
            })
        }
    }

    /// Wait until no new resource entries appear for `quiet`, bounded by `timeout`.
    async fn wait_until_stable(&self, quiet: Duration, timeout: Duration) {
        let start = Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = Instant::now();

        loop {
            if start.elapsed() >= timeout {
                debug!("wait_until_stable: timeout after {:?}", timeout);
                break;
            }

            let state = self
                .eval_json(
                    "[performance.getEntriesByType('resource').length, document.readyState]"
                        .to_string(),
                )
                .await
                .unwrap_or(Value::Null);
            let count = state[0].as_u64().unwrap_or(0);
            let complete = state[1].as_str() == Some("complete");

            if !complete || count != last_count {
                last_count = count;
                stable_since = Instant::now();
            } else if stable_since.elapsed() >= quiet {
                debug!(
                    "wait_until_stable: idle after {:?} ({} resources)",
                    start.elapsed(),
                    count
                );
                break;
            }

            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<(), DriverError> {
        self.ensure_open()?;
        debug!("navigate: {}", url);
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Err(_) => return Err(DriverError::Timeout(self.navigation_timeout)),
            Ok(Err(e)) => {
                return Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(_)) => {}
        }
        if wait == WaitPolicy::NetworkIdle {
            self.wait_until_stable(Duration::from_millis(1500), Duration::from_secs(10))
                .await;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        let url = self.page.url().await.map_err(classify)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query_all(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>, DriverError> {
        let raw = self.run_query(query, json!({ "op": "list" })).await?;
        let listed: Vec<ListedElement> = serde_json::from_value(raw).unwrap_or_default();
        Ok(listed
            .into_iter()
            .enumerate()
            .map(|(index, el)| ElementHandle {
                query: query.clone(),
                index,
                text: el.text,
                href: el.href,
                value: el.value,
            })
            .collect())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.act_on(element, "click").await
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.act_on(element, "focus").await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn evaluate(&self, probe: &Probe) -> Result<Value, DriverError> {
        match probe {
            Probe::BodyText => {
                self.eval_json("document.body ? document.body.innerText : ''".to_string())
                    .await
            }
            Probe::Count(query) => self.run_query(query, json!({ "op": "count" })).await,
        }
    }

    async fn wait_for(&self, query: &ElementQuery, timeout: Duration) -> Result<bool, DriverError> {
        let start = Instant::now();
        loop {
            match self.run_query(query, json!({ "op": "count" })).await {
                Ok(v) if v.as_u64().unwrap_or(0) > 0 => return Ok(true),
                Ok(_) => {}
                Err(e) if e.is_context_lost() => {}
                Err(e) => return Err(e),
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        let target = match self.page.find_element(":focus").await {
            Ok(el) => el,
            Err(_) => self.page.find_element("body").await.map_err(classify)?,
        };
        target.press_key(key).await.map_err(classify)?;
        Ok(())
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), DriverError> {
        self.eval_json(format!("window.scrollBy(0, {}); true", pixels))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let taken = self.browser.lock().await.take();
        let result = match taken {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ()).map_err(classify);
                let _ = browser.wait().await;
                closed
            }
            None => Ok(()),
        };
        self.handler_task.abort();

        if let Ok(mut guard) = self.profile.lock() {
            guard.take();
        }
        info!("browser released");

        // A human closing the window first is not a teardown failure.
        match result {
            Err(DriverError::Closed) => Ok(()),
            other => other,
        }
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        // Drop cannot await; spawn a best-effort close so an aborted session
        // does not leave a Chromium process behind.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let lease = self.profile.lock().ok().and_then(|mut g| g.take());
        if let Ok(mut guard) = self.browser.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                    let _ = browser.wait().await;
                    drop(lease);
                });
            }
        }
        self.handler_task.abort();
    }
}
