//! The page-driving capability the session engine consumes.
//!
//! Workflows never hand script to the browser. They describe *what* they are
//! looking for with an [`ElementQuery`] (a CSS selector plus text / href /
//! attribute filters) and read page state through a [`Probe`]. The concrete
//! driver decides how to evaluate those against a live page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How long `navigate` waits before handing control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Return once the document has been parsed.
    DomContentLoaded,
    /// Additionally wait until network activity settles (bounded).
    NetworkIdle,
}

/// Text predicate applied to an element's trimmed text content *or* its
/// `aria-label`, case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TextMatch {
    Exact(String),
    Prefix(String),
    Contains(String),
}

/// Attribute predicate: `name` must be present and contain `contains`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrMatch {
    pub name: String,
    pub contains: String,
}

/// A structural description of a set of elements.
///
/// All populated filters must hold; within `text`, any one entry matching is
/// enough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementQuery {
    pub css: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<TextMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href_includes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub href_excludes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<AttrMatch>,
    /// Only search inside the first element matching this selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
    /// Skip elements that sit inside an ancestor matching this selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outside: Option<String>,
    #[serde(default)]
    pub visible_only: bool,
}

impl ElementQuery {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            css: selector.into(),
            ..Default::default()
        }
    }

    pub fn text_exact(mut self, value: impl Into<String>) -> Self {
        self.text.push(TextMatch::Exact(value.into().to_lowercase()));
        self
    }

    pub fn text_prefix(mut self, value: impl Into<String>) -> Self {
        self.text.push(TextMatch::Prefix(value.into().to_lowercase()));
        self
    }

    pub fn text_contains(mut self, value: impl Into<String>) -> Self {
        self.text.push(TextMatch::Contains(value.into().to_lowercase()));
        self
    }

    pub fn href_includes(mut self, value: impl Into<String>) -> Self {
        self.href_includes = Some(value.into());
        self
    }

    pub fn href_excludes<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.href_excludes.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn attr_contains(mut self, name: impl Into<String>, contains: impl Into<String>) -> Self {
        self.attr = Some(AttrMatch {
            name: name.into(),
            contains: contains.into(),
        });
        self
    }

    pub fn within(mut self, selector: impl Into<String>) -> Self {
        self.within = Some(selector.into());
        self
    }

    pub fn outside(mut self, selector: impl Into<String>) -> Self {
        self.outside = Some(selector.into());
        self
    }

    pub fn visible(mut self) -> Self {
        self.visible_only = true;
        self
    }
}

/// A matched element, addressed by the query that found it and its position
/// in that query's result list at the time of the query.
///
/// Handles are snapshots: if the page re-renders, acting on a stale handle
/// fails with [`DriverError::ElementGone`] instead of touching the wrong node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub query: ElementQuery,
    pub index: usize,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Read-only structural page queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// `document.body.innerText`, as a JSON string.
    BodyText,
    /// Number of elements matching the query, as a JSON number.
    Count(ElementQuery),
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page context was torn down: {0}")]
    ContextLost(String),

    #[error("element #{index} for `{css}` is no longer on the page")]
    ElementGone { css: String, index: usize },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("browser connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Errors caused by the page moving underneath an in-flight query.
    /// Pollers treat these as "not this time" rather than as failures.
    pub fn is_context_lost(&self) -> bool {
        matches!(
            self,
            DriverError::ContextLost(_) | DriverError::ElementGone { .. }
        )
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, wait: WaitPolicy) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn query_all(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>, DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Focus `element`, replace its current value and type `text` into it.
    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    async fn evaluate(&self, probe: &Probe) -> Result<serde_json::Value, DriverError>;

    /// Wait until at least one element matches. `Ok(false)` on timeout.
    async fn wait_for(&self, query: &ElementQuery, timeout: Duration) -> Result<bool, DriverError>;

    /// Dispatch a key press (`"Escape"`, `"Enter"`, ...) to the focused element.
    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    async fn scroll_by(&self, pixels: i64) -> Result<(), DriverError>;

    /// Release the underlying browser resource. Must be safe to call twice.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Convenience: first element matching `query`, if any.
pub async fn query_first(
    page: &dyn PageDriver,
    query: &ElementQuery,
) -> Result<Option<ElementHandle>, DriverError> {
    Ok(page.query_all(query).await?.into_iter().next())
}

/// Convenience: body text as a `String` (empty when unavailable).
pub async fn body_text(page: &dyn PageDriver) -> Result<String, DriverError> {
    let value = page.evaluate(&Probe::BodyText).await?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Convenience: number of elements matching `query`.
pub async fn count(page: &dyn PageDriver, query: &ElementQuery) -> Result<usize, DriverError> {
    let value = page.evaluate(&Probe::Count(query.clone())).await?;
    Ok(value.as_u64().unwrap_or(0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_filters_are_lowercased_and_serialized_tagged() {
        let q = ElementQuery::css("button")
            .text_exact("Add")
            .text_contains("Add to Cart")
            .visible();
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["css"], "button");
        assert_eq!(json["visibleOnly"], true);
        assert_eq!(json["text"][0]["kind"], "exact");
        assert_eq!(json["text"][0]["value"], "add");
        assert_eq!(json["text"][1]["value"], "add to cart");
        assert!(json.get("hrefIncludes").is_none());
    }

    #[test]
    fn context_loss_classification() {
        assert!(DriverError::ContextLost("Execution context was destroyed".into()).is_context_lost());
        assert!(DriverError::ElementGone {
            css: "textarea".into(),
            index: 0
        }
        .is_context_lost());
        assert!(!DriverError::Closed.is_context_lost());
        assert!(!DriverError::Timeout(Duration::from_secs(1)).is_context_lost());
    }
}
