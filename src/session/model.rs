//! Session data model and the state-machine edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::SessionError;
use super::window::WindowHandle;
use crate::core::config::{MessagingSettings, OrderSettings};

pub type SessionId = uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Order,
    Messaging,
}

impl SessionKind {
    /// Browser profile the session runs under.
    pub fn site(&self) -> &'static str {
        match self {
            SessionKind::Order => "storefront",
            SessionKind::Messaging => "marketplace",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Order => f.write_str("order"),
            SessionKind::Messaging => f.write_str("messaging"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    PendingAuth,
    Configuring,
    ClearingCart,
    SelectingCandidate,
    AddingItems,
    PendingCancellation,
    Finalizing,
    AwaitingManualConfirmation,
    Searching,
    ContactingCandidate,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::PendingAuth => "pending-auth",
            SessionStatus::Configuring => "configuring",
            SessionStatus::ClearingCart => "clearing-cart",
            SessionStatus::SelectingCandidate => "selecting-candidate",
            SessionStatus::AddingItems => "adding-items",
            SessionStatus::PendingCancellation => "pending-cancellation",
            SessionStatus::Finalizing => "finalizing",
            SessionStatus::AwaitingManualConfirmation => "awaiting-manual-confirmation",
            SessionStatus::Searching => "searching",
            SessionStatus::ContactingCandidate => "contacting-candidate",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Human-readable description. Derived from the status alone.
    pub fn message(&self) -> &'static str {
        match self {
            SessionStatus::PendingAuth => {
                "Waiting for you to log in in the browser window"
            }
            SessionStatus::Configuring => "Setting the delivery address",
            SessionStatus::ClearingCart => "Clearing items left in the cart",
            SessionStatus::SelectingCandidate => "Looking for a store that has your items",
            SessionStatus::AddingItems => "Confirming the items in the cart",
            SessionStatus::PendingCancellation => {
                "Order is pending - waiting for the cancellation window to expire"
            }
            SessionStatus::Finalizing => "Order is being finalized - opening checkout",
            SessionStatus::AwaitingManualConfirmation => {
                "Order is ready - review it in the browser and place it yourself"
            }
            SessionStatus::Searching => "Searching listings",
            SessionStatus::ContactingCandidate => {
                "Drafting messages - press send in the browser to deliver each one"
            }
            SessionStatus::Completed => "Automation completed",
            SessionStatus::Failed => "Automation failed - check logs for details",
            SessionStatus::Cancelled => "Session was cancelled",
        }
    }

    /// Legal next states for a session of `kind` currently in `self`.
    pub fn successors(&self, kind: SessionKind) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match (kind, self) {
            (_, Completed | Failed | Cancelled) => &[],
            (SessionKind::Order, PendingAuth) => &[Configuring, Failed],
            (SessionKind::Order, Configuring) => &[ClearingCart, Failed],
            (SessionKind::Order, ClearingCart) => &[SelectingCandidate, Failed],
            (SessionKind::Order, SelectingCandidate) => &[AddingItems, Failed],
            (SessionKind::Order, AddingItems) => &[PendingCancellation, Failed],
            (SessionKind::Order, PendingCancellation) => &[Finalizing, Cancelled, Failed],
            (SessionKind::Order, Finalizing) => &[AwaitingManualConfirmation, Failed],
            (SessionKind::Order, AwaitingManualConfirmation) => &[Completed, Failed],
            (SessionKind::Messaging, PendingAuth) => &[Searching, Failed],
            (SessionKind::Messaging, Searching) => &[ContactingCandidate, Failed],
            (SessionKind::Messaging, ContactingCandidate) => &[Completed, Failed],
            _ => &[Failed],
        }
    }

    pub fn can_transition(&self, kind: SessionKind, next: SessionStatus) -> bool {
        self.successors(kind).contains(&next)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as reported to callers: a session status, or `not-found` for ids
/// the registry does not (or no longer) know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Session(SessionStatus),
    NotFound,
}

impl ReportedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportedStatus::Session(s) => s.as_str(),
            ReportedStatus::NotFound => "not-found",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReportedStatus::Session(s) => s.message(),
            ReportedStatus::NotFound => "Session not found in active sessions",
        }
    }
}

impl Serialize for ReportedStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    NotAuthenticated,
    NoViableCandidate,
    BrowserUnavailable,
    Interrupted,
    /// A guard tripped inside the engine (illegal transition and the like).
    Internal,
}

// ── Intents ──────────────────────────────────────────────────────────────────

pub const ANY_PREFERENCE: &str = "Any";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntent {
    pub delivery_address: Option<String>,
    pub item_preference: String,
    pub quantity: u32,
}

impl OrderIntent {
    /// Apply defaults: blank address → saved address, blank preference →
    /// `"Any"`, quantity defaulted and clamped to `1..=max_quantity`.
    pub fn normalized(
        delivery_address: Option<String>,
        item_preference: Option<String>,
        quantity: Option<i64>,
        limits: &OrderSettings,
    ) -> Self {
        let max = i64::from(limits.max_quantity);
        let quantity = quantity
            .unwrap_or(i64::from(limits.default_quantity))
            .clamp(1, max.max(1)) as u32;
        Self {
            delivery_address: non_blank(delivery_address),
            item_preference: non_blank(item_preference)
                .unwrap_or_else(|| ANY_PREFERENCE.to_string()),
            quantity,
        }
    }

    pub fn wants_any(&self) -> bool {
        self.item_preference.eq_ignore_ascii_case(ANY_PREFERENCE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingIntent {
    pub search_term: String,
    pub target_count: u32,
}

impl MessagingIntent {
    pub fn new(
        search_term: Option<String>,
        target_count: Option<i64>,
        limits: &MessagingSettings,
    ) -> Result<Self, SessionError> {
        let search_term = non_blank(search_term)
            .ok_or_else(|| SessionError::InvalidIntent("searchTerm is required".to_string()))?;
        let max = i64::from(limits.max_target);
        let target_count = target_count
            .unwrap_or(i64::from(limits.default_target))
            .clamp(1, max.max(1)) as u32;
        Ok(Self {
            search_term,
            target_count,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionIntent {
    Order(OrderIntent),
    Messaging(MessagingIntent),
}

impl SessionIntent {
    pub fn kind(&self) -> SessionKind {
        match self {
            SessionIntent::Order(_) => SessionKind::Order,
            SessionIntent::Messaging(_) => SessionKind::Messaging,
        }
    }

    pub fn target(&self) -> u32 {
        match self {
            SessionIntent::Order(o) => o.quantity,
            SessionIntent::Messaging(m) => m.target_count,
        }
    }
}

// ── Progress & candidates ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounters {
    pub items_added: u32,
    pub messages_sent: u32,
    pub candidates_tried: u32,
    pub target: u32,
}

/// A store or listing discovered once per session. Identity is the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub label: String,
    /// 1-based discovery position.
    pub rank: usize,
}

impl Candidate {
    /// Dedupe by URL and assign ranks in discovery order.
    pub fn ranked<I>(found: I) -> Vec<Candidate>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen = std::collections::HashSet::new();
        found
            .into_iter()
            .filter(|(url, _)| seen.insert(url.clone()))
            .enumerate()
            .map(|(i, (url, label))| Candidate {
                url,
                label,
                rank: i + 1,
            })
            .collect()
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub intent: SessionIntent,
    pub started_at: DateTime<Utc>,
    status: SessionStatus,
    progress: ProgressCounters,
    transitions: Vec<SessionStatus>,
    failure: Option<FailureCode>,
    window: Option<WindowHandle>,
}

impl Session {
    pub fn new(id: SessionId, intent: SessionIntent) -> Self {
        let progress = ProgressCounters {
            target: intent.target(),
            ..Default::default()
        };
        Self {
            id,
            intent,
            started_at: Utc::now(),
            status: SessionStatus::PendingAuth,
            progress,
            transitions: vec![SessionStatus::PendingAuth],
            failure: None,
            window: None,
        }
    }

    pub fn kind(&self) -> SessionKind {
        self.intent.kind()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn progress(&self) -> ProgressCounters {
        self.progress
    }

    pub fn transitions(&self) -> &[SessionStatus] {
        &self.transitions
    }

    pub fn failure(&self) -> Option<FailureCode> {
        self.failure
    }

    pub fn window(&self) -> Option<&WindowHandle> {
        self.window.as_ref()
    }

    pub fn transition(&mut self, next: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition(self.kind(), next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if self.status == SessionStatus::PendingCancellation {
            self.window = None;
        }
        self.status = next;
        self.transitions.push(next);
        Ok(())
    }

    /// Enter `pending-cancellation` holding `window`.
    pub fn arm_cancellation(&mut self, window: WindowHandle) -> Result<(), SessionError> {
        self.transition(SessionStatus::PendingCancellation)?;
        self.window = Some(window);
        Ok(())
    }

    pub fn fail(&mut self, code: FailureCode) -> Result<(), SessionError> {
        self.transition(SessionStatus::Failed)?;
        self.failure = Some(code);
        Ok(())
    }

    pub fn record_candidate_tried(&mut self) {
        if !self.status.is_terminal() {
            self.progress.candidates_tried += 1;
        }
    }

    pub fn record_items(&mut self, added: u32) {
        if !self.status.is_terminal() {
            self.progress.items_added = (self.progress.items_added + added).min(self.progress.target);
        }
    }

    pub fn record_message_sent(&mut self) {
        if !self.status.is_terminal() && self.progress.messages_sent < self.progress.target {
            self.progress.messages_sent += 1;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let time_remaining_secs = self.window.as_ref().map(|w| {
            let remaining = w.remaining();
            remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
        });
        SessionSnapshot {
            id: self.id,
            kind: Some(self.kind()),
            status: ReportedStatus::Session(self.status),
            message: self.status.message().to_string(),
            progress: Some(self.progress),
            started_at: Some(self.started_at),
            time_remaining_secs,
            failure: self.failure,
            transitions: self.transitions.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SessionKind>,
    pub status: ReportedStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressCounters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<SessionStatus>,
}

impl SessionSnapshot {
    pub fn not_found(id: SessionId) -> Self {
        Self {
            id,
            kind: None,
            status: ReportedStatus::NotFound,
            message: ReportedStatus::NotFound.message().to_string(),
            progress: None,
            started_at: None,
            time_remaining_secs: None,
            failure: None,
            transitions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;
    use SessionStatus::*;

    fn order_session() -> Session {
        let settings = Settings::default();
        let intent = OrderIntent::normalized(None, None, None, &settings.order);
        Session::new(uuid::Uuid::new_v4(), SessionIntent::Order(intent))
    }

    fn messaging_session(target: i64) -> Session {
        let settings = Settings::default();
        let intent =
            MessagingIntent::new(Some("desk".into()), Some(target), &settings.messaging).unwrap();
        Session::new(uuid::Uuid::new_v4(), SessionIntent::Messaging(intent))
    }

    #[test]
    fn serialized_status_matches_as_str() {
        for status in [
            PendingAuth,
            Configuring,
            ClearingCart,
            SelectingCandidate,
            AddingItems,
            PendingCancellation,
            Finalizing,
            AwaitingManualConfirmation,
            Searching,
            ContactingCandidate,
            Completed,
            Failed,
            Cancelled,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
        assert_eq!(
            serde_json::to_value(ReportedStatus::NotFound).unwrap(),
            "not-found"
        );
    }

    #[test]
    fn order_happy_path_follows_edges() {
        let mut s = order_session();
        for next in [
            Configuring,
            ClearingCart,
            SelectingCandidate,
            AddingItems,
            Finalizing,
        ] {
            if next == Finalizing {
                let (handle, _timer) = crate::session::window::arm(std::time::Duration::from_secs(10));
                s.arm_cancellation(handle).unwrap();
            }
            s.transition(next).unwrap();
        }
        s.transition(AwaitingManualConfirmation).unwrap();
        s.transition(Completed).unwrap();
        assert_eq!(
            s.transitions(),
            &[
                PendingAuth,
                Configuring,
                ClearingCart,
                SelectingCandidate,
                AddingItems,
                PendingCancellation,
                Finalizing,
                AwaitingManualConfirmation,
                Completed
            ]
        );
        assert!(s.window().is_none());
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut s = order_session();
        let err = s.transition(Finalizing).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: PendingAuth,
                to: Finalizing
            }
        );
        assert_eq!(s.status(), PendingAuth);
        assert_eq!(s.transitions(), &[PendingAuth]);
    }

    #[test]
    fn cancelled_only_from_pending_cancellation() {
        for status in [PendingAuth, Configuring, ClearingCart, Finalizing] {
            assert!(!status.can_transition(SessionKind::Order, Cancelled));
        }
        assert!(PendingCancellation.can_transition(SessionKind::Order, Cancelled));
        assert!(!ContactingCandidate.can_transition(SessionKind::Messaging, Cancelled));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        let mut s = messaging_session(3);
        s.fail(FailureCode::NotAuthenticated).unwrap();
        assert_eq!(s.failure(), Some(FailureCode::NotAuthenticated));
        assert!(s.transition(Searching).is_err());
        assert!(s.fail(FailureCode::Interrupted).is_err());
        assert_eq!(s.failure(), Some(FailureCode::NotAuthenticated));
    }

    #[test]
    fn messaging_edges_exclude_order_states() {
        assert!(!PendingAuth.can_transition(SessionKind::Messaging, Configuring));
        assert!(!PendingAuth.can_transition(SessionKind::Order, Searching));
        assert!(Searching.can_transition(SessionKind::Messaging, Failed));
    }

    #[test]
    fn progress_never_exceeds_target() {
        let mut s = messaging_session(2);
        for _ in 0..5 {
            s.record_message_sent();
        }
        assert_eq!(s.progress().messages_sent, 2);

        let mut o = order_session();
        o.record_items(4);
        o.record_items(4);
        assert_eq!(o.progress().items_added, 6);
    }

    #[test]
    fn intents_apply_defaults_and_clamp() {
        let settings = Settings::default();
        let o = OrderIntent::normalized(Some("  ".into()), Some("".into()), Some(40), &settings.order);
        assert_eq!(o.delivery_address, None);
        assert_eq!(o.item_preference, "Any");
        assert!(o.wants_any());
        assert_eq!(o.quantity, 12);
        let o = OrderIntent::normalized(None, Some("IPA".into()), Some(-3), &settings.order);
        assert_eq!(o.quantity, 1);
        assert_eq!(
            OrderIntent::normalized(None, None, None, &settings.order).quantity,
            6
        );

        let m = MessagingIntent::new(Some(" bike ".into()), None, &settings.messaging).unwrap();
        assert_eq!(m.search_term, "bike");
        assert_eq!(m.target_count, 30);
        let m = MessagingIntent::new(Some("bike".into()), Some(500), &settings.messaging).unwrap();
        assert_eq!(m.target_count, 100);
        assert!(matches!(
            MessagingIntent::new(Some("   ".into()), None, &settings.messaging),
            Err(SessionError::InvalidIntent(_))
        ));
    }

    #[test]
    fn candidates_keep_discovery_order_and_dedupe() {
        let c = Candidate::ranked(vec![
            ("https://x/store/1".to_string(), "One".to_string()),
            ("https://x/store/2".to_string(), "Two".to_string()),
            ("https://x/store/1".to_string(), "One again".to_string()),
            ("https://x/store/3".to_string(), "Three".to_string()),
        ]);
        let urls: Vec<_> = c.iter().map(|c| (c.rank, c.label.as_str())).collect();
        assert_eq!(urls, vec![(1, "One"), (2, "Two"), (3, "Three")]);
    }

    #[test]
    fn not_found_snapshot_is_distinct() {
        let id = uuid::Uuid::new_v4();
        let json = serde_json::to_value(SessionSnapshot::not_found(id)).unwrap();
        assert_eq!(json["status"], "not-found");
        assert_eq!(json["message"], "Session not found in active sessions");
        assert!(json.get("progress").is_none());
    }
}
