//! Event composition
//!
//! Turns a name plus optional caller data into the canonical [`Event`] payload
//! by merging in the session, the client identity, the page-load id and the
//! page location. Composition is pure: no I/O, and the only failure is a
//! missing session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::host::UserAgentData;
use crate::identity::ClientIdentity;
use crate::session::Session;

/// Referrer value used for same-origin and missing referrers
pub const DIRECT_REFERRER: &str = "Direct";

/// Events the tracker emits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SessionStart,
    PageView,
    WebVitals,
    SessionEnd,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::SessionStart => "session-start",
            LifecycleEvent::PageView => "page-view",
            LifecycleEvent::WebVitals => "web-vitals",
            LifecycleEvent::SessionEnd => "session-end",
        }
    }
}

/// Canonical payload sent to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "event")]
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub pathname: String,
    pub referrer: String,
    pub client_id: String,
    pub session_id: String,
    pub page_load_id: String,
    pub user_agent_data: UserAgentData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<serde_json::Value>,
}

/// Where the page is at composition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub url: String,
    pub pathname: String,
    pub referrer: Option<String>,
}

/// `"Direct"` for a missing or same-origin referrer, the referrer itself otherwise.
pub fn classify_referrer(referrer: Option<&str>, page_url: &str) -> String {
    let referrer = match referrer.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return DIRECT_REFERRER.to_string(),
    };

    match (url::Url::parse(referrer), url::Url::parse(page_url)) {
        (Ok(from), Ok(page)) if from.origin() == page.origin() => DIRECT_REFERRER.to_string(),
        _ => referrer.to_string(),
    }
}

/// Per-page composer; holds what stays fixed for one page load.
#[derive(Debug, Clone)]
pub struct EventComposer {
    page_load_id: String,
    user_agent: UserAgentData,
}

impl EventComposer {
    pub fn new(page_load_id: impl Into<String>, user_agent: UserAgentData) -> Self {
        Self {
            page_load_id: page_load_id.into(),
            user_agent,
        }
    }

    pub fn page_load_id(&self) -> &str {
        &self.page_load_id
    }

    pub fn compose(
        &self,
        name: &str,
        data: Option<serde_json::Value>,
        session: Option<&Session>,
        client: &ClientIdentity,
        location: &PageLocation,
        timestamp: DateTime<Utc>,
    ) -> Result<Event> {
        let session = session.ok_or(Error::SessionNotReady)?;

        Ok(Event {
            name: name.to_string(),
            timestamp,
            url: location.url.clone(),
            pathname: location.pathname.clone(),
            referrer: classify_referrer(location.referrer.as_deref(), &location.url),
            client_id: client.client_id().to_string(),
            session_id: session.session_id.clone(),
            page_load_id: self.page_load_id.clone(),
            user_agent_data: self.user_agent.clone(),
            event_data: data,
        })
    }
}
