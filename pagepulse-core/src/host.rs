//! Host environment contracts
//!
//! The tracker never talks to a browser directly. Everything it needs from the
//! embedding page (time, location, visibility, memory counters, user agent
//! classification) comes through the traits in this module.

use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

use crate::metrics::MemoryInfo;

// ============================================
// Clock
// ============================================

/// Source of wall-clock time in epoch milliseconds.
pub trait Clock {
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.set(now_ms);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.set(self.now.get() + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.get()
    }
}

// ============================================
// Page
// ============================================

/// Read-only view of the page the tracker is embedded in.
pub trait PageContext {
    /// Full current URL
    fn url(&self) -> String;
    /// Current visible pathname
    fn pathname(&self) -> String;
    /// Document referrer, if any
    fn referrer(&self) -> Option<String>;
    /// Raw user-agent string
    fn user_agent(&self) -> String;
    /// Whether the page is currently foreground-visible
    fn is_visible(&self) -> bool;
    /// Heap counters, when the host exposes them
    fn memory(&self) -> Option<MemoryInfo> {
        None
    }
}

/// Mutable in-process page model.
///
/// Hosts that mirror a real page (or replay a recorded one) update this as the
/// page changes and share it with the tracker through an `Rc`.
#[derive(Debug)]
pub struct PageState {
    url: RefCell<url::Url>,
    referrer: RefCell<Option<String>>,
    user_agent: String,
    visible: Cell<bool>,
    memory: Cell<Option<MemoryInfo>>,
}

impl PageState {
    /// Create a visible page at `url`.
    pub fn new(url: &str) -> crate::Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| crate::Error::Config(format!("invalid page url {:?}: {}", url, e)))?;
        Ok(Self {
            url: RefCell::new(parsed),
            referrer: RefCell::new(None),
            user_agent: String::new(),
            visible: Cell::new(true),
            memory: Cell::new(None),
        })
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        *self.referrer.borrow_mut() = Some(referrer.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Navigate within the page. Relative paths resolve against the current URL.
    pub fn navigate(&self, target: &str) -> crate::Result<()> {
        let next = self
            .url
            .borrow()
            .join(target)
            .map_err(|e| crate::Error::Config(format!("invalid navigation {:?}: {}", target, e)))?;
        *self.url.borrow_mut() = next;
        Ok(())
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    pub fn set_memory(&self, memory: Option<MemoryInfo>) {
        self.memory.set(memory);
    }
}

impl PageContext for PageState {
    fn url(&self) -> String {
        self.url.borrow().to_string()
    }

    fn pathname(&self) -> String {
        self.url.borrow().path().to_string()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.borrow().clone()
    }

    fn user_agent(&self) -> String {
        self.user_agent.clone()
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn memory(&self) -> Option<MemoryInfo> {
        self.memory.get()
    }
}

// ============================================
// User agent
// ============================================

/// Browser and operating system derived from a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentData {
    pub browser: String,
    pub os: String,
}

impl UserAgentData {
    pub fn unknown() -> Self {
        Self {
            browser: "unknown".to_string(),
            os: "unknown".to_string(),
        }
    }
}

/// Maps a raw user-agent string to [`UserAgentData`].
pub trait UserAgentClassifier {
    fn classify(&self, user_agent: &str) -> UserAgentData;
}

/// Classifier used when the host supplies none.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnclassifiedAgent;

impl UserAgentClassifier for UnclassifiedAgent {
    fn classify(&self, _user_agent: &str) -> UserAgentData {
        UserAgentData::unknown()
    }
}
