//! Session lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Active ──(now ≥ expiration)──▶ Expired
//!                                 ▲  │                             │
//!                                 │  └──refresh (persisted ok)──┐  │
//!                                 └─────────────────────────────┘  │
//!                                 ▲                                 │
//!                                 └──────────────rotate─────────────┘
//! Active ──end──▶ Ended (terminal, page teardown only)
//! ```
//!
//! The session id and its expiration are always written together. The in-memory
//! expiration only moves after the store accepted the new value, so a failed
//! refresh leaves both copies where they were and the next tick retries.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{report_error, DiagnosticSink};
use crate::error::{Error, Result};
use crate::storage::{KeyValueStore, SESSION_EXPIRATION_KEY, SESSION_ID_KEY};

/// A bounded period of visitor activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    /// Absolute expiration, epoch ms
    pub expiration_time: i64,
    /// When this page first saw the session, epoch ms
    pub start_time: i64,
}

impl Session {
    /// A session is valid strictly before its expiration.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expiration_time
    }
}

/// How `initialize` obtained its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOrigin {
    /// Nothing usable was persisted; a fresh session was created
    New,
    /// A persisted, unexpired session was reused
    Resumed,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Expired,
    Ended,
}

pub struct SessionManager {
    store: Rc<dyn KeyValueStore>,
    sink: Rc<dyn DiagnosticSink>,
    duration_ms: i64,
    session: Option<Session>,
    ended: bool,
    destroyed: bool,
}

impl SessionManager {
    pub fn new(store: Rc<dyn KeyValueStore>, sink: Rc<dyn DiagnosticSink>, duration_ms: i64) -> Self {
        Self {
            store,
            sink,
            duration_ms,
            session: None,
            ended: false,
            destroyed: false,
        }
    }

    /// Resolve the session for this page.
    ///
    /// Returns `None` when the manager already holds a session, has been torn
    /// down, or could not persist a new session.
    pub fn initialize(&mut self, now_ms: i64) -> Option<SessionOrigin> {
        if self.destroyed || self.ended || self.session.is_some() {
            return None;
        }

        if let Some((session_id, expiration_time)) = self.read_persisted() {
            if now_ms < expiration_time {
                tracing::debug!(session_id = %session_id, "Resumed session");
                self.session = Some(Session {
                    session_id,
                    expiration_time,
                    start_time: now_ms,
                });
                return Some(SessionOrigin::Resumed);
            }
            tracing::debug!(session_id = %session_id, "Persisted session expired");
        }

        match self.create(now_ms) {
            Ok(session) => {
                tracing::info!(session_id = %session.session_id, "Started session");
                self.session = Some(session);
                Some(SessionOrigin::New)
            }
            Err(e) => {
                report_error(self.sink.as_ref(), "session.initialize", &e);
                None
            }
        }
    }

    /// Slide the expiration forward.
    ///
    /// Returns true only when the new expiration was persisted and adopted.
    pub fn refresh(&mut self, now_ms: i64, page_visible: bool) -> bool {
        if self.destroyed || self.ended || !page_visible {
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.is_valid_at(now_ms) {
            return false;
        }

        let expiration_time = now_ms.saturating_add(self.duration_ms);
        let expiration = expiration_time.to_string();
        match self.store.set_all(&[
            (SESSION_ID_KEY, session.session_id.as_str()),
            (SESSION_EXPIRATION_KEY, expiration.as_str()),
        ]) {
            Ok(()) => {
                session.expiration_time = expiration_time;
                tracing::trace!(expiration_time, "Refreshed session");
                true
            }
            Err(e) => {
                report_error(self.sink.as_ref(), "session.refresh", &e);
                false
            }
        }
    }

    /// Replace an expired session with a new one.
    ///
    /// On failure the manager is left without a session.
    pub fn rotate(&mut self, now_ms: i64) -> Result<&Session> {
        if self.destroyed || self.ended {
            return Err(Error::Destroyed);
        }
        self.session = None;
        match self.create(now_ms) {
            Ok(session) => {
                tracing::info!(session_id = %session.session_id, "Rotated expired session");
                Ok(self.session.insert(session))
            }
            Err(e) => {
                report_error(self.sink.as_ref(), "session.rotate", &e);
                Err(e)
            }
        }
    }

    /// Terminal transition at page teardown.
    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self, now_ms: i64) -> SessionState {
        if self.ended {
            return SessionState::Ended;
        }
        match &self.session {
            None => SessionState::Uninitialized,
            Some(s) if s.is_valid_at(now_ms) => SessionState::Active,
            Some(_) => SessionState::Expired,
        }
    }

    fn read_persisted(&self) -> Option<(String, i64)> {
        let read = |key: &str| match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                report_error(self.sink.as_ref(), "session.read", &e);
                None
            }
        };

        let session_id = read(SESSION_ID_KEY).filter(|id| !id.is_empty())?;
        let raw_expiration = read(SESSION_EXPIRATION_KEY)?;
        match raw_expiration.trim().parse::<i64>() {
            Ok(expiration_time) => Some((session_id, expiration_time)),
            Err(_) => {
                tracing::debug!(value = %raw_expiration, "Ignoring unparseable session expiration");
                None
            }
        }
    }

    fn create(&self, now_ms: i64) -> Result<Session> {
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            expiration_time: now_ms.saturating_add(self.duration_ms),
            start_time: now_ms,
        };
        let expiration = session.expiration_time.to_string();
        self.store.set_all(&[
            (SESSION_ID_KEY, session.session_id.as_str()),
            (SESSION_EXPIRATION_KEY, expiration.as_str()),
        ])?;
        Ok(session)
    }
}
