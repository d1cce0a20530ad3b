//! The embedding surface
//!
//! A [`Tracker`] is built once per page by [`TrackerBuilder`] and handed to the
//! host, which forwards browser signals to it:
//!
//! ```text
//! TrackerBuilder::build ──▶ Tracker::initialize
//!                               │ session-start (new) / page-view (resumed)
//!                               │ drain pending queue
//!                               ▼
//!   observe / track / track_event / on_pathname_change / refresh
//!                               │
//!                               ▼
//!   on_visibility_change(hidden) | on_unload | destroy ──▶ web-vitals (once)
//! ```
//!
//! The handle is a cheap `Rc` clone and is `!Send`: it lives on the host's
//! event loop. Public operations never return errors; faults go to the
//! configured [`DiagnosticSink`].

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::TrackerConfig;
use crate::diagnostics::{report, report_error, Diagnostic, DiagnosticSink, FailureKind, NoopSink};
use crate::error::{Error, Result};
use crate::event::{Event, EventComposer, LifecycleEvent, PageLocation};
use crate::host::{Clock, PageContext, SystemClock, UnclassifiedAgent, UserAgentClassifier};
use crate::identity::ClientIdentity;
use crate::metrics::{
    Capabilities, CollectorOptions, MetricCollector, MetricSnapshot, NavigationTiming,
    PerformanceEntry, SignalKind, Subscription,
};
use crate::session::{Session, SessionManager, SessionOrigin, SessionState};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::transport::{
    Beacon, DeliveryMode, HttpBeacon, Outgoing, PendingQueue, QueueTag, QueuedEvent, Transport,
};

/// Builds a [`Tracker`] from configuration and host collaborators.
pub struct TrackerBuilder {
    config: TrackerConfig,
    store: Option<Rc<dyn KeyValueStore>>,
    beacon: Option<Rc<dyn Beacon>>,
    page: Option<Rc<dyn PageContext>>,
    clock: Rc<dyn Clock>,
    classifier: Box<dyn UserAgentClassifier>,
    sink: Rc<dyn DiagnosticSink>,
    capabilities: Capabilities,
    pending: Option<PendingQueue>,
}

impl TrackerBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            store: None,
            beacon: None,
            page: None,
            clock: Rc::new(SystemClock),
            classifier: Box::new(UnclassifiedAgent),
            sink: Rc::new(NoopSink),
            capabilities: Capabilities::all(),
            pending: None,
        }
    }

    /// Durable storage. Defaults to a store that forgets everything on drop.
    pub fn store(mut self, store: Rc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Payload delivery. Defaults to an [`HttpBeacon`] on the configured endpoint.
    pub fn beacon(mut self, beacon: Rc<dyn Beacon>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    /// The page being tracked. Required.
    pub fn page(mut self, page: Rc<dyn PageContext>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn classifier(mut self, classifier: Box<dyn UserAgentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn sink(mut self, sink: Rc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Signal sources the host can observe. Defaults to all of them.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Events the host buffered before the tracker existed.
    pub fn pending(mut self, pending: PendingQueue) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn build(self) -> Result<Tracker> {
        self.config.validate()?;

        let page = self
            .page
            .ok_or_else(|| Error::Config("a page context is required".to_string()))?;
        let beacon: Rc<dyn Beacon> = match self.beacon {
            Some(beacon) => beacon,
            None => Rc::new(HttpBeacon::new(&self.config)?),
        };
        let store: Rc<dyn KeyValueStore> = match self.store {
            Some(store) => store,
            None => Rc::new(MemoryStore::new()),
        };
        let pending = self
            .pending
            .unwrap_or_else(|| PendingQueue::new(self.config.max_pending_events));

        let client = ClientIdentity::resolve(store.as_ref(), self.sink.as_ref());
        let user_agent = self.classifier.classify(&page.user_agent());
        let page_load_id = uuid::Uuid::new_v4().to_string();

        let metrics = MetricCollector::new(
            self.capabilities,
            CollectorOptions {
                max_resources: self.config.max_resources,
                interaction_threshold_ms: self.config.interaction_threshold_ms,
            },
            self.sink.clone(),
        );
        let sessions = SessionManager::new(
            store,
            self.sink.clone(),
            self.config.session_duration_ms(),
        );
        let transport = Transport::new(beacon, pending, self.sink.clone());

        tracing::debug!(page_load_id = %page_load_id, "Tracker built");

        let inner = TrackerInner {
            config: self.config,
            context: EventContext {
                composer: EventComposer::new(page_load_id, user_agent),
                client,
                page,
                clock: self.clock,
            },
            sink: self.sink,
            sessions,
            metrics,
            transport,
            last_pathname: None,
            final_flushed: false,
            destroyed: false,
        };
        let (shutdown, _) = watch::channel(false);

        Ok(Tracker {
            inner: Rc::new(RefCell::new(inner)),
            shutdown: Rc::new(shutdown),
        })
    }
}

/// Everything needed to stamp an event, apart from the session.
struct EventContext {
    composer: EventComposer,
    client: ClientIdentity,
    page: Rc<dyn PageContext>,
    clock: Rc<dyn Clock>,
}

impl EventContext {
    fn location(&self) -> PageLocation {
        PageLocation {
            url: self.page.url(),
            pathname: self.page.pathname(),
            referrer: self.page.referrer(),
        }
    }

    fn compose(&self, name: &str, data: Option<Value>, session: Option<&Session>) -> Result<Event> {
        let timestamp =
            DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_else(Utc::now);
        self.composer
            .compose(name, data, session, &self.client, &self.location(), timestamp)
    }
}

struct TrackerInner {
    config: TrackerConfig,
    context: EventContext,
    sink: Rc<dyn DiagnosticSink>,
    sessions: SessionManager,
    metrics: MetricCollector,
    transport: Transport,
    /// Pathname of the last page-view, set once the session is ready
    last_pathname: Option<String>,
    final_flushed: bool,
    destroyed: bool,
}

impl TrackerInner {
    fn now(&self) -> i64 {
        self.context.clock.now_ms()
    }

    /// Make sure an unexpired session exists, rotating an expired one.
    fn ensure_session(&mut self) -> bool {
        let now = self.now();
        match self.sessions.state(now) {
            SessionState::Active => true,
            SessionState::Expired => {
                if self.sessions.rotate(now).is_err() {
                    return false;
                }
                self.send_now(LifecycleEvent::SessionStart.as_str(), None, DeliveryMode::Standard);
                true
            }
            SessionState::Uninitialized | SessionState::Ended => false,
        }
    }

    /// Compose against the current session and send, without rotation.
    fn send_now(&self, name: &str, data: Option<Value>, mode: DeliveryMode) -> bool {
        match self.context.compose(name, data, self.sessions.session()) {
            Ok(event) => self.transport.send(&event, mode),
            Err(e) => {
                report_error(self.sink.as_ref(), "tracker.dispatch", &e);
                false
            }
        }
    }

    fn dispatch(&mut self, name: &str, data: Option<Value>, mode: DeliveryMode) -> bool {
        if !self.ensure_session() {
            report(
                self.sink.as_ref(),
                Diagnostic::new(
                    FailureKind::SessionNotReady,
                    "tracker.dispatch",
                    format!("no active session, dropping {:?}", name),
                ),
            );
            return false;
        }
        self.send_now(name, data, mode)
    }

    fn is_ready(&self) -> bool {
        matches!(
            self.sessions.state(self.now()),
            SessionState::Active | SessionState::Expired
        )
    }

    fn flush_final_metrics(&mut self) -> bool {
        if self.final_flushed {
            return false;
        }
        self.final_flushed = true;

        let memory = self.context.page.memory();
        self.metrics.record_memory(memory);
        let data = match serde_json::to_value(self.metrics.snapshot()) {
            Ok(data) => data,
            Err(e) => {
                report_error(self.sink.as_ref(), "tracker.flush", &Error::from(e));
                return false;
            }
        };

        tracing::debug!("Flushing final metrics");
        self.dispatch(
            LifecycleEvent::WebVitals.as_str(),
            Some(data),
            DeliveryMode::Beacon,
        )
    }
}

/// Handle to one page's telemetry.
#[derive(Clone)]
pub struct Tracker {
    inner: Rc<RefCell<TrackerInner>>,
    shutdown: Rc<watch::Sender<bool>>,
}

impl Tracker {
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Resolve the session and release anything queued before it existed.
    ///
    /// Returns `None` if the tracker was already initialized, destroyed, or
    /// could not persist a new session.
    pub fn initialize(&self) -> Option<SessionOrigin> {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed {
            return None;
        }

        let now = inner.now();
        let origin = inner.sessions.initialize(now)?;
        inner.last_pathname = Some(inner.context.page.pathname());

        let tag = match origin {
            SessionOrigin::New => {
                inner.send_now(
                    LifecycleEvent::SessionStart.as_str(),
                    None,
                    DeliveryMode::Standard,
                );
                QueueTag::Initial
            }
            SessionOrigin::Resumed => {
                inner.send_now(LifecycleEvent::PageView.as_str(), None, DeliveryMode::Standard);
                QueueTag::Custom
            }
        };

        let queued = inner.transport.drain_pending();
        if !queued.is_empty() {
            tracing::debug!(count = queued.len(), tag = tag.as_str(), "Releasing queued events");
        }
        for entry in queued {
            let data = entry.tagged_data(tag);
            inner.dispatch(&entry.name, Some(data), DeliveryMode::Standard);
        }

        Some(origin)
    }

    /// Record a caller event; buffered until the session is ready.
    pub fn track(&self, name: &str, properties: Option<Value>) -> Outgoing {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed {
            return Outgoing::Dropped;
        }

        let ready = inner.transport.is_drained() && inner.ensure_session();
        let session = if ready { inner.sessions.session() } else { None };
        let context = &inner.context;
        inner
            .transport
            .enqueue_or_send(QueuedEvent::new(name, properties), |entry| {
                context.compose(&entry.name, entry.properties, session)
            })
    }

    /// Record a caller event, waiting once for the session if it is not ready.
    ///
    /// Returns whether the event was handed to the beacon.
    pub async fn track_event(&self, name: &str, data: Option<Value>) -> bool {
        let grace = {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return false;
            }
            (!inner.is_ready()).then(|| inner.config.ready_grace())
        };

        if let Some(grace) = grace {
            tokio::time::sleep(grace).await;
        }

        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed {
            return false;
        }
        inner.dispatch(name, data, DeliveryMode::Standard)
    }

    /// Slide the session expiration forward if the page is visible.
    pub fn refresh(&self) -> bool {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed {
            return false;
        }
        let now = inner.now();
        let visible = inner.context.page.is_visible();
        inner.sessions.refresh(now, visible)
    }

    /// Refresh on a fixed interval until the tracker is destroyed.
    pub async fn run_refresh_timer(&self) {
        let period = self.inner.borrow().config.refresh_interval();
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Refresh timer stopped");
    }

    /// Feed a batch delivered by one signal source.
    pub fn observe(&self, kind: SignalKind, entries: &[PerformanceEntry]) {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed {
            return;
        }
        inner.metrics.observe(kind, entries);
    }

    /// The document reached "complete"; capture navigation timings.
    pub fn on_document_complete(&self, navigation: Option<NavigationTiming>) {
        let Some(navigation) = navigation else {
            return;
        };
        self.observe(
            SignalKind::Navigation,
            &[PerformanceEntry::Navigation(navigation)],
        );
    }

    /// The visible pathname may have changed. Emits one page-view per new pathname.
    pub fn on_pathname_change(&self) -> bool {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed || inner.last_pathname.is_none() {
            return false;
        }

        let pathname = inner.context.page.pathname();
        if inner.last_pathname.as_deref() == Some(pathname.as_str()) {
            return false;
        }
        inner.last_pathname = Some(pathname);
        inner.dispatch(LifecycleEvent::PageView.as_str(), None, DeliveryMode::Standard)
    }

    /// Page visibility flipped; hiding the page triggers the final flush.
    pub fn on_visibility_change(&self) {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed || inner.context.page.is_visible() {
            return;
        }
        inner.flush_final_metrics();
    }

    /// Page teardown: final metrics, then a best-effort session-end.
    pub fn on_unload(&self) {
        let inner = &mut *self.inner.borrow_mut();
        if inner.destroyed || inner.sessions.state(inner.now()) == SessionState::Ended {
            return;
        }

        inner.flush_final_metrics();
        inner.dispatch(LifecycleEvent::SessionEnd.as_str(), None, DeliveryMode::Beacon);
        inner.sessions.end();
    }

    /// Tear the tracker down. Nothing is dispatched afterwards.
    pub fn destroy(&self) {
        {
            let inner = &mut *self.inner.borrow_mut();
            if inner.destroyed {
                return;
            }
            inner.flush_final_metrics();
            inner.destroyed = true;
            inner.metrics.disconnect();
            inner.sessions.destroy();
        }
        self.shutdown.send_replace(true);
        tracing::debug!("Tracker destroyed");
    }

    pub fn metrics(&self) -> MetricSnapshot {
        self.inner.borrow().metrics.snapshot()
    }

    /// Sources the host should observe and feed to [`Tracker::observe`].
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.borrow().metrics.subscriptions()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.borrow().sessions.session().cloned()
    }

    pub fn session_state(&self) -> SessionState {
        let inner = self.inner.borrow();
        inner.sessions.state(inner.now())
    }

    pub fn client_id(&self) -> String {
        self.inner.borrow().context.client.client_id().to_string()
    }

    pub fn page_load_id(&self) -> String {
        self.inner.borrow().context.composer.page_load_id().to_string()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.borrow().transport.pending_len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }
}
