//! # pagepulse-core
//!
//! Core library for pagepulse - page session and performance telemetry.
//!
//! This library provides:
//! - A persisted, sliding session lifecycle and a durable client identity
//! - Aggregation of page performance signals (CLS, INP, TBT, LCP, FCP, ...)
//! - Event composition and best-effort beacon dispatch
//! - Configuration, logging and storage infrastructure
//!
//! ## Architecture
//!
//! The host page feeds signals into a [`Tracker`]; everything flows one way:
//! - **Signals:** performance entry batches go to the [`MetricCollector`]
//! - **Composition:** session + snapshot + caller data become an [`Event`]
//! - **Dispatch:** events are serialized and handed to a [`Beacon`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use pagepulse_core::{Config, PageState, SqliteStore, Tracker};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = SqliteStore::open(&config.storage_path()).expect("failed to open store");
//! let page = PageState::new("https://shop.example.com/").expect("invalid url");
//!
//! let tracker = Tracker::builder(config.tracker)
//!     .store(Rc::new(store))
//!     .page(Rc::new(page))
//!     .build()
//!     .expect("failed to build tracker");
//! tracker.initialize();
//! tracker.track("signup", None);
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, TrackerConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, FailureKind, NoopSink, RecordingSink, TracingSink};
pub use error::{Error, Result};
pub use event::{Event, LifecycleEvent};
pub use host::{Clock, ManualClock, PageContext, PageState, SystemClock, UserAgentData};
pub use metrics::{Capabilities, MetricCollector, MetricSnapshot, PerformanceEntry, SignalKind};
pub use session::{Session, SessionOrigin, SessionState};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore};
pub use tracker::{Tracker, TrackerBuilder};
pub use transport::{Beacon, DeliveryMode, HttpBeacon, MemoryBeacon, Outgoing, PendingQueue};

// Public modules
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod host;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod transport;
