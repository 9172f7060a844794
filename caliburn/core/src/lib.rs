//! Caliburn Core - Toolkit-Agnostic MVVM Framework Core
//!
//! This crate keeps view models free of UI toolkit types. It provides the
//! plumbing every MVVM application needs between its view models and
//! whatever toolkit renders them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Host Application                         │
//! │   UI toolkit  ── implements ──▶ ViewAdapter                       │
//! │   UI thread   ── runs ───────▶ Dispatcher (UiThread::start)       │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ initialize(design_time, adapter)
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                       CALIBURN CORE                              │
//! │                     ┌─────────┴─────────┐                        │
//! │                     │     UiContext     │  thread affinity,      │
//! │                     │                   │  run / spawn on UI     │
//! │                     └────┬─────────┬────┘                        │
//! │                          │         │                             │
//! │          ┌───────────────┴──┐   ┌──┴──────────────────────────┐  │
//! │          │ EventAggregator  │   │  Screens / Conductors       │  │
//! │          │ weak, thread-    │   │  activation state machine,  │  │
//! │          │ routed pub/sub   │   │  guarded async close        │  │
//! │          └──────────────────┘   └─────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`UiContext`]: which thread is the UI thread and how to post to it
//! - [`EventAggregator`]: publish/subscribe with weak subscribers
//! - [`Screen`] / [`ScreenExt`]: lifecycle hooks and transitions
//! - [`Conductor`], [`OneActive`], [`AllActive`]: screens that own screens
//! - [`Operation`]: handle to marshaled work, with [`FaultSink`] for faults
//!   nobody awaited
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use caliburn_core::{
//!     EventAggregator, HandlerResult, NullViewAdapter, ThreadOption, UiContext, UiThread,
//! };
//!
//! struct Greeting(String);
//!
//! fn show(greeting: &Greeting) -> HandlerResult {
//!     println!("{}", greeting.0);
//!     Ok(())
//! }
//!
//! let context = UiContext::new();
//! let ui = UiThread::start(&context, "ui", false, Arc::new(NullViewAdapter))?;
//!
//! let events = EventAggregator::new(context.clone());
//! events.subscribe(show, ThreadOption::UiThread);
//! events.publish(Greeting("hello".into()))?;
//!
//! ui.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Module Overview
//!
//! - [`dispatcher`]: UI dispatcher loop and background thread pool
//! - [`operation`]: operations, faults and fault sinks
//! - [`ui_context`]: UI thread affinity and the view adapter seam
//! - [`events`]: the event aggregator
//! - [`screen`]: screen lifecycle and the close guard
//! - [`conductor`]: single and collection conductors
//! - [`config`]: TOML / environment configuration
//!
//! # No Toolkit Dependencies
//!
//! Views are opaque `Arc<dyn Any + Send + Sync>` values. Everything that
//! needs the toolkit goes through [`ViewAdapter`].

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod conductor;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod operation;
pub mod screen;
pub mod ui_context;

pub use conductor::{
    AllActive, CloseResult, CloseStrategy, Conductor, DefaultCloseStrategy, OneActive,
};
pub use dispatcher::{DispatcherScheduler, Job, Scheduler, ThreadPool, UiThread};
pub use events::{EventAggregator, PublishError, Subscription, SubscriptionId, ThreadOption};
pub use operation::{run_on, spawn_on, Fault, FaultSink, HandlerResult, Operation, TracingFaultSink};
pub use screen::{
    CloseDecision, CloseGuard, CloseGuardToken, LifecycleError, LifecycleEvent, Screen,
    ScreenCore, ScreenExt, ScreenId, ScreenState,
};
pub use ui_context::{NullViewAdapter, UiContext, View, ViewAdapter, ViewHandler};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, CaliburnToml,
    ConfigError, ConfigOverrides, ConfigSource, FrameworkConfig,
};
