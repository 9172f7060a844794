//! Event Aggregation
//!
//! Loosely coupled publish/subscribe between view models.
//!
//! - [`EventAggregator`]: the bus itself
//! - [`ThreadOption`]: on which thread a handler wants to run
//! - [`Subscription`]: token returned by every subscribe call
//!
//! Handlers are plain function pointers. Anything a handler needs to reach
//! is passed as an explicit target that the aggregator holds weakly (or,
//! with `subscribe_owned`, strongly), so a subscriber's lifetime is never
//! extended by accident.

mod aggregator;
mod registration;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use aggregator::EventAggregator;

/// Thread on which a handler is executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadOption {
    /// Whichever thread called `publish`
    #[default]
    #[serde(alias = "publisher")]
    PublisherThread,
    /// The UI thread
    #[serde(alias = "ui")]
    UiThread,
    /// A background worker
    #[serde(alias = "background")]
    BackgroundThread,
}

impl ThreadOption {
    /// Parse an option from a string (for environment variables)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "publisher" | "publisher-thread" | "publisherthread" => Some(Self::PublisherThread),
            "ui" | "ui-thread" | "uithread" => Some(Self::UiThread),
            "background" | "background-thread" | "backgroundthread" => {
                Some(Self::BackgroundThread)
            }
            _ => None,
        }
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::PublisherThread => "publisher thread",
            Self::UiThread => "UI thread",
            Self::BackgroundThread => "background thread",
        }
    }
}

impl fmt::Display for ThreadOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Unique identifier of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Token identifying one registration
///
/// Pass it to [`EventAggregator::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: SubscriptionId,
    message_type: &'static str,
    thread_option: ThreadOption,
}

impl Subscription {
    /// Unique registration id
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the message type the handler accepts
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    /// Thread the handler runs on
    #[must_use]
    pub fn thread_option(&self) -> ThreadOption {
        self.thread_option
    }
}

/// Errors returned by [`EventAggregator::publish`]
#[derive(Debug, Error)]
pub enum PublishError {
    /// A handler running on the publisher's thread failed
    ///
    /// Handlers after the failing one were not invoked.
    #[error("handler {subscription} failed: {error:#}")]
    Handler {
        /// The failing registration
        subscription: SubscriptionId,
        /// What the handler returned
        error: anyhow::Error,
    },
}
