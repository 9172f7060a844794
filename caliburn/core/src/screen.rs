//! Screens - Activation Lifecycle
//!
//! A screen is a view model with a lifecycle. Conductors drive it; hosts
//! observe it through [`ScreenCore::subscribe`].
//!
//! # States
//!
//! ```text
//!               activate()                 deactivate(false)
//!   Initial ───────────────▶ Active ───────────────────────▶ Deactivated
//!      │                      ▲  │                               │
//!      │                      │  └──── activate() ◀──────────────┘
//!      │                      │
//!      │ deactivate(true)     │ deactivate(true)
//!      ▼                      │
//!   Closed ◀──────────────────┘   (terminal: activate() is rejected)
//! ```
//!
//! While a deactivation hook runs the screen is `Deactivating`.
//!
//! # Guarded close
//!
//! [`ScreenExt::guarded_can_close`] asks [`Screen::can_close`] at most once
//! at a time per screen. A query issued while another is outstanding gets
//! [`CloseDecision::Pending`] right away.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::ui_context::{UiContext, View};

/// Capacity of the lifecycle event channel per screen
const EVENT_CAPACITY: usize = 32;

/// Unique identifier for a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenId(u64);

impl ScreenId {
    /// Generate a new unique screen ID
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ScreenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "screen-{}", self.0)
    }
}

/// Lifecycle state of a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScreenState {
    /// Never activated
    #[default]
    Initial,
    /// Currently active
    Active,
    /// Deactivation hook is running
    Deactivating,
    /// Temporarily inactive
    Deactivated,
    /// Closed for good
    Closed,
}

impl ScreenState {
    /// Whether the screen is closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Deactivated => "deactivated",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ScreenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Lifecycle notifications emitted by a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The screen became active
    Activated {
        /// Whether this activation also initialized the screen
        was_initialized: bool,
    },
    /// The screen is about to deactivate
    AttemptingDeactivation {
        /// Whether it is going to close
        closing: bool,
    },
    /// The screen is no longer active
    Deactivated {
        /// Whether it closed
        closed: bool,
    },
}

/// Re-entrancy guard for asynchronous close queries
///
/// Usable on its own by view models that are not screens.
#[derive(Debug, Default)]
pub struct CloseGuard {
    pending: AtomicBool,
}

impl CloseGuard {
    /// Create a released guard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a query is already outstanding
    ///
    /// The guard is released when the token is dropped.
    #[must_use]
    pub fn try_enter(&self) -> Option<CloseGuardToken<'_>> {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CloseGuardToken { guard: self })
    }

    /// Whether a query is outstanding
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Proof of an outstanding close query
#[derive(Debug)]
pub struct CloseGuardToken<'a> {
    guard: &'a CloseGuard,
}

impl Drop for CloseGuardToken<'_> {
    fn drop(&mut self) {
        self.guard.pending.store(false, Ordering::Release);
    }
}

/// Answer to a guarded close query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// The screen may close
    Allow,
    /// The screen refused
    Deny,
    /// Another query is still outstanding; ask again later
    Pending,
}

impl CloseDecision {
    /// Whether closing may proceed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Lifecycle errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// Closed screens cannot be activated again
    #[error("{screen} is closed and cannot be activated")]
    Closed {
        /// The closed screen
        screen: ScreenId,
    },

    /// Activation was requested while the screen was deactivating
    #[error("{screen} is deactivating")]
    Deactivating {
        /// The deactivating screen
        screen: ScreenId,
    },
}

/// State shared by every screen
pub struct ScreenCore {
    id: ScreenId,
    display_name: RwLock<String>,
    state: Mutex<ScreenState>,
    initialized: AtomicBool,
    close_guard: CloseGuard,
    views: Mutex<Vec<View>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl ScreenCore {
    /// Create the core of a new screen
    pub fn new(display_name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: ScreenId::new(),
            display_name: RwLock::new(display_name.into()),
            state: Mutex::new(ScreenState::Initial),
            initialized: AtomicBool::new(false),
            close_guard: CloseGuard::new(),
            views: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Screen ID
    #[must_use]
    pub fn id(&self) -> ScreenId {
        self.id
    }

    /// Display name
    #[must_use]
    pub fn display_name(&self) -> String {
        self.display_name.read().clone()
    }

    /// Change the display name
    pub fn set_display_name(&self, name: impl Into<String>) {
        *self.display_name.write() = name.into();
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ScreenState {
        *self.state.lock()
    }

    /// Whether the screen is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == ScreenState::Active
    }

    /// Whether the screen has been initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The guard used by [`ScreenExt::guarded_can_close`]
    #[must_use]
    pub fn close_guard(&self) -> &CloseGuard {
        &self.close_guard
    }

    /// Associate a view with this screen
    pub fn attach_view(&self, view: View) {
        self.views.lock().push(view);
    }

    /// Views currently attached
    #[must_use]
    pub fn views(&self) -> Vec<View> {
        self.views.lock().clone()
    }

    /// Receive lifecycle events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: LifecycleEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for ScreenCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenCore")
            .field("id", &self.id)
            .field("display_name", &*self.display_name.read())
            .field("state", &self.state())
            .field("views", &self.views.lock().len())
            .finish()
    }
}

/// A view model with an activation lifecycle
///
/// Implementors provide the [`ScreenCore`] and override the hooks they care
/// about. Transitions are driven through [`ScreenExt`].
#[async_trait]
pub trait Screen: Send + Sync {
    /// Shared lifecycle state
    fn core(&self) -> &ScreenCore;

    /// Called once, on the first activation
    async fn on_initialize(&self) {}

    /// Called on every activation
    async fn on_activate(&self) {}

    /// Called on deactivation
    async fn on_deactivate(&self, _close: bool) {}

    /// Whether the screen may close now
    async fn can_close(&self) -> bool {
        true
    }
}

/// Lifecycle transitions available on every [`Screen`]
#[async_trait]
pub trait ScreenExt: Screen {
    /// Activate the screen
    ///
    /// Returns `Ok(false)` if it was already active.
    ///
    /// # Errors
    ///
    /// Fails for closed screens and screens in the middle of deactivating.
    async fn activate(&self) -> Result<bool, LifecycleError>;

    /// Deactivate the screen, closing it if `close` is set
    ///
    /// Returns whether a transition happened.
    async fn deactivate(&self, close: bool) -> bool;

    /// Ask [`Screen::can_close`] under the close guard
    async fn guarded_can_close(&self) -> CloseDecision;

    /// Ask the toolkit to close this screen's views
    fn try_close(&self, context: &UiContext, dialog_result: Option<bool>);
}

#[async_trait]
impl<S> ScreenExt for S
where
    S: Screen + ?Sized,
{
    async fn activate(&self) -> Result<bool, LifecycleError> {
        let core = self.core();
        {
            let mut state = core.state.lock();
            match *state {
                ScreenState::Active => return Ok(false),
                ScreenState::Closed => return Err(LifecycleError::Closed { screen: core.id }),
                ScreenState::Deactivating => {
                    return Err(LifecycleError::Deactivating { screen: core.id })
                }
                ScreenState::Initial | ScreenState::Deactivated => {
                    *state = ScreenState::Active;
                }
            }
        }

        let was_initialized = !core.initialized.swap(true, Ordering::AcqRel);
        if was_initialized {
            self.on_initialize().await;
        }
        self.on_activate().await;

        tracing::debug!(screen = %core.id, was_initialized, "Screen activated");
        core.emit(LifecycleEvent::Activated { was_initialized });
        Ok(true)
    }

    async fn deactivate(&self, close: bool) -> bool {
        let core = self.core();
        let was_active = {
            let mut state = core.state.lock();
            match *state {
                ScreenState::Active => {
                    *state = ScreenState::Deactivating;
                    true
                }
                ScreenState::Initial | ScreenState::Deactivated if close => {
                    *state = ScreenState::Deactivating;
                    false
                }
                _ => return false,
            }
        };

        core.emit(LifecycleEvent::AttemptingDeactivation { closing: close });
        if was_active || core.is_initialized() {
            self.on_deactivate(close).await;
        }

        *core.state.lock() = if close {
            ScreenState::Closed
        } else {
            ScreenState::Deactivated
        };
        if close {
            core.views.lock().clear();
        }

        tracing::debug!(screen = %core.id, closed = close, "Screen deactivated");
        core.emit(LifecycleEvent::Deactivated { closed: close });
        true
    }

    async fn guarded_can_close(&self) -> CloseDecision {
        let core = self.core();
        if core.state().is_closed() {
            return CloseDecision::Allow;
        }

        let Some(_token) = core.close_guard.try_enter() else {
            tracing::debug!(screen = %core.id, "Close query already pending");
            return CloseDecision::Pending;
        };

        if self.can_close().await {
            CloseDecision::Allow
        } else {
            CloseDecision::Deny
        }
    }

    fn try_close(&self, context: &UiContext, dialog_result: Option<bool>) {
        let core = self.core();
        context.try_close(core.id, &core.views(), dialog_result);
    }
}
