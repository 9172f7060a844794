//! Conductors - Screens That Own Screens
//!
//! A conductor is itself a [`Screen`] that activates, deactivates and closes
//! the items it conducts.
//!
//! - [`Conductor`]: exactly one item; switching closes the previous one
//! - [`OneActive`]: a collection with one active item (tabs, MDI)
//! - [`AllActive`]: a collection whose items are all active together
//!
//! # Invariants
//!
//! - An item is activated only while its conductor is active. Items
//!   activated on an inactive conductor are recorded and activated together
//!   with the conductor.
//! - Closing always goes through a [`CloseStrategy`], which asks every item
//!   through its close guard.
//! - Conductor state lives behind a `parking_lot::Mutex` that is released
//!   before any item hook is awaited.

mod all_active;
mod one_active;
mod single;

use std::sync::Arc;

use async_trait::async_trait;

pub use all_active::AllActive;
pub use one_active::OneActive;
pub use single::Conductor;

use crate::screen::{CloseDecision, LifecycleError, Screen, ScreenExt};

/// Outcome of a [`CloseStrategy`]
#[derive(Debug)]
pub struct CloseResult<T: ?Sized> {
    /// Whether every item agreed to close
    pub can_close: bool,
    /// Items that agreed to close
    pub closable: Vec<Arc<T>>,
}

/// Decides whether a set of items may close
#[async_trait]
pub trait CloseStrategy<T>: Send + Sync
where
    T: Screen + ?Sized,
{
    /// Query `items` and report which of them may close
    async fn execute(&self, items: Vec<Arc<T>>) -> CloseResult<T>;
}

/// Asks every item in order through [`ScreenExt::guarded_can_close`]
///
/// Only [`CloseDecision::Allow`] counts as closable; a pending query counts
/// as a refusal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCloseStrategy;

#[async_trait]
impl<T> CloseStrategy<T> for DefaultCloseStrategy
where
    T: Screen + ?Sized + 'static,
{
    async fn execute(&self, items: Vec<Arc<T>>) -> CloseResult<T> {
        let mut can_close = true;
        let mut closable = Vec::with_capacity(items.len());

        for item in items {
            match item.guarded_can_close().await {
                CloseDecision::Allow => closable.push(item),
                CloseDecision::Deny | CloseDecision::Pending => can_close = false,
            }
        }

        CloseResult {
            can_close,
            closable,
        }
    }
}

pub(crate) fn same<T: Screen + ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    a.core().id() == b.core().id()
}

pub(crate) fn position<T: Screen + ?Sized>(items: &[Arc<T>], item: &Arc<T>) -> Option<usize> {
    items.iter().position(|x| same(x, item))
}

pub(crate) fn contains<T: Screen + ?Sized>(items: &[Arc<T>], item: &Arc<T>) -> bool {
    position(items, item).is_some()
}

/// Reject items that can never be activated again
pub(crate) fn ensure_item<T: Screen + ?Sized>(item: &Arc<T>) -> Result<(), LifecycleError> {
    let core = item.core();
    if core.state().is_closed() {
        return Err(LifecycleError::Closed { screen: core.id() });
    }
    Ok(())
}

/// Item to activate after the one at `last_index` goes away
///
/// `items` still contains the departing item. Prefers the previous
/// neighbour, or the next one when the first item leaves.
pub(crate) fn determine_next<T: ?Sized>(items: &[Arc<T>], last_index: usize) -> Option<Arc<T>> {
    match last_index {
        0 if items.len() > 1 => items.get(1).cloned(),
        0 => None,
        i => items.get(i - 1).cloned(),
    }
}
