//! Collection conductor with one active item.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    contains, determine_next, ensure_item, position, same, CloseStrategy, DefaultCloseStrategy,
};
use crate::screen::{LifecycleError, Screen, ScreenCore, ScreenExt};

struct State<T: ?Sized> {
    items: Vec<Arc<T>>,
    active: Option<Arc<T>>,
}

/// Conducts a collection of items, one of which is active
///
/// Switching deactivates the previous item without closing it. Closing the
/// active item activates its neighbour.
pub struct OneActive<T>
where
    T: Screen + ?Sized + 'static,
{
    core: ScreenCore,
    state: Mutex<State<T>>,
    strategy: Box<dyn CloseStrategy<T>>,
}

impl<T> OneActive<T>
where
    T: Screen + ?Sized + 'static,
{
    /// Create a conductor using [`DefaultCloseStrategy`]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self::with_close_strategy(display_name, Box::new(DefaultCloseStrategy))
    }

    /// Create a conductor with a custom close strategy
    pub fn with_close_strategy(
        display_name: impl Into<String>,
        strategy: Box<dyn CloseStrategy<T>>,
    ) -> Self {
        Self {
            core: ScreenCore::new(display_name),
            state: Mutex::new(State {
                items: Vec::new(),
                active: None,
            }),
            strategy,
        }
    }

    /// Conducted items, in order
    #[must_use]
    pub fn items(&self) -> Vec<Arc<T>> {
        self.state.lock().items.clone()
    }

    /// The active item
    #[must_use]
    pub fn active_item(&self) -> Option<Arc<T>> {
        self.state.lock().active.clone()
    }

    /// Activate `item`, adding it to the collection if needed
    ///
    /// # Errors
    ///
    /// Fails if `item` is closed.
    pub async fn activate_item(&self, item: Arc<T>) -> Result<bool, LifecycleError> {
        ensure_item(&item)?;

        if let Some(current) = self.active_item() {
            if same(&current, &item) {
                if self.core.is_active() {
                    item.activate().await?;
                }
                return Ok(true);
            }
        }

        self.change_active_item(Some(item), false).await?;
        Ok(true)
    }

    /// Deactivate `item`, or close it when `close` is set
    ///
    /// Closing asks the close strategy first and removes the item from the
    /// collection. Returns whether the item was deactivated.
    ///
    /// # Errors
    ///
    /// Fails if the neighbour chosen to replace a closed active item cannot
    /// be activated.
    pub async fn deactivate_item(&self, item: &Arc<T>, close: bool) -> Result<bool, LifecycleError> {
        if !close {
            return Ok(item.deactivate(false).await);
        }

        let result = self.strategy.execute(vec![Arc::clone(item)]).await;
        if !result.can_close {
            tracing::debug!(
                conductor = %self.core.id(),
                item = %item.core().id(),
                "Item refused to close"
            );
            return Ok(false);
        }

        self.close_item_core(item).await?;
        Ok(true)
    }

    /// Close `item` through the close strategy
    ///
    /// # Errors
    ///
    /// See [`deactivate_item`](Self::deactivate_item).
    pub async fn close_item(&self, item: &Arc<T>) -> Result<bool, LifecycleError> {
        self.deactivate_item(item, true).await
    }

    async fn close_item_core(&self, item: &Arc<T>) -> Result<(), LifecycleError> {
        let (is_active, next) = {
            let state = self.state.lock();
            let is_active = state.active.as_ref().is_some_and(|a| same(a, item));
            let next = if is_active {
                // Closed neighbours can never become active again
                let candidates: Vec<Arc<T>> = state
                    .items
                    .iter()
                    .filter(|x| same(x, item) || !x.core().state().is_closed())
                    .cloned()
                    .collect();
                position(&candidates, item).and_then(|i| determine_next(&candidates, i))
            } else {
                None
            };
            (is_active, next)
        };

        let outcome = if is_active {
            self.change_active_item(next, true).await
        } else {
            item.deactivate(true).await;
            Ok(())
        };

        self.state.lock().items.retain(|x| !same(x, item));
        tracing::debug!(
            conductor = %self.core.id(),
            item = %item.core().id(),
            "Item closed"
        );
        outcome
    }

    async fn change_active_item(
        &self,
        next: Option<Arc<T>>,
        close_previous: bool,
    ) -> Result<(), LifecycleError> {
        if let Some(previous) = self.active_item() {
            previous.deactivate(close_previous).await;
        }

        if let Some(next) = &next {
            {
                let mut state = self.state.lock();
                if !contains(&state.items, next) {
                    state.items.push(Arc::clone(next));
                }
            }
            if self.core.is_active() {
                if let Err(e) = next.activate().await {
                    self.state.lock().active = None;
                    return Err(e);
                }
            }
        }

        self.state.lock().active = next;
        Ok(())
    }

    /// Close the items that agreed to close while the conductor stays open
    async fn close_allowed(&self, items: Vec<Arc<T>>, mut closable: Vec<Arc<T>>) {
        if let Some(active) = self.active_item() {
            if contains(&closable, &active) {
                let mut remaining = items;
                let mut next = Some(Arc::clone(&active));
                while let Some(previous) = next.take() {
                    let Some(index) = position(&remaining, &previous) else {
                        break;
                    };
                    next = determine_next(&remaining, index);
                    remaining.remove(index);
                    match &next {
                        Some(candidate) if contains(&closable, candidate) => {}
                        _ => break,
                    }
                }

                if let Err(e) = self.change_active_item(next, true).await {
                    tracing::warn!(conductor = %self.core.id(), error = %e, "Could not activate neighbour");
                }
                self.state.lock().items.retain(|x| !same(x, &active));
                closable.retain(|x| !same(x, &active));
            }
        }

        for item in &closable {
            item.deactivate(true).await;
        }
        self.state
            .lock()
            .items
            .retain(|x| !contains(&closable, x));
    }
}

#[async_trait]
impl<T> Screen for OneActive<T>
where
    T: Screen + ?Sized + 'static,
{
    fn core(&self) -> &ScreenCore {
        &self.core
    }

    async fn on_activate(&self) {
        if let Some(item) = self.active_item() {
            if let Err(e) = item.activate().await {
                tracing::warn!(conductor = %self.core.id(), error = %e, "Could not activate item");
            }
        }
    }

    async fn on_deactivate(&self, close: bool) {
        if close {
            for item in self.items() {
                item.deactivate(true).await;
            }
            let mut state = self.state.lock();
            state.items.clear();
            state.active = None;
        } else if let Some(item) = self.active_item() {
            item.deactivate(false).await;
        }
    }

    async fn can_close(&self) -> bool {
        let items = self.items();
        let result = self.strategy.execute(items.clone()).await;
        if !result.can_close && !result.closable.is_empty() {
            self.close_allowed(items, result.closable).await;
        }
        result.can_close
    }
}

impl<T> fmt::Debug for OneActive<T>
where
    T: Screen + ?Sized + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OneActive")
            .field("core", &self.core)
            .field("items", &state.items.len())
            .field("active", &state.active.as_ref().map(|i| i.core().id()))
            .finish()
    }
}
