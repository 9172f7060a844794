//! Single-item conductor.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ensure_item, same, CloseStrategy, DefaultCloseStrategy};
use crate::screen::{LifecycleError, Screen, ScreenCore, ScreenExt};

/// Conducts one item at a time
///
/// Activating a new item closes the previous one, provided the close
/// strategy allows it.
pub struct Conductor<T>
where
    T: Screen + ?Sized + 'static,
{
    core: ScreenCore,
    active: Mutex<Option<Arc<T>>>,
    strategy: Box<dyn CloseStrategy<T>>,
}

impl<T> Conductor<T>
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
            active: Mutex::new(None),
            strategy,
        }
    }

    /// The conducted item
    #[must_use]
    pub fn active_item(&self) -> Option<Arc<T>> {
        self.active.lock().clone()
    }

    /// Make `item` the conducted item
    ///
    /// Returns `Ok(false)` when the current item refused to close.
    ///
    /// # Errors
    ///
    /// Fails if `item` is closed.
    pub async fn activate_item(&self, item: Arc<T>) -> Result<bool, LifecycleError> {
        ensure_item(&item)?;

        let current = self.active_item();
        if let Some(current) = &current {
            if same(current, &item) {
                if self.core.is_active() {
                    item.activate().await?;
                }
                return Ok(true);
            }

            let result = self.strategy.execute(vec![Arc::clone(current)]).await;
            if !result.can_close {
                tracing::debug!(
                    conductor = %self.core.id(),
                    item = %current.core().id(),
                    "Active item refused to close"
                );
                return Ok(false);
            }
            current.deactivate(true).await;
        }

        if self.core.is_active() {
            item.activate().await?;
        }

        tracing::debug!(
            conductor = %self.core.id(),
            item = %item.core().id(),
            "Active item changed"
        );
        *self.active.lock() = Some(item);
        Ok(true)
    }

    /// Deactivate the conducted item, closing it if `close` is set
    ///
    /// Does nothing unless `item` is the conducted item. Returns whether the
    /// item was deactivated.
    pub async fn deactivate_item(&self, item: &Arc<T>, close: bool) -> bool {
        let Some(current) = self.active_item() else {
            return false;
        };
        if !same(&current, item) {
            return false;
        }

        if !close {
            return current.deactivate(false).await;
        }

        let result = self.strategy.execute(vec![Arc::clone(&current)]).await;
        if !result.can_close {
            return false;
        }

        current.deactivate(true).await;
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| same(a, &current)) {
            *active = None;
        }
        true
    }

    /// Close the conducted item
    pub async fn close_item(&self, item: &Arc<T>) -> bool {
        self.deactivate_item(item, true).await
    }
}

#[async_trait]
impl<T> Screen for Conductor<T>
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
        if let Some(item) = self.active_item() {
            item.deactivate(close).await;
        }
    }

    async fn can_close(&self) -> bool {
        let items: Vec<Arc<T>> = self.active_item().into_iter().collect();
        self.strategy.execute(items).await.can_close
    }
}

impl<T> fmt::Debug for Conductor<T>
where
    T: Screen + ?Sized + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conductor")
            .field("core", &self.core)
            .field("active", &self.active.lock().as_ref().map(|i| i.core().id()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Item;
    use super::*;
    use crate::screen::ScreenState;

    #[tokio::test]
    async fn test_switch_closes_previous_item() {
        let conductor = Conductor::<Item>::new("shell");
        conductor.activate().await.unwrap();

        let first = Arc::new(Item::new("first"));
        let second = Arc::new(Item::new("second"));

        assert!(conductor.activate_item(Arc::clone(&first)).await.unwrap());
        assert!(first.core().is_active());

        assert!(conductor.activate_item(Arc::clone(&second)).await.unwrap());
        assert_eq!(first.core().state(), ScreenState::Closed);
        assert!(second.core().is_active());
        assert!(same(&conductor.active_item().unwrap(), &second));
    }

    #[tokio::test]
    async fn test_refusing_item_blocks_switch() {
        let conductor = Conductor::<Item>::new("shell");
        conductor.activate().await.unwrap();

        let stubborn = Arc::new(Item::refusing("stubborn"));
        let other = Arc::new(Item::new("other"));

        conductor.activate_item(Arc::clone(&stubborn)).await.unwrap();
        assert!(!conductor.activate_item(Arc::clone(&other)).await.unwrap());

        assert!(stubborn.core().is_active());
        assert_eq!(other.core().state(), ScreenState::Initial);
    }

    #[tokio::test]
    async fn test_item_waits_for_conductor_activation() {
        let conductor = Conductor::<Item>::new("shell");
        let item = Arc::new(Item::new("item"));

        conductor.activate_item(Arc::clone(&item)).await.unwrap();
        assert_eq!(item.activations(), 0);

        conductor.activate().await.unwrap();
        assert_eq!(item.activations(), 1);

        conductor.deactivate(false).await;
        assert_eq!(item.core().state(), ScreenState::Deactivated);
    }

    #[tokio::test]
    async fn test_close_item_clears_active() {
        let conductor = Conductor::<Item>::new("shell");
        conductor.activate().await.unwrap();
        let item = Arc::new(Item::new("item"));
        conductor.activate_item(Arc::clone(&item)).await.unwrap();

        assert!(conductor.close_item(&item).await);
        assert!(conductor.active_item().is_none());
        assert_eq!(item.core().state(), ScreenState::Closed);
    }
}
