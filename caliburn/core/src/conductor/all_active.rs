//! Collection conductor whose items are all active.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{contains, ensure_item, same, CloseStrategy, DefaultCloseStrategy};
use crate::screen::{LifecycleError, Screen, ScreenCore, ScreenExt};

/// Conducts a collection of items that are active together
pub struct AllActive<T>
where
    T: Screen + ?Sized + 'static,
{
    core: ScreenCore,
    items: Mutex<Vec<Arc<T>>>,
    strategy: Box<dyn CloseStrategy<T>>,
}

impl<T> AllActive<T>
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
            items: Mutex::new(Vec::new()),
            strategy,
        }
    }

    /// Conducted items, in order
    #[must_use]
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.lock().clone()
    }

    /// Add `item` and activate it if the conductor is active
    ///
    /// # Errors
    ///
    /// Fails if `item` is closed.
    pub async fn activate_item(&self, item: Arc<T>) -> Result<bool, LifecycleError> {
        ensure_item(&item)?;

        {
            let mut items = self.items.lock();
            if !contains(&items, &item) {
                items.push(Arc::clone(&item));
            }
        }

        if self.core.is_active() {
            item.activate().await?;
        }
        Ok(true)
    }

    /// Deactivate `item`, or close and remove it when `close` is set
    pub async fn deactivate_item(&self, item: &Arc<T>, close: bool) -> bool {
        if !close {
            return item.deactivate(false).await;
        }

        let result = self.strategy.execute(vec![Arc::clone(item)]).await;
        if !result.can_close {
            return false;
        }

        item.deactivate(true).await;
        self.items.lock().retain(|x| !same(x, item));
        tracing::debug!(
            conductor = %self.core.id(),
            item = %item.core().id(),
            "Item closed"
        );
        true
    }

    /// Close `item` through the close strategy
    pub async fn close_item(&self, item: &Arc<T>) -> bool {
        self.deactivate_item(item, true).await
    }
}

#[async_trait]
impl<T> Screen for AllActive<T>
where
    T: Screen + ?Sized + 'static,
{
    fn core(&self) -> &ScreenCore {
        &self.core
    }

    async fn on_activate(&self) {
        for item in self.items() {
            if let Err(e) = item.activate().await {
                tracing::warn!(conductor = %self.core.id(), error = %e, "Could not activate item");
            }
        }
    }

    async fn on_deactivate(&self, close: bool) {
        for item in self.items() {
            item.deactivate(close).await;
        }
        if close {
            self.items.lock().clear();
        }
    }

    async fn can_close(&self) -> bool {
        let result = self.strategy.execute(self.items()).await;
        if !result.can_close && !result.closable.is_empty() {
            for item in &result.closable {
                item.deactivate(true).await;
            }
            self.items
                .lock()
                .retain(|x| !contains(&result.closable, x));
        }
        result.can_close
    }
}

impl<T> fmt::Debug for AllActive<T>
where
    T: Screen + ?Sized + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllActive")
            .field("core", &self.core)
            .field("items", &self.items.lock().len())
            .finish()
    }
}
