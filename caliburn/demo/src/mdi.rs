//! Tabbed shell scenario.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caliburn_core::{
    EventAggregator, HandlerResult, LifecycleError, OneActive, Screen, ScreenCore, ScreenExt,
    ThreadOption,
};
use parking_lot::Mutex;
use tracing::info;

/// Simulated time the shell takes to decide whether it may close
const CLOSE_QUERY_DELAY: Duration = Duration::from_millis(250);

/// Published whenever the shell opens a tab
#[derive(Debug, Clone)]
pub struct TabOpened {
    pub name: String,
}

pub struct TabViewModel {
    core: ScreenCore,
}

impl TabViewModel {
    fn new(name: String) -> Arc<Self> {
        Arc::new(Self {
            core: ScreenCore::new(name),
        })
    }
}

#[async_trait]
impl Screen for TabViewModel {
    fn core(&self) -> &ScreenCore {
        &self.core
    }

    async fn on_activate(&self) {
        info!(tab = %self.core.display_name(), "Tab activated");
    }

    async fn on_deactivate(&self, close: bool) {
        info!(tab = %self.core.display_name(), close, "Tab deactivated");
    }
}

/// Tabbed shell
///
/// The shell is a screen whose lifecycle is the one of its tab collection.
pub struct ShellViewModel {
    tabs: OneActive<TabViewModel>,
    opened: AtomicUsize,
    events: Arc<EventAggregator>,
}

impl ShellViewModel {
    pub fn new(events: Arc<EventAggregator>) -> Self {
        Self {
            tabs: OneActive::new("Shell"),
            opened: AtomicUsize::new(0),
            events,
        }
    }

    pub async fn open_tab(&self) -> anyhow::Result<Arc<TabViewModel>> {
        let n = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        let tab = TabViewModel::new(format!("Tab {n}"));
        self.tabs.activate_item(Arc::clone(&tab)).await?;
        self.events.publish(TabOpened {
            name: tab.core().display_name(),
        })?;
        Ok(tab)
    }

    pub async fn close_tab(&self, tab: &Arc<TabViewModel>) -> Result<bool, LifecycleError> {
        self.tabs.close_item(tab).await
    }
}

#[async_trait]
impl Screen for ShellViewModel {
    fn core(&self) -> &ScreenCore {
        self.tabs.core()
    }

    async fn on_activate(&self) {
        self.tabs.on_activate().await;
    }

    async fn on_deactivate(&self, close: bool) {
        self.tabs.on_deactivate(close).await;
    }

    async fn can_close(&self) -> bool {
        tokio::time::sleep(CLOSE_QUERY_DELAY).await;
        self.tabs.can_close().await
    }
}

/// UI-side subscriber showing the last opened tab
#[derive(Default)]
struct StatusBar {
    opened: Mutex<Vec<String>>,
}

impl StatusBar {
    fn on_tab_opened(&self, message: &TabOpened) -> HandlerResult {
        self.opened.lock().push(message.name.clone());
        info!(tab = %message.name, "Status bar updated");
        Ok(())
    }
}

fn journal_tab_opened(message: &TabOpened) -> HandlerResult {
    info!(tab = %message.name, "Journal entry written");
    Ok(())
}

/// Run the scenario; must be driven on the UI thread
pub async fn run(
    events: Arc<EventAggregator>,
    tabs: usize,
    journal_thread: ThreadOption,
) -> HandlerResult {
    anyhow::ensure!(events.context().check_access(), "MDI scenario must run on the UI thread");

    let status = Arc::new(StatusBar::default());
    events.subscribe_weak(&status, StatusBar::on_tab_opened, ThreadOption::UiThread);
    events.subscribe(journal_tab_opened, journal_thread);

    let shell = Arc::new(ShellViewModel::new(Arc::clone(&events)));
    shell.activate().await?;

    for _ in 0..tabs {
        shell.open_tab().await?;
    }
    info!(
        tabs = shell.tabs.items().len(),
        status = ?status.opened.lock().last(),
        "Tabs opened"
    );

    if let Some(active) = shell.tabs.active_item() {
        shell.close_tab(&active).await?;
        info!(
            closed = %active.core().display_name(),
            active = ?shell.tabs.active_item().map(|t| t.core().display_name()),
            "Active tab closed"
        );
    }

    // The second request arrives while the first is still deciding
    let (first, second) = futures::join!(shell.guarded_can_close(), shell.guarded_can_close());
    info!(first = ?first, second = ?second, "Close requests answered");

    if first.is_allowed() {
        shell.deactivate(true).await;
        info!(state = %shell.core().state(), "Shell closed");
    }

    drop(status);
    events.compact();
    info!(registrations = events.len(), "Status bar gone");
    Ok(())
}
