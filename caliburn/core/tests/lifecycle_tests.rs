//! Screen and conductor lifecycle tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use caliburn_core::{
    CloseDecision, Conductor, LifecycleEvent, NullViewAdapter, OneActive, Screen, ScreenCore,
    ScreenExt, ScreenId, ScreenState, UiContext, UiThread, View, ViewAdapter, ViewHandler,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

struct Tab {
    core: ScreenCore,
    close_queries: AtomicUsize,
    gate: Option<Notify>,
}

impl Tab {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            core: ScreenCore::new(name),
            close_queries: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn gated(name: &str) -> Arc<Self> {
        Arc::new(Self {
            core: ScreenCore::new(name),
            close_queries: AtomicUsize::new(0),
            gate: Some(Notify::new()),
        })
    }
}

#[async_trait]
impl Screen for Tab {
    fn core(&self) -> &ScreenCore {
        &self.core
    }

    async fn can_close(&self) -> bool {
        self.close_queries.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        true
    }
}

#[tokio::test]
async fn test_nested_conductors_follow_parent_activation() {
    let shell = OneActive::<dyn Screen>::new("shell");
    let inner = Arc::new(Conductor::<Tab>::new("inner"));
    let document = Tab::new("document");

    inner.activate_item(Arc::clone(&document)).await.unwrap();
    let as_screen: Arc<dyn Screen> = inner.clone();
    shell.activate_item(as_screen).await.unwrap();

    // Nothing activates while the shell itself is inactive
    assert_eq!(inner.core().state(), ScreenState::Initial);
    assert_eq!(document.core().state(), ScreenState::Initial);

    shell.activate().await.unwrap();
    assert!(inner.core().is_active());
    assert!(document.core().is_active());

    shell.deactivate(false).await;
    assert_eq!(inner.core().state(), ScreenState::Deactivated);
    assert_eq!(document.core().state(), ScreenState::Deactivated);

    shell.deactivate(true).await;
    assert_eq!(inner.core().state(), ScreenState::Closed);
    assert_eq!(document.core().state(), ScreenState::Closed);
    assert!(shell.activate().await.is_err());
}

#[tokio::test]
async fn test_concurrent_close_query_on_conductor_is_pending() {
    let shell = OneActive::<Tab>::new("shell");
    shell.activate().await.unwrap();
    let tab = Tab::gated("slow");
    shell.activate_item(Arc::clone(&tab)).await.unwrap();

    let (first, second) = futures::join!(shell.guarded_can_close(), async {
        let decision = shell.guarded_can_close().await;
        if let Some(gate) = &tab.gate {
            gate.notify_one();
        }
        decision
    });

    assert_eq!(first, CloseDecision::Allow);
    assert_eq!(second, CloseDecision::Pending);
    assert_eq!(tab.close_queries.load(Ordering::SeqCst), 1);

    // Guard released: a new query runs again
    if let Some(gate) = &tab.gate {
        gate.notify_one();
    }
    assert_eq!(shell.guarded_can_close().await, CloseDecision::Allow);
    assert_eq!(tab.close_queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_lifecycle_events_reach_observers() {
    let shell = OneActive::<Tab>::new("shell");
    shell.activate().await.unwrap();
    let first = Tab::new("first");
    let second = Tab::new("second");
    let mut events = first.core().subscribe();

    shell.activate_item(Arc::clone(&first)).await.unwrap();
    shell.activate_item(Arc::clone(&second)).await.unwrap();
    shell.activate_item(Arc::clone(&first)).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            LifecycleEvent::Activated {
                was_initialized: true
            },
            LifecycleEvent::AttemptingDeactivation { closing: false },
            LifecycleEvent::Deactivated { closed: false },
            LifecycleEvent::Activated {
                was_initialized: false
            },
        ]
    );
}

#[test]
fn test_conductor_driven_from_ui_thread() {
    let context = UiContext::new();
    let ui = UiThread::start(&context, "lifecycle-ui", false, Arc::new(NullViewAdapter)).unwrap();
    let shell = Arc::new(OneActive::<Tab>::new("shell"));
    let tabs: Vec<Arc<Tab>> = (1..=3).map(|i| Tab::new(&format!("tab {i}"))).collect();

    let ui_shell = Arc::clone(&shell);
    let ui_tabs = tabs.clone();
    let ui_context = context.clone();
    context
        .spawn(async move {
            anyhow::ensure!(ui_context.check_access(), "not on the UI thread");
            ui_shell.activate().await?;
            for tab in &ui_tabs {
                ui_shell.activate_item(Arc::clone(tab)).await?;
            }
            ui_shell.close_item(&ui_tabs[2]).await?;
            Ok(())
        })
        .wait()
        .unwrap();

    assert_eq!(shell.items().len(), 2);
    assert!(tabs[1].core().is_active());
    assert_eq!(tabs[2].core().state(), ScreenState::Closed);
    ui.shutdown();
}

struct RecordingAdapter {
    closed: Mutex<Vec<(ScreenId, usize, Option<bool>)>>,
}

impl ViewAdapter for RecordingAdapter {
    fn first_non_generated_view(&self, view: View) -> View {
        view
    }

    fn execute_on_first_load(&self, view: View, handler: ViewHandler) {
        handler(view);
    }

    fn execute_on_layout_updated(&self, view: View, handler: ViewHandler) {
        handler(view);
    }

    fn try_close(&self, screen: ScreenId, views: &[View], dialog_result: Option<bool>) {
        self.closed.lock().push((screen, views.len(), dialog_result));
    }
}

#[test]
fn test_try_close_hands_views_to_adapter() {
    let adapter = Arc::new(RecordingAdapter {
        closed: Mutex::new(Vec::new()),
    });
    let context = UiContext::new();
    let ui = UiThread::start(&context, "adapter-ui", false, adapter.clone()).unwrap();

    let dialog = Tab::new("dialog");
    dialog.core().attach_view(Arc::new("dialog view"));
    dialog.try_close(&context, Some(false));

    assert_eq!(
        *adapter.closed.lock(),
        vec![(dialog.core().id(), 1, Some(false))]
    );
    ui.shutdown();
}
