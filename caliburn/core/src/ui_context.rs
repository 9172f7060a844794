//! UI Context - Affinity to "the" UI Thread
//!
//! A [`UiContext`] remembers which thread is the UI thread, how to post work
//! to it, whether we run inside a design tool, and which [`ViewAdapter`]
//! talks to the toolkit's view objects.
//!
//! # Lifecycle
//!
//! ```text
//!   UiContext::new()          initialize(...) on the UI thread
//!  ┌──────────────────┐      ┌──────────────────────────────────┐
//!  │ no UI thread     │─────▶│ UI thread captured               │
//!  │ check_access: ✓  │      │ check_access: caller == UI thread│
//!  │ design-time: yes │      │ scheduler: dispatcher            │
//!  │ scheduler: pool  │      │ adapter: host-provided           │
//!  └──────────────────┘      └──────────────────────────────────┘
//! ```
//!
//! The context is a cheap, cloneable handle. Components receive it at
//! construction instead of reaching for ambient global state, so tests can
//! build isolated contexts.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

use crate::dispatcher::{Scheduler, ThreadPool};
use crate::operation::{self, FaultSink, HandlerResult, Operation, TracingFaultSink};
use crate::screen::ScreenId;

/// Opaque toolkit view object
pub type View = Arc<dyn Any + Send + Sync>;

/// Callback invoked with a view
pub type ViewHandler = Box<dyn FnOnce(View) + Send + 'static>;

/// Toolkit-specific view operations
///
/// Hosts implement this for their UI toolkit; the framework only calls it.
pub trait ViewAdapter: Send + Sync {
    /// The root view that was not created by the framework
    fn first_non_generated_view(&self, view: View) -> View;

    /// Run `handler` the first time `view` is loaded
    fn execute_on_first_load(&self, view: View, handler: ViewHandler);

    /// Run `handler` the next time `view` finishes a layout pass
    fn execute_on_layout_updated(&self, view: View, handler: ViewHandler);

    /// Close the views belonging to `screen`
    fn try_close(&self, screen: ScreenId, views: &[View], dialog_result: Option<bool>);
}

/// Adapter used when no toolkit is attached
///
/// Views are their own root, handlers run immediately, close requests are
/// ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullViewAdapter;

impl ViewAdapter for NullViewAdapter {
    fn first_non_generated_view(&self, view: View) -> View {
        view
    }

    fn execute_on_first_load(&self, view: View, handler: ViewHandler) {
        handler(view);
    }

    fn execute_on_layout_updated(&self, view: View, handler: ViewHandler) {
        handler(view);
    }

    fn try_close(&self, screen: ScreenId, _views: &[View], _dialog_result: Option<bool>) {
        tracing::debug!(screen = %screen, "No view adapter attached, ignoring close request");
    }
}

struct Affinity {
    ui_thread: Option<ThreadId>,
    scheduler: Option<Arc<dyn Scheduler>>,
    is_design_tool: bool,
    view_adapter: Arc<dyn ViewAdapter>,
}

struct Inner {
    affinity: RwLock<Affinity>,
    fallback: Arc<dyn Scheduler>,
    fault_sink: Arc<dyn FaultSink>,
}

/// Shared handle to the UI thread
#[derive(Clone)]
pub struct UiContext {
    inner: Arc<Inner>,
}

impl Default for UiContext {
    fn default() -> Self {
        Self::new()
    }
}

impl UiContext {
    /// Create an uninitialized context that logs unobserved faults
    #[must_use]
    pub fn new() -> Self {
        Self::with_fault_sink(Arc::new(TracingFaultSink))
    }

    /// Create an uninitialized context with a custom fault sink
    #[must_use]
    pub fn with_fault_sink(fault_sink: Arc<dyn FaultSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                affinity: RwLock::new(Affinity {
                    ui_thread: None,
                    scheduler: None,
                    is_design_tool: true,
                    view_adapter: Arc::new(NullViewAdapter),
                }),
                fallback: Arc::new(ThreadPool::ambient()),
                fault_sink,
            }),
        }
    }

    /// Capture the calling thread as the UI thread
    ///
    /// Call once, from the UI thread, before anything relies on thread
    /// affinity. `scheduler` must run work on this same thread.
    pub fn initialize(
        &self,
        is_design_tool: bool,
        view_adapter: Arc<dyn ViewAdapter>,
        scheduler: Arc<dyn Scheduler>,
    ) {
        let current = thread::current();
        let mut affinity = self.inner.affinity.write();

        if let Some(previous) = affinity.ui_thread {
            tracing::warn!(
                previous = ?previous,
                current = ?current.id(),
                "UI context re-initialized"
            );
        }

        affinity.ui_thread = Some(current.id());
        affinity.scheduler = Some(scheduler);
        affinity.is_design_tool = is_design_tool;
        affinity.view_adapter = view_adapter;

        tracing::info!(
            thread = current.name().unwrap_or("<unnamed>"),
            is_design_tool,
            "UI context initialized"
        );
    }

    /// Whether [`initialize`](Self::initialize) has been called
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.affinity.read().ui_thread.is_some()
    }

    /// Whether the framework runs inside a designer
    #[must_use]
    pub fn is_in_design_tool(&self) -> bool {
        self.inner.affinity.read().is_design_tool
    }

    /// Whether the calling thread may touch UI state
    ///
    /// Always true before initialization.
    #[must_use]
    pub fn check_access(&self) -> bool {
        match self.inner.affinity.read().ui_thread {
            Some(ui_thread) => ui_thread == thread::current().id(),
            None => true,
        }
    }

    /// The UI scheduler, or the background pool before initialization
    #[must_use]
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.inner
            .affinity
            .read()
            .scheduler
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.inner.fallback))
    }

    /// Where unobserved faults go
    #[must_use]
    pub fn fault_sink(&self) -> Arc<dyn FaultSink> {
        Arc::clone(&self.inner.fault_sink)
    }

    /// Run `action` on the UI thread
    ///
    /// The action is always posted, even when called from the UI thread.
    /// Its failure is only visible through the returned [`Operation`].
    pub fn run<F>(&self, action: F) -> Operation
    where
        F: FnOnce() -> HandlerResult + Send + 'static,
    {
        operation::run_on(self.scheduler().as_ref(), self.fault_sink(), action)
    }

    /// Drive `future` on the UI thread
    pub fn spawn<Fut>(&self, future: Fut) -> Operation
    where
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        operation::spawn_on(self.scheduler().as_ref(), self.fault_sink(), future)
    }

    fn view_adapter(&self) -> Arc<dyn ViewAdapter> {
        Arc::clone(&self.inner.affinity.read().view_adapter)
    }

    /// The root view that was not created by the framework
    #[must_use]
    pub fn first_non_generated_view(&self, view: View) -> View {
        self.view_adapter().first_non_generated_view(view)
    }

    /// Run `handler` the first time `view` is loaded
    pub fn execute_on_first_load(&self, view: View, handler: ViewHandler) {
        self.view_adapter().execute_on_first_load(view, handler);
    }

    /// Run `handler` the next time `view` finishes a layout pass
    pub fn execute_on_layout_updated(&self, view: View, handler: ViewHandler) {
        self.view_adapter().execute_on_layout_updated(view, handler);
    }

    /// Ask the toolkit to close the views of `screen`
    pub fn try_close(&self, screen: ScreenId, views: &[View], dialog_result: Option<bool>) {
        self.view_adapter().try_close(screen, views, dialog_result);
    }
}

impl fmt::Debug for UiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let affinity = self.inner.affinity.read();
        f.debug_struct("UiContext")
            .field("ui_thread", &affinity.ui_thread)
            .field("is_design_tool", &affinity.is_design_tool)
            .field("scheduler", &affinity.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::UiThread;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_check_access_before_initialize() {
        let context = UiContext::new();
        assert!(!context.is_initialized());
        assert!(context.is_in_design_tool());
        assert!(context.check_access());

        let remote = context.clone();
        let from_other_thread = thread::spawn(move || remote.check_access()).join().unwrap();
        assert!(from_other_thread);
    }

    #[test]
    fn test_check_access_after_initialize() {
        let context = UiContext::new();
        let ui_context = context.clone();

        let on_ui_thread = thread::spawn(move || {
            ui_context.initialize(false, Arc::new(NullViewAdapter), Arc::new(ThreadPool::ambient()));
            ui_context.check_access()
        })
        .join()
        .unwrap();

        assert!(on_ui_thread);
        assert!(!context.check_access());
        assert!(context.is_initialized());
        assert!(!context.is_in_design_tool());
    }

    #[test]
    fn test_run_executes_on_ui_thread() {
        let context = UiContext::new();
        let ui = UiThread::start(&context, "run-test", false, Arc::new(NullViewAdapter)).unwrap();
        let ui_id = ui.thread_id().unwrap();
        let observed = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&observed);
        let ui_context = context.clone();
        context
            .run(move || {
                *slot.lock() = Some((thread::current().id(), ui_context.check_access()));
                Ok(())
            })
            .wait()
            .unwrap();

        assert_eq!(*observed.lock(), Some((ui_id, true)));
        ui.shutdown();
    }

    #[test]
    fn test_run_failure_only_through_operation() {
        let context = UiContext::new();
        let ui = UiThread::start(&context, "fail-test", false, Arc::new(NullViewAdapter)).unwrap();

        let operation = context.run(|| Err(anyhow::anyhow!("Error on the UI thread")));
        let fault = operation.wait().unwrap_err();
        assert_eq!(fault.to_string(), "Error on the UI thread");
        ui.shutdown();
    }

    #[test]
    fn test_spawn_resumes_on_ui_thread() {
        let context = UiContext::new();
        let ui = UiThread::start(&context, "spawn-test", false, Arc::new(NullViewAdapter)).unwrap();
        let ui_context = context.clone();

        let result = context
            .spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                anyhow::ensure!(ui_context.check_access(), "resumed off the UI thread");
                Err(anyhow::anyhow!("Error on async execute"))
            })
            .wait();

        assert_eq!(result.unwrap_err().to_string(), "Error on async execute");
        ui.shutdown();
    }

    struct RecordingAdapter {
        closed: Mutex<Vec<(ScreenId, usize, Option<bool>)>>,
    }

    impl ViewAdapter for RecordingAdapter {
        fn first_non_generated_view(&self, view: View) -> View {
            view
        }

        fn execute_on_first_load(&self, _view: View, _handler: ViewHandler) {}

        fn execute_on_layout_updated(&self, _view: View, _handler: ViewHandler) {}

        fn try_close(&self, screen: ScreenId, views: &[View], dialog_result: Option<bool>) {
            self.closed.lock().push((screen, views.len(), dialog_result));
        }
    }

    #[test]
    fn test_null_adapter_runs_handlers_immediately() {
        let context = UiContext::new();
        let ran = Arc::new(AtomicBool::new(false));
        let view: View = Arc::new("root");

        let flag = Arc::clone(&ran);
        context.execute_on_first_load(
            Arc::clone(&view),
            Box::new(move |_| flag.store(true, Ordering::SeqCst)),
        );

        assert!(ran.load(Ordering::SeqCst));
        assert!(Arc::ptr_eq(&context.first_non_generated_view(Arc::clone(&view)), &view));
    }

    #[test]
    fn test_try_close_goes_through_adapter() {
        let context = UiContext::new();
        let adapter = Arc::new(RecordingAdapter {
            closed: Mutex::new(Vec::new()),
        });
        context.initialize(true, adapter.clone(), Arc::new(ThreadPool::ambient()));

        let screen = ScreenId::new();
        let views: Vec<View> = vec![Arc::new(1_u32), Arc::new(2_u32)];
        context.try_close(screen, &views, Some(true));

        assert_eq!(*adapter.closed.lock(), vec![(screen, 2, Some(true))]);
    }
}
