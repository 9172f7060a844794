//! Dispatcher - Where Marshaled Work Runs
//!
//! Everything the framework marshals ends up on a [`Scheduler`]:
//!
//! - [`DispatcherScheduler`] posts work to the UI thread, which runs a
//!   [`Dispatcher`] loop
//! - [`ThreadPool`] runs background work on a tokio runtime (or on plain OS
//!   threads when no runtime is around)
//!
//! # Architecture
//!
//! ```text
//!   any thread                         UI thread
//!  ┌────────────────────┐   Command   ┌───────────────────────────────┐
//!  │ DispatcherScheduler├────────────▶│ Dispatcher::run               │
//!  │   schedule(job)    │  (unbounded │  current-thread runtime       │
//!  │   spawn(future)    │    mpsc)    │  + LocalSet                   │
//!  └────────────────────┘             │  jobs run in posting order    │
//!                                     │  futures resume on UI thread  │
//!                                     └───────────────────────────────┘
//! ```
//!
//! Futures spawned on the dispatcher are polled by the UI thread only, so an
//! `.await` inside UI-affine work resumes on the UI thread.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use futures::future::BoxFuture;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

use crate::operation::panic_message;
use crate::ui_context::{UiContext, ViewAdapter};

/// A unit of work posted to a scheduler
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run jobs and drive futures
///
/// Implementations must never run a job on the calling thread while the
/// caller still holds framework locks; the crate never calls `schedule`
/// with a lock held.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Run `job` at some later point
    fn schedule(&self, job: Job);

    /// Drive `future` to completion
    fn spawn(&self, future: BoxFuture<'static, ()>);
}

enum Command {
    Call(Job),
    Spawn(BoxFuture<'static, ()>),
    Shutdown,
}

/// Create a connected scheduler / dispatcher pair
///
/// The [`Dispatcher`] must be run on the thread that should own the work
/// (normally the UI thread).
#[must_use]
pub fn channel() -> (DispatcherScheduler, Dispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatcherScheduler { tx }, Dispatcher { rx })
}

/// Posting side of a dispatcher loop
#[derive(Clone)]
pub struct DispatcherScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl DispatcherScheduler {
    /// Ask the dispatcher loop to stop after the work already posted
    pub fn shutdown(&self) {
        // A closed loop is already stopped
        let _ = self.tx.send(Command::Shutdown);
    }

    /// Check whether the dispatcher loop is still accepting work
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl Scheduler for DispatcherScheduler {
    fn schedule(&self, job: Job) {
        if self.tx.send(Command::Call(job)).is_err() {
            tracing::debug!("Dispatcher stopped, dropping job");
        }
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        if self.tx.send(Command::Spawn(future)).is_err() {
            tracing::debug!("Dispatcher stopped, dropping future");
        }
    }
}

impl fmt::Debug for DispatcherScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Receiving side of a dispatcher loop
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl Dispatcher {
    /// Run the loop on the calling thread until shutdown
    ///
    /// Returns once [`DispatcherScheduler::shutdown`] is processed or every
    /// scheduler has been dropped. Futures still pending at that point are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread-local runtime cannot be built.
    pub fn run(mut self) -> io::Result<()> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let local = LocalSet::new();

        local.block_on(&runtime, async move {
            while let Some(command) = self.rx.recv().await {
                match command {
                    Command::Call(job) => {
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            tracing::error!(
                                panic = %panic_message(payload.as_ref()),
                                "Dispatcher job panicked"
                            );
                        }
                    }
                    Command::Spawn(future) => {
                        tokio::task::spawn_local(future);
                    }
                    Command::Shutdown => break,
                }
            }
        });

        tracing::debug!("Dispatcher loop finished");
        Ok(())
    }
}

/// A dedicated UI thread running a [`Dispatcher`]
///
/// Starting it initializes the given [`UiContext`] from the new thread, so
/// the context's affinity checks and [`UiContext::run`] target this thread.
pub struct UiThread {
    scheduler: DispatcherScheduler,
    handle: Option<JoinHandle<()>>,
}

impl UiThread {
    /// Spawn the thread, initialize `context` on it, and start dispatching
    ///
    /// Returns once the context has been initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned or exits before it
    /// finished initializing the context.
    pub fn start(
        context: &UiContext,
        name: &str,
        is_design_tool: bool,
        view_adapter: Arc<dyn ViewAdapter>,
    ) -> io::Result<Self> {
        let (scheduler, dispatcher) = channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread_context = context.clone();
        let thread_scheduler = scheduler.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                thread_context.initialize(is_design_tool, view_adapter, Arc::new(thread_scheduler));
                let _ = ready_tx.send(());
                if let Err(e) = dispatcher.run() {
                    tracing::error!(error = %e, "UI dispatcher failed to start");
                }
            })?;

        ready_rx.recv().map_err(|_| {
            io::Error::new(
                io::ErrorKind::Other,
                "UI thread exited before initializing the context",
            )
        })?;

        tracing::info!(thread = name, "UI thread started");

        Ok(Self {
            scheduler,
            handle: Some(handle),
        })
    }

    /// The scheduler that posts to this thread
    #[must_use]
    pub fn scheduler(&self) -> &DispatcherScheduler {
        &self.scheduler
    }

    /// Identity of the UI thread
    #[must_use]
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }

    /// Stop the dispatcher and wait for the thread to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.scheduler.shutdown();
        let Some(handle) = self.handle.take() else {
            return;
        };

        // Joining ourselves would never return
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("UI thread panicked");
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for UiThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiThread")
            .field("thread_id", &self.thread_id())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Runtime owned by a [`ThreadPool`]
///
/// `shutdown_background` never blocks, so the pool can be dropped from
/// inside another runtime.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Background scheduler
///
/// Blocking jobs go to the runtime's blocking pool, futures to its workers.
#[derive(Clone)]
pub struct ThreadPool {
    handle: Option<Handle>,
    runtime: Option<Arc<OwnedRuntime>>,
}

impl ThreadPool {
    /// Build a pool with its own multi-thread runtime
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn new(worker_threads: usize) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("caliburn-worker")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: Some(runtime.handle().clone()),
            runtime: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        })
    }

    /// Use a handle to an existing runtime
    #[must_use]
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            runtime: None,
        }
    }

    /// Use whatever multi-thread runtime is current at scheduling time
    ///
    /// A current-thread runtime (such as the UI dispatcher's) is never
    /// borrowed: its thread would end up driving the background work.
    /// Without a usable runtime every job gets its own OS thread.
    #[must_use]
    pub fn ambient() -> Self {
        Self {
            handle: None,
            runtime: None,
        }
    }

    fn resolve(&self) -> Option<Handle> {
        if let Some(handle) = &self.handle {
            return Some(handle.clone());
        }
        Handle::try_current()
            .ok()
            .filter(|handle| handle.runtime_flavor() != RuntimeFlavor::CurrentThread)
    }
}

impl Scheduler for ThreadPool {
    fn schedule(&self, job: Job) {
        match self.resolve() {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => {
                if let Err(e) = thread::Builder::new()
                    .name("caliburn-background".to_string())
                    .spawn(job)
                {
                    tracing::error!(error = %e, "Failed to spawn background thread");
                }
            }
        }
    }

    fn spawn(&self, future: BoxFuture<'static, ()>) {
        match self.resolve() {
            Some(handle) => {
                handle.spawn(future);
            }
            None => {
                if let Err(e) = thread::Builder::new()
                    .name("caliburn-background".to_string())
                    .spawn(move || run_detached(future))
                {
                    tracing::error!(error = %e, "Failed to spawn background thread");
                }
            }
        }
    }
}

/// Drive a future on a private runtime so tokio timers and I/O work
fn run_detached(future: BoxFuture<'static, ()>) {
    match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(future),
        Err(e) => tracing::error!(error = %e, "Failed to build background runtime"),
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("owns_runtime", &self.runtime.is_some())
            .field("ambient", &self.handle.is_none())
            .finish()
    }
}
