//! Operations and Fault Observation
//!
//! Marshaled work never reports failure on the thread that scheduled it.
//! Instead every piece of scheduled work returns an [`Operation`]:
//!
//! - `.await` it (or [`Operation::wait`] from a plain thread) to observe the
//!   outcome yourself
//! - [`Operation::observe`] it, or simply drop it, and a failure is handed
//!   to the [`FaultSink`] instead
//!
//! A fault is delivered exactly once: either to whoever observes the
//! operation or to the sink. It is never re-raised on an unrelated thread.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::dispatcher::Scheduler;

/// Result returned by message handlers and scheduled actions
pub type HandlerResult = anyhow::Result<()>;

/// Failure of a scheduled operation
#[derive(Debug, Error)]
pub enum Fault {
    /// The work returned an error
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The work panicked
    #[error("scheduled work panicked: {0}")]
    Panicked(String),

    /// The scheduler dropped the work before it ran
    #[error("scheduled work was abandoned before it ran")]
    Abandoned,

    /// [`Operation::wait`] was called from inside an async runtime
    ///
    /// The work still runs; its fault goes to the fault sink.
    #[error("cannot block on an operation from inside an async runtime")]
    WaitInRuntime,
}

impl Fault {
    /// Whether the work actually ran and failed (as opposed to never running)
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }
}

/// Receiver of faults nobody observed
pub trait FaultSink: Send + Sync {
    /// Handle an unobserved fault
    fn report(&self, fault: Fault);
}

impl<F> FaultSink for F
where
    F: Fn(Fault) + Send + Sync,
{
    fn report(&self, fault: Fault) {
        self(fault);
    }
}

/// Default sink: logs unobserved faults and moves on
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingFaultSink;

impl FaultSink for TracingFaultSink {
    fn report(&self, fault: Fault) {
        tracing::error!(fault = %fault, "Unobserved fault in scheduled operation");
    }
}

/// Handle to scheduled work
///
/// Resolves to `Ok(())` when the work succeeded. Dropping the handle
/// without awaiting it routes any fault to the fault sink.
#[must_use = "dropping an operation sends its fault to the fault sink; call `observe()` to make that explicit"]
pub struct Operation {
    rx: Option<oneshot::Receiver<Result<(), Fault>>>,
    sink: Arc<dyn FaultSink>,
}

impl Operation {
    /// Detach from the operation; a fault goes to the fault sink
    pub fn observe(self) {
        drop(self);
    }

    /// Block the current thread until the work finishes
    ///
    /// From within an async runtime (including a UI dispatcher job) this
    /// would deadlock or panic, so it returns [`Fault::WaitInRuntime`] at
    /// once and the operation is treated as unobserved. `.await` it there
    /// instead.
    pub fn wait(mut self) -> Result<(), Fault> {
        if Handle::try_current().is_ok() {
            tracing::warn!("Operation::wait called inside an async runtime, use .await");
            // Dropping self routes the eventual fault to the sink
            return Err(Fault::WaitInRuntime);
        }

        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or(Err(Fault::Abandoned)),
            None => Err(Fault::Abandoned),
        }
    }
}

impl Future for Operation {
    type Output = Result<(), Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(Err(Fault::Abandoned));
        };

        match Pin::new(rx).poll(cx) {
            Poll::Ready(outcome) => {
                this.rx = None;
                Poll::Ready(outcome.unwrap_or(Err(Fault::Abandoned)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        let Some(mut rx) = self.rx.take() else {
            return;
        };

        // After close() a late send fails and the sender reports to the sink
        rx.close();
        if let Ok(Err(fault)) = rx.try_recv() {
            self.sink.report(fault);
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("observed", &self.rx.is_none())
            .finish()
    }
}

/// Schedule `work` on `scheduler`
///
/// Errors and panics raised by `work` are captured on the returned
/// [`Operation`].
pub fn run_on<F>(scheduler: &dyn Scheduler, sink: Arc<dyn FaultSink>, work: F) -> Operation
where
    F: FnOnce() -> HandlerResult + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job_sink = Arc::clone(&sink);

    scheduler.schedule(Box::new(move || {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(result) => result.map_err(Fault::Failed),
            Err(payload) => Err(Fault::Panicked(panic_message(payload.as_ref()))),
        };
        complete(tx, outcome, job_sink.as_ref());
    }));

    Operation { rx: Some(rx), sink }
}

/// Drive `future` on `scheduler`
///
/// Errors and panics raised by `future` are captured on the returned
/// [`Operation`].
pub fn spawn_on<Fut>(scheduler: &dyn Scheduler, sink: Arc<dyn FaultSink>, future: Fut) -> Operation
where
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job_sink = Arc::clone(&sink);

    scheduler.spawn(Box::pin(async move {
        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result.map_err(Fault::Failed),
            Err(payload) => Err(Fault::Panicked(panic_message(payload.as_ref()))),
        };
        complete(tx, outcome, job_sink.as_ref());
    }));

    Operation { rx: Some(rx), sink }
}

fn complete(
    tx: oneshot::Sender<Result<(), Fault>>,
    outcome: Result<(), Fault>,
    sink: &dyn FaultSink,
) {
    if let Err(Err(fault)) = tx.send(outcome) {
        sink.report(fault);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
