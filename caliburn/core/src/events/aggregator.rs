//! The event aggregator.
//!
//! # Dispatch
//!
//! ```text
//!   publish(message)
//!        │
//!        ├─ lock: drop dead registrations, select matching ones, unlock
//!        │
//!        ├─ on UI thread ──▶ PublisherThread + UiThread handlers, inline
//!        ├─ elsewhere ─────▶ PublisherThread handlers, inline
//!        │                   UiThread handlers, one batch posted to the UI
//!        │
//!        └─ always ────────▶ BackgroundThread handlers, one batch on the pool
//! ```
//!
//! The registration lock is never held while a handler runs.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::registration::{Envelope, Outcome, Registration, Target};
use super::{PublishError, Subscription, ThreadOption};
use crate::dispatcher::{Scheduler, ThreadPool};
use crate::operation::{self, FaultSink, HandlerResult};
use crate::ui_context::UiContext;

/// Enables loosely-coupled publication of and subscription to messages
///
/// # Stateless handlers
///
/// Handlers without a target are plain function pointers, so a closure
/// that captures state does not compile:
///
/// ```compile_fail
/// use caliburn_core::{EventAggregator, ThreadOption, UiContext};
///
/// let aggregator = EventAggregator::new(UiContext::new());
/// let prefix = String::from("got ");
/// aggregator.subscribe(
///     move |message: &String| {
///         println!("{prefix}{message}");
///         Ok(())
///     },
///     ThreadOption::PublisherThread,
/// );
/// ```
///
/// State goes into an explicit target instead:
///
/// ```
/// use std::sync::Arc;
/// use caliburn_core::{EventAggregator, HandlerResult, ThreadOption, UiContext};
///
/// struct Log {
///     prefix: String,
/// }
///
/// fn on_message(log: &Log, message: &String) -> HandlerResult {
///     println!("{}{message}", log.prefix);
///     Ok(())
/// }
///
/// let aggregator = EventAggregator::new(UiContext::new());
/// let log = Arc::new(Log { prefix: "got ".into() });
/// aggregator.subscribe_weak(&log, on_message, ThreadOption::PublisherThread);
/// aggregator.publish(String::from("hello")).unwrap();
/// ```
pub struct EventAggregator {
    context: UiContext,
    background: Arc<dyn Scheduler>,
    handlers: Mutex<Vec<Arc<Registration>>>,
}

impl EventAggregator {
    /// Create an aggregator using the ambient runtime for background work
    #[must_use]
    pub fn new(context: UiContext) -> Self {
        Self::with_background(context, Arc::new(ThreadPool::ambient()))
    }

    /// Create an aggregator with an explicit background scheduler
    #[must_use]
    pub fn with_background(context: UiContext, background: Arc<dyn Scheduler>) -> Self {
        Self {
            context,
            background,
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// The UI context used for affinity checks and marshaling
    #[must_use]
    pub fn context(&self) -> &UiContext {
        &self.context
    }

    /// Subscribe a stateless handler for messages of type `M`
    pub fn subscribe<M>(
        &self,
        handler: fn(&M) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Subscription
    where
        M: Send + Sync + 'static,
    {
        self.add(Registration::stateless(handler, thread_option))
    }

    /// Subscribe a handler whose target is held weakly
    ///
    /// The registration dies when the last strong reference to `target`
    /// is dropped; no unsubscribe is needed.
    pub fn subscribe_weak<T, M>(
        &self,
        target: &Arc<T>,
        handler: fn(&T, &M) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Subscription
    where
        T: Send + Sync + 'static,
        M: Send + Sync + 'static,
    {
        self.add(Registration::targeted(weak_target(target), handler, thread_option))
    }

    /// Subscribe a handler that owns its target
    pub fn subscribe_owned<T, M>(
        &self,
        target: Arc<T>,
        handler: fn(&T, &M) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Subscription
    where
        T: Send + Sync + 'static,
        M: Send + Sync + 'static,
    {
        self.add(Registration::targeted(
            Target::Strong(target),
            handler,
            thread_option,
        ))
    }

    /// Subscribe a stateless async handler
    ///
    /// The returned future is driven on the thread the handler started on
    /// (the UI dispatcher or the background pool). Its failure goes to the
    /// fault sink.
    pub fn subscribe_async<M>(
        &self,
        handler: fn(Arc<M>) -> BoxFuture<'static, HandlerResult>,
        thread_option: ThreadOption,
    ) -> Subscription
    where
        M: Send + Sync + 'static,
    {
        self.add(Registration::stateless_async(handler, thread_option))
    }

    /// Subscribe an async handler whose target is held weakly
    pub fn subscribe_weak_async<T, M>(
        &self,
        target: &Arc<T>,
        handler: fn(Arc<T>, Arc<M>) -> BoxFuture<'static, HandlerResult>,
        thread_option: ThreadOption,
    ) -> Subscription
    where
        T: Send + Sync + 'static,
        M: Send + Sync + 'static,
    {
        self.add(Registration::targeted_async(
            weak_target(target),
            handler,
            thread_option,
        ))
    }

    /// Subscribe a stateless handler for every message
    pub fn subscribe_all(
        &self,
        handler: fn(&dyn Any) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Subscription {
        self.add(Registration::catch_all(Target::Static, handler, thread_option))
    }

    /// Subscribe a handler for every message, holding its target weakly
    pub fn subscribe_all_weak<T>(
        &self,
        target: &Arc<T>,
        handler: fn(&T, &dyn Any) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Subscription
    where
        T: Send + Sync + 'static,
    {
        self.add(Registration::catch_all_targeted(
            weak_target(target),
            handler,
            thread_option,
        ))
    }

    fn add(&self, registration: Registration) -> Subscription {
        let subscription = registration.subscription();
        let removed = {
            let mut handlers = self.handlers.lock();
            let removed = compact(&mut handlers);
            handlers.push(Arc::new(registration));
            removed
        };

        tracing::debug!(
            subscription = %subscription.id(),
            message_type = subscription.message_type(),
            thread_option = ?subscription.thread_option(),
            removed_dead = removed,
            "Handler subscribed"
        );
        subscription
    }

    /// Remove a registration
    ///
    /// Also drops any registration whose target is gone. Returns whether
    /// `subscription` was still registered.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut found = false;
        let removed = {
            let mut handlers = self.handlers.lock();
            let before = handlers.len();
            handlers.retain(|h| {
                if h.id() == subscription.id() {
                    found = true;
                    false
                } else {
                    !h.is_dead()
                }
            });
            before - handlers.len()
        };

        tracing::debug!(
            subscription = %subscription.id(),
            found,
            removed,
            "Handler unsubscribed"
        );
        found
    }

    /// Drop registrations whose target is gone
    ///
    /// Returns the number of registrations removed. Subscribe, unsubscribe
    /// and publish already do this on the way.
    pub fn compact(&self) -> usize {
        compact(&mut self.handlers.lock())
    }

    /// Number of live registrations
    #[must_use]
    pub fn len(&self) -> usize {
        let mut handlers = self.handlers.lock();
        compact(&mut handlers);
        handlers.len()
    }

    /// Whether there are no live registrations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish a message to every matching handler
    ///
    /// Handlers for the publisher's thread (and, on the UI thread, UI
    /// handlers) run before this returns. UI handlers published from another
    /// thread and background handlers run later; their failures go to the
    /// fault sink.
    ///
    /// # Errors
    ///
    /// Returns the first error of a handler that ran inline. The remaining
    /// handlers are not invoked and nothing is scheduled.
    pub fn publish<M>(&self, message: M) -> Result<(), PublishError>
    where
        M: Send + Sync + 'static,
    {
        let message_type = TypeId::of::<M>();
        let envelope: Envelope = Arc::new(message);

        let selected: Vec<Arc<Registration>> = {
            let mut handlers = self.handlers.lock();
            compact(&mut handlers);
            handlers
                .iter()
                .filter(|h| h.can_handle(message_type))
                .cloned()
                .collect()
        };

        if selected.is_empty() {
            tracing::trace!(
                message_type = std::any::type_name::<M>(),
                "No handlers for message"
            );
            return Ok(());
        }

        let on_ui_thread = self.context.check_access();
        let inline_scheduler = if on_ui_thread {
            self.context.scheduler()
        } else {
            Arc::clone(&self.background)
        };
        let sink = self.context.fault_sink();

        for registration in selected.iter().filter(|h| match h.thread_option() {
            ThreadOption::PublisherThread => true,
            ThreadOption::UiThread => on_ui_thread,
            ThreadOption::BackgroundThread => false,
        }) {
            match registration.invoke(&envelope) {
                Outcome::Done(Ok(())) | Outcome::Skipped => {}
                Outcome::Done(Err(error)) => {
                    return Err(PublishError::Handler {
                        subscription: registration.id(),
                        error,
                    });
                }
                Outcome::Pending(future) => {
                    operation::spawn_on(inline_scheduler.as_ref(), Arc::clone(&sink), future)
                        .observe();
                }
            }
        }

        if !on_ui_thread {
            let batch = select(&selected, ThreadOption::UiThread);
            if !batch.is_empty() {
                let message = Arc::clone(&envelope);
                let context = self.context.clone();
                self.context
                    .run(move || {
                        run_batch(&batch, &message, context.scheduler().as_ref(), &context.fault_sink())
                    })
                    .observe();
            }
        }

        let batch = select(&selected, ThreadOption::BackgroundThread);
        if !batch.is_empty() {
            let background = Arc::clone(&self.background);
            let batch_sink = Arc::clone(&sink);
            operation::run_on(self.background.as_ref(), sink, move || {
                run_batch(&batch, &envelope, background.as_ref(), &batch_sink)
            })
            .observe();
        }

        Ok(())
    }
}

impl fmt::Debug for EventAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAggregator")
            .field("registrations", &self.handlers.lock().len())
            .field("context", &self.context)
            .finish()
    }
}

fn weak_target<T>(target: &Arc<T>) -> Target
where
    T: Send + Sync + 'static,
{
    let weak: Weak<T> = Arc::downgrade(target);
    Target::Weak(weak)
}

fn compact(handlers: &mut Vec<Arc<Registration>>) -> usize {
    let before = handlers.len();
    handlers.retain(|h| !h.is_dead());
    let removed = before - handlers.len();
    if removed > 0 {
        tracing::debug!(
            removed,
            remaining = handlers.len(),
            "Removed dead handlers"
        );
    }
    removed
}

fn select(selected: &[Arc<Registration>], thread_option: ThreadOption) -> Vec<Arc<Registration>> {
    selected
        .iter()
        .filter(|h| h.thread_option() == thread_option)
        .cloned()
        .collect()
}

/// Run one marshaled group in registration order
///
/// Stops at the first failing handler; the error ends up on the batch's
/// operation.
fn run_batch(
    batch: &[Arc<Registration>],
    message: &Envelope,
    scheduler: &dyn Scheduler,
    sink: &Arc<dyn FaultSink>,
) -> HandlerResult {
    for registration in batch {
        match registration.invoke(message) {
            Outcome::Done(Ok(())) | Outcome::Skipped => {}
            Outcome::Done(Err(error)) => {
                return Err(error.context(format!("handler {} failed", registration.id())));
            }
            Outcome::Pending(future) => {
                operation::spawn_on(scheduler, Arc::clone(sink), future).observe();
            }
        }
    }
    Ok(())
}
