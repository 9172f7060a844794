//! Handler registrations held by the aggregator.

use std::any::{type_name, Any, TypeId};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;

use super::{Subscription, SubscriptionId, ThreadOption};
use crate::operation::HandlerResult;

/// A published message, shared by every handler that receives it
pub(crate) type Envelope = Arc<dyn Any + Send + Sync>;

type SharedTarget = Arc<dyn Any + Send + Sync>;

type Invoke = Box<dyn Fn(Option<SharedTarget>, &Envelope) -> Outcome + Send + Sync>;

/// What a registration holds on to
pub(crate) enum Target {
    /// Stateless handler, lives until unsubscribed
    Static,
    /// Target owned by the registration
    Strong(SharedTarget),
    /// Target owned elsewhere; the registration dies with it
    Weak(Weak<dyn Any + Send + Sync>),
}

/// Which messages a registration accepts
enum MessageFilter {
    Exact(TypeId),
    All,
}

/// Result of invoking a registration
pub(crate) enum Outcome {
    /// A synchronous handler ran
    Done(HandlerResult),
    /// An async handler started; the future still has to be driven
    Pending(BoxFuture<'static, HandlerResult>),
    /// The target was gone or the message did not match
    Skipped,
}

pub(crate) struct Registration {
    id: SubscriptionId,
    message_type: &'static str,
    thread_option: ThreadOption,
    filter: MessageFilter,
    target: Target,
    invoke: Invoke,
}

impl Registration {
    pub(crate) fn stateless<M>(handler: fn(&M) -> HandlerResult, thread_option: ThreadOption) -> Self
    where
        M: Send + Sync + 'static,
    {
        Self::exact::<M>(
            Target::Static,
            thread_option,
            Box::new(move |_, message| match message.downcast_ref::<M>() {
                Some(message) => Outcome::Done(handler(message)),
                None => Outcome::Skipped,
            }),
        )
    }

    pub(crate) fn stateless_async<M>(
        handler: fn(Arc<M>) -> BoxFuture<'static, HandlerResult>,
        thread_option: ThreadOption,
    ) -> Self
    where
        M: Send + Sync + 'static,
    {
        Self::exact::<M>(
            Target::Static,
            thread_option,
            Box::new(move |_, message| match Arc::clone(message).downcast::<M>() {
                Ok(message) => Outcome::Pending(handler(message)),
                Err(_) => Outcome::Skipped,
            }),
        )
    }

    pub(crate) fn targeted<T, M>(
        target: Target,
        handler: fn(&T, &M) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Self
    where
        T: Send + Sync + 'static,
        M: Send + Sync + 'static,
    {
        Self::exact::<M>(
            target,
            thread_option,
            Box::new(move |target, message| {
                let target = target.as_deref().and_then(|t| t.downcast_ref::<T>());
                match (target, message.downcast_ref::<M>()) {
                    (Some(target), Some(message)) => Outcome::Done(handler(target, message)),
                    _ => Outcome::Skipped,
                }
            }),
        )
    }

    pub(crate) fn targeted_async<T, M>(
        target: Target,
        handler: fn(Arc<T>, Arc<M>) -> BoxFuture<'static, HandlerResult>,
        thread_option: ThreadOption,
    ) -> Self
    where
        T: Send + Sync + 'static,
        M: Send + Sync + 'static,
    {
        Self::exact::<M>(
            target,
            thread_option,
            Box::new(move |target, message| {
                let target = target.and_then(|t| t.downcast::<T>().ok());
                match (target, Arc::clone(message).downcast::<M>().ok()) {
                    (Some(target), Some(message)) => Outcome::Pending(handler(target, message)),
                    _ => Outcome::Skipped,
                }
            }),
        )
    }

    pub(crate) fn catch_all(
        target: Target,
        handler: fn(&dyn Any) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Self {
        Self::new(
            MessageFilter::All,
            "*",
            target,
            thread_option,
            Box::new(move |_, message| Outcome::Done(handler(&**message))),
        )
    }

    pub(crate) fn catch_all_targeted<T>(
        target: Target,
        handler: fn(&T, &dyn Any) -> HandlerResult,
        thread_option: ThreadOption,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::new(
            MessageFilter::All,
            "*",
            target,
            thread_option,
            Box::new(move |target, message| {
                match target.as_deref().and_then(|t| t.downcast_ref::<T>()) {
                    Some(target) => Outcome::Done(handler(target, &**message)),
                    None => Outcome::Skipped,
                }
            }),
        )
    }

    fn exact<M: 'static>(target: Target, thread_option: ThreadOption, invoke: Invoke) -> Self {
        Self::new(
            MessageFilter::Exact(TypeId::of::<M>()),
            type_name::<M>(),
            target,
            thread_option,
            invoke,
        )
    }

    fn new(
        filter: MessageFilter,
        message_type: &'static str,
        target: Target,
        thread_option: ThreadOption,
        invoke: Invoke,
    ) -> Self {
        Self {
            id: SubscriptionId::next(),
            message_type,
            thread_option,
            filter,
            target,
            invoke,
        }
    }

    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn thread_option(&self) -> ThreadOption {
        self.thread_option
    }

    pub(crate) fn subscription(&self) -> Subscription {
        Subscription {
            id: self.id,
            message_type: self.message_type,
            thread_option: self.thread_option,
        }
    }

    /// True once a weakly held target has been dropped
    pub(crate) fn is_dead(&self) -> bool {
        match &self.target {
            Target::Weak(target) => target.strong_count() == 0,
            Target::Static | Target::Strong(_) => false,
        }
    }

    pub(crate) fn can_handle(&self, message_type: TypeId) -> bool {
        match self.filter {
            MessageFilter::Exact(accepted) => accepted == message_type,
            MessageFilter::All => true,
        }
    }

    /// Call the handler, unless the target died in the meantime
    pub(crate) fn invoke(&self, message: &Envelope) -> Outcome {
        let target = match &self.target {
            Target::Static => None,
            Target::Strong(target) => Some(Arc::clone(target)),
            Target::Weak(target) => match target.upgrade() {
                Some(target) => Some(target),
                None => return Outcome::Skipped,
            },
        };
        (self.invoke)(target, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        hits: parking_lot::Mutex<u32>,
    }

    fn bump(counter: &Counter, _message: &u32) -> HandlerResult {
        *counter.hits.lock() += 1;
        Ok(())
    }

    fn reject(_message: &u32) -> HandlerResult {
        anyhow::bail!("rejected")
    }

    #[test]
    fn test_weak_registration_dies_with_target() {
        let counter = Arc::new(Counter {
            hits: parking_lot::Mutex::new(0),
        });
        let weak: Weak<dyn Any + Send + Sync> = Arc::downgrade(&counter) as Weak<Counter>;
        let registration =
            Registration::targeted(Target::Weak(weak), bump, ThreadOption::PublisherThread);
        let message: Envelope = Arc::new(7_u32);

        assert!(!registration.is_dead());
        assert!(matches!(registration.invoke(&message), Outcome::Done(Ok(()))));
        assert_eq!(*counter.hits.lock(), 1);

        drop(counter);
        assert!(registration.is_dead());
        assert!(matches!(registration.invoke(&message), Outcome::Skipped));
    }

    #[test]
    fn test_exact_filter_matches_only_its_type() {
        let registration = Registration::stateless(reject, ThreadOption::PublisherThread);
        assert!(registration.can_handle(TypeId::of::<u32>()));
        assert!(!registration.can_handle(TypeId::of::<u64>()));
        assert_eq!(registration.subscription().message_type(), "u32");
    }

    #[test]
    fn test_handler_error_is_returned() {
        let registration = Registration::stateless(reject, ThreadOption::PublisherThread);
        let message: Envelope = Arc::new(1_u32);
        match registration.invoke(&message) {
            Outcome::Done(Err(e)) => assert_eq!(e.to_string(), "rejected"),
            _ => panic!("expected a handler error"),
        }
    }

    #[test]
    fn test_catch_all_accepts_everything() {
        fn any(_message: &dyn Any) -> HandlerResult {
            Ok(())
        }
        let registration =
            Registration::catch_all(Target::Static, any, ThreadOption::PublisherThread);
        assert!(registration.can_handle(TypeId::of::<String>()));
        assert!(registration.can_handle(TypeId::of::<u8>()));
        assert_eq!(registration.subscription().message_type(), "*");
    }
}
