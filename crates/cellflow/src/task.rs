#![forbid(unsafe_code)]

//! Asynchronous computations as ordinary reactive data.
//!
//! A [`Task<T, E>`] is a cloneable handle to one shared, single-threaded
//! future resolving to `Result<T, E>`. Two handles are equal only when they
//! share the same future, so an `Observable<Task<..>>` notifies exactly when a
//! new computation is installed.
//!
//! [`unwrap_task`] follows a task-valued readable and reports each
//! computation's progress as an [`Unwrapped`] record:
//!
//! 1. On every new task the record becomes `pending` synchronously, before
//!    any await point, so observers see it within the triggering call.
//! 2. The task is awaited on the current tokio `LocalSet`; success fills
//!    `result`, failure fills `error`. Rejections never escape.
//!
//! # Stale completions
//!
//! Completions are not sequenced. If the source installs a second task before
//! the first settles, whichever settles last wins, even if it is the older
//! one. Callers that need "latest only" should avoid overlapping tasks or
//! compare results themselves.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::derived::{Derived, derive};
use crate::filter::{filter, limitation};
use crate::observable::{Callback, Observable, Readable, Subscription};
use crate::view::ReadOnly;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A shared handle to an asynchronous computation.
pub struct Task<T, E> {
    future: Shared<LocalBoxFuture<'static, Result<T, E>>>,
}

impl<T, E> Clone for Task<T, E> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

/// Identity comparison.
impl<T: Clone, E: Clone> PartialEq for Task<T, E> {
    fn eq(&self, other: &Self) -> bool {
        self.future.ptr_eq(&other.future)
    }
}

impl<T: Clone, E: Clone> Eq for Task<T, E> {}

impl<T: Clone + fmt::Debug, E: Clone + fmt::Debug> fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("output", &self.future.peek())
            .finish()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Task<T, E> {
    /// Wrap a future. It is not polled until the task is awaited.
    pub fn new(future: impl Future<Output = Result<T, E>> + 'static) -> Self {
        Self {
            future: future.boxed_local().shared(),
        }
    }

    /// A task that is already fulfilled.
    pub fn resolved(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// A task that is already rejected.
    pub fn rejected(error: E) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    /// The outcome, if the task has settled.
    #[must_use]
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.future.peek().cloned()
    }

    /// Await the outcome. Every handle observes the same result.
    pub async fn settled(&self) -> Result<T, E> {
        self.future.clone().await
    }
}

// ---------------------------------------------------------------------------
// Unwrapped
// ---------------------------------------------------------------------------

/// Progress of the most recent task seen by [`unwrap_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped<T, E> {
    /// Fulfilled value; `None` while pending or after a rejection.
    pub result: Option<T>,
    /// Whether a task is currently being awaited.
    pub pending: bool,
    /// Rejection reason; `None` while pending or after success.
    pub error: Option<E>,
}

impl<T, E> Default for Unwrapped<T, E> {
    fn default() -> Self {
        Self {
            result: None,
            pending: false,
            error: None,
        }
    }
}

impl<T, E> Unwrapped<T, E> {
    /// The state reported while a task is in flight.
    #[must_use]
    pub fn waiting() -> Self {
        Self {
            pending: true,
            ..Self::default()
        }
    }

    /// The state for a fulfilled task.
    #[must_use]
    pub fn fulfilled(value: T) -> Self {
        Self {
            result: Some(value),
            ..Self::default()
        }
    }

    /// The state for a rejected task.
    #[must_use]
    pub fn rejected(error: E) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Neither pending nor rejected.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.pending && self.error.is_none()
    }
}

// ---------------------------------------------------------------------------
// Unwrapping
// ---------------------------------------------------------------------------

/// Follow a task-valued readable and expose each task's progress.
///
/// Must be called inside a tokio `LocalSet`; every emitted task is awaited
/// with `spawn_local`.
pub fn unwrap_task<R, T, E>(source: &R) -> ReadOnly<Unwrapped<T, E>>
where
    R: Readable<Value = Task<T, E>>,
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    let cell = Observable::new(Unwrapped::default());
    let target = cell.clone();
    let upstream = source.subscribe_boxed(Rc::new(move |task: &Task<T, E>| {
        target.set(Unwrapped::waiting());

        let target = target.clone();
        let task = task.clone();
        tokio::task::spawn_local(async move {
            match task.settled().await {
                Ok(value) => {
                    tracing::debug!(target: "cellflow::task", "fulfilled");
                    target.set(Unwrapped::fulfilled(value));
                }
                Err(error) => {
                    tracing::debug!(target: "cellflow::task", "rejected");
                    target.set(Unwrapped::rejected(error));
                }
            }
        });
    }));
    ReadOnly::new(Following {
        cell,
        upstream: Rc::new(upstream),
    })
}

/// The status cell of [`unwrap_task`]. It and every subscription taken on it
/// share the source subscription, so a derived source stays alive while the
/// status is read or observed.
struct Following<T, E> {
    cell: Observable<Unwrapped<T, E>>,
    upstream: Rc<Subscription>,
}

impl<T, E> Following<T, E> {
    fn hold(&self, subscription: Subscription) -> Subscription {
        let upstream = Rc::clone(&self.upstream);
        Subscription::new(move || {
            subscription.unsubscribe();
            drop(upstream);
        })
    }
}

impl<T, E> Readable for Following<T, E>
where
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    type Value = Unwrapped<T, E>;

    fn current(&self) -> Unwrapped<T, E> {
        self.cell.current()
    }

    fn subscribe_boxed(&self, callback: Callback<Unwrapped<T, E>>) -> Subscription {
        self.hold(self.cell.subscribe_boxed(callback))
    }

    fn on_change_boxed(&self, callback: Callback<Unwrapped<T, E>>) -> Subscription {
        self.hold(self.cell.on_change_boxed(callback))
    }
}

/// The last fulfilled result of a task-valued readable.
///
/// Pending and rejected states leave the previous result in place.
pub fn fulfilled<R, T, E>(source: &R) -> Derived<Option<T>>
where
    R: Readable<Value = Task<T, E>>,
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    let settled = filter(
        &unwrap_task(source),
        vec![limitation(|state: &Unwrapped<T, E>| state.is_ok())],
    );
    derive(&settled, |state: &Option<Unwrapped<T, E>>| {
        state.as_ref().and_then(|state| state.result.clone())
    })
}

/// Whether a task of the readable is currently in flight.
pub fn pending<R, T, E>(source: &R) -> Derived<bool>
where
    R: Readable<Value = Task<T, E>>,
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    derive(&unwrap_task(source), |state: &Unwrapped<T, E>| state.pending)
}

/// The rejection reason of the readable's latest settled task, if any.
pub fn rejected<R, T, E>(source: &R) -> Derived<Option<E>>
where
    R: Readable<Value = Task<T, E>>,
    T: Clone + PartialEq + 'static,
    E: Clone + PartialEq + 'static,
{
    derive(&unwrap_task(source), |state: &Unwrapped<T, E>| {
        state.error.clone()
    })
}
