#![forbid(unsafe_code)]

//! Event targets as reactive values.
//!
//! [`from_event`] turns an `addEventListener`-style target into a
//! [`Readable`] of the latest event. The underlying listener is attached only
//! while at least one subscription is live: the first `subscribe`/`on_change`
//! attaches it and the last `unsubscribe` detaches it again.
//!
//! [`Dispatcher`] is a plain in-memory target for code that produces its own
//! events.
//!
//! # Invariants
//!
//! 1. At most one listener per [`EventSource`] is attached at any time.
//! 2. The listener is attached iff the live subscription count is nonzero.
//! 3. `current()` never attaches the listener; it reports the last event
//!    seen while attached (`None` before the first one).
//! 4. Consecutive equal events notify once, like any other `set`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::observable::{Callback, Observable, Readable, Subscription};

/// Listener registered on an [`EventTarget`]. Identity is the `Rc` pointer.
pub type Listener<E> = Rc<dyn Fn(&E)>;

/// Anything that accepts and removes listeners by event kind.
pub trait EventTarget<E> {
    /// Register `listener` for events of `kind`.
    fn add_event_listener(&self, kind: &str, listener: Listener<E>);

    /// Remove a listener previously added with the same `kind`.
    fn remove_event_listener(&self, kind: &str, listener: &Listener<E>);
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

struct EventSourceInner<E> {
    target: Rc<dyn EventTarget<E>>,
    kind: String,
    latest: Observable<Option<E>>,
    listener: Listener<E>,
    subscribers: Cell<usize>,
}

/// The latest event of one kind on one target.
pub struct EventSource<E> {
    inner: Rc<EventSourceInner<E>>,
}

impl<E> Clone for EventSource<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for EventSource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("kind", &self.inner.kind)
            .field("subscribers", &self.inner.subscribers.get())
            .finish()
    }
}

/// Follow events of `kind` on `target`.
pub fn from_event<E>(target: Rc<dyn EventTarget<E>>, kind: impl Into<String>) -> EventSource<E>
where
    E: Clone + PartialEq + 'static,
{
    EventSource::new(target, kind)
}

impl<E: Clone + PartialEq + 'static> EventSource<E> {
    /// A detached source; the listener is added on the first subscription.
    pub fn new(target: Rc<dyn EventTarget<E>>, kind: impl Into<String>) -> Self {
        let latest = Observable::new(None);
        let sink = latest.clone();
        let listener: Listener<E> = Rc::new(move |event: &E| sink.set(Some(event.clone())));
        Self {
            inner: Rc::new(EventSourceInner {
                target,
                kind: kind.into(),
                latest,
                listener,
                subscribers: Cell::new(0),
            }),
        }
    }

    /// Whether the listener is currently attached to the target.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.inner.subscribers.get() > 0
    }

    fn acquire(&self) {
        let count = self.inner.subscribers.get();
        if count == 0 {
            tracing::debug!(target: "cellflow::event", kind = %self.inner.kind, "attach");
            self.inner
                .target
                .add_event_listener(&self.inner.kind, Rc::clone(&self.inner.listener));
        }
        self.inner.subscribers.set(count + 1);
    }

    fn release(&self) {
        let count = self.inner.subscribers.get().saturating_sub(1);
        self.inner.subscribers.set(count);
        if count == 0 {
            tracing::debug!(target: "cellflow::event", kind = %self.inner.kind, "detach");
            self.inner
                .target
                .remove_event_listener(&self.inner.kind, &self.inner.listener);
        }
    }

    fn gate(&self, subscription: Subscription) -> Subscription {
        let this = self.clone();
        Subscription::new(move || {
            subscription.unsubscribe();
            this.release();
        })
    }
}

impl<E: Clone + PartialEq + 'static> Readable for EventSource<E> {
    type Value = Option<E>;

    fn current(&self) -> Option<E> {
        self.inner.latest.current()
    }

    fn subscribe_boxed(&self, callback: Callback<Option<E>>) -> Subscription {
        self.acquire();
        let subscription = self.inner.latest.subscribe_boxed(callback);
        self.gate(subscription)
    }

    fn on_change_boxed(&self, callback: Callback<Option<E>>) -> Subscription {
        self.acquire();
        let subscription = self.inner.latest.on_change_boxed(callback);
        self.gate(subscription)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// An in-memory [`EventTarget`] that delivers events synchronously.
pub struct Dispatcher<E> {
    listeners: RefCell<Vec<(String, Listener<E>)>>,
}

impl<E> Default for Dispatcher<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl<E> Dispatcher<E> {
    /// A dispatcher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener registered for `kind`.
    pub fn dispatch(&self, kind: &str, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(k, _)| k == kind)
            .count()
    }
}

impl<E> EventTarget<E> for Dispatcher<E> {
    fn add_event_listener(&self, kind: &str, listener: Listener<E>) {
        self.listeners.borrow_mut().push((kind.to_string(), listener));
    }

    fn remove_event_listener(&self, kind: &str, listener: &Listener<E>) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(pos) = listeners
            .iter()
            .position(|(k, l)| k == kind && Rc::ptr_eq(l, listener))
        {
            listeners.remove(pos);
        }
    }
}
