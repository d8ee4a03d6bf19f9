#![forbid(unsafe_code)]

//! Mutable reactive cells and the [`Readable`] contract.
//!
//! # Design
//!
//! [`Observable<T>`] stores its value, a version counter, and an observer set
//! in shared `Rc<RefCell<..>>` storage. Observers are keyed by a per-cell id
//! handed out at registration time, so two identical closures are still two
//! distinct observers.
//!
//! Notification takes a snapshot of the observer set and releases every
//! borrow before invoking callbacks. An observer may therefore call `set`
//! (on this cell or another), subscribe, or unsubscribe while being notified.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per `set` that changes the value.
//! 2. Observers are notified in registration order.
//! 3. Setting a value equal to the current one is a no-op (no version bump,
//!    no notifications).
//! 4. Within one fan-out every observer present in the snapshot is called
//!    exactly once, even if the set is modified mid-iteration.
//! 5. Observers are removed only through [`Subscription::unsubscribe`].

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Shared observer callback.
pub type Callback<T> = Rc<dyn Fn(&T)>;

/// A value that can be read and observed for changes.
///
/// Implemented by every reactive type in the crate. The trait is object safe;
/// the closure-taking conveniences require `Self: Sized`.
pub trait Readable {
    /// Type of the observed value.
    type Value: Clone + 'static;

    /// The value at this instant.
    fn current(&self) -> Self::Value;

    /// Register `callback` and invoke it with the current value before
    /// returning, then on every subsequent change.
    fn subscribe_boxed(&self, callback: Callback<Self::Value>) -> Subscription;

    /// Register `callback` for future changes only.
    fn on_change_boxed(&self, callback: Callback<Self::Value>) -> Subscription;

    /// Closure form of [`subscribe_boxed`](Readable::subscribe_boxed).
    fn subscribe(&self, callback: impl Fn(&Self::Value) + 'static) -> Subscription
    where
        Self: Sized,
    {
        self.subscribe_boxed(Rc::new(callback))
    }

    /// Closure form of [`on_change_boxed`](Readable::on_change_boxed).
    fn on_change(&self, callback: impl Fn(&Self::Value) + 'static) -> Subscription
    where
        Self: Sized,
    {
        self.on_change_boxed(Rc::new(callback))
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

type Detach = Box<dyn FnOnce()>;

/// Handle that removes one observer from the cell it was registered on.
///
/// Dropping the handle does not unsubscribe; observers stay registered until
/// [`unsubscribe`](Subscription::unsubscribe) is called. Clones share the same
/// registration.
#[derive(Clone)]
pub struct Subscription {
    detach: Rc<RefCell<Option<Detach>>>,
}

impl Subscription {
    /// Build a subscription that runs `detach` on the first `unsubscribe`.
    pub fn new(detach: impl FnOnce() + 'static) -> Self {
        Self {
            detach: Rc::new(RefCell::new(Some(Box::new(detach)))),
        }
    }

    /// Remove the observer. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        let detach = self.detach.borrow_mut().take();
        if let Some(detach) = detach {
            detach();
        }
    }

    /// Whether the observer is still registered through this handle.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.detach.borrow().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Observable
// ---------------------------------------------------------------------------

struct ObservableInner<T> {
    value: T,
    version: u64,
    next_observer_id: u64,
    observers: Vec<(u64, Callback<T>)>,
}

impl<T> ObservableInner<T> {
    fn remove_observer(&mut self, id: u64) -> Option<Callback<T>> {
        let index = self
            .observers
            .iter()
            .position(|(observer_id, _)| *observer_id == id)?;
        Some(self.observers.remove(index).1)
    }
}

/// A shared, version-tracked mutable cell with change notification.
///
/// Cloning an `Observable` creates a new handle to the **same** cell.
pub struct Observable<T> {
    inner: Rc<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObservableInner {
                value,
                version: 0,
                next_observer_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Replace the value and notify observers, unless `value` equals the
    /// stored value.
    ///
    /// Every observer registered when the change lands is notified before
    /// this returns.
    pub fn set(&self, value: T) {
        let (snapshot, version) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value.clone();
            inner.version += 1;
            let snapshot: Vec<Callback<T>> = inner
                .observers
                .iter()
                .map(|(_, callback)| Rc::clone(callback))
                .collect();
            (snapshot, inner.version)
        };

        tracing::trace!(
            target: "cellflow::observable",
            version,
            observers = snapshot.len(),
            "notify"
        );
        for callback in &snapshot {
            callback(&value);
        }
    }

    /// Set the value to `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.with(f);
        self.set(next);
    }

    /// Access the value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls `set` on the same cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of effective changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered observers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    /// A non-owning handle to this cell.
    #[must_use]
    pub fn downgrade(&self) -> WeakObservable<T> {
        WeakObservable {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn add_observer(&self, callback: Callback<T>) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_observer_id;
            inner.next_observer_id += 1;
            inner.observers.push((id, callback));
            id
        };
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            // The callback may own the last handle to something that detaches
            // from this cell, so it is dropped after the borrow ends.
            let removed = weak.upgrade().and_then(|inner| {
                let mut inner = inner.borrow_mut();
                inner.remove_observer(id)
            });
            drop(removed);
        })
    }
}

impl<T: Clone + PartialEq + 'static> Readable for Observable<T> {
    type Value = T;

    fn current(&self) -> T {
        self.inner.borrow().value.clone()
    }

    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        let subscription = self.add_observer(Rc::clone(&callback));
        let value = self.current();
        callback(&value);
        subscription
    }

    fn on_change_boxed(&self, callback: Callback<T>) -> Subscription {
        self.add_observer(callback)
    }
}

/// Non-owning handle to an [`Observable`].
pub struct WeakObservable<T> {
    inner: Weak<RefCell<ObservableInner<T>>>,
}

impl<T> Clone for WeakObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakObservable<T> {
    /// Recover the cell if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Observable<T>> {
        self.inner.upgrade().map(|inner| Observable { inner })
    }
}

impl<T> fmt::Debug for WeakObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObservable")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
