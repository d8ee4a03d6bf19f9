#![forbid(unsafe_code)]

//! Lazy derived values that track one or more [`Readable`] dependencies.
//!
//! # Design
//!
//! [`Derived<T>`] owns a combining function, a cached slot, and a private
//! dirty flag held in an [`Observable<bool>`]. Each dependency gets an
//! `on_change` listener that sets the flag to `true`; the listener carries no
//! value, it only invalidates. Recomputation is deferred until someone reads
//! the derived value or a subscriber has to be notified.
//!
//! Subscribers are attached to the dirty flag, not to the cache. When the flag
//! turns `true` each subscriber wrapper reads [`current()`](Readable::current),
//! which recomputes once, and hands the fresh value to its callback.
//!
//! # Invariants
//!
//! 1. `dirty` is true initially and after any dependency changes; it is
//!    cleared by every recomputation.
//! 2. The combining function runs only from `current()` while the cache is
//!    empty or dirty, so unobserved dependency churn costs nothing.
//! 3. The cached value is replaced only when the fresh result differs from it.
//! 4. A subscriber never sees the same value twice in a row.
//! 5. `version` increments by 1 on each recomputation.
//!
//! # Failure Modes
//!
//! - **Combining function panics**: the dirty flag stays set and the cache
//!   keeps its previous value; the panic propagates to the reader.
//! - **Dependency dropped**: dependency handles are owned by the derived value,
//!   so a dependency lives at least as long as the values derived from it.
//! - **Derived value dropped**: dependencies hold it only weakly. Once its
//!   last handle or subscription goes away it is freed and its invalidation
//!   listeners are removed from the dependencies.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::observable::{Callback, Observable, Readable, Subscription};

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// An ordered set of dependencies for [`derive_all`].
///
/// Implemented for tuples of readables (up to six) and for `Vec<R>` of a
/// single readable type.
pub trait Sources: 'static {
    /// Values read from every dependency, in order.
    type Values;

    /// Read the current value of every dependency, in order.
    fn values(&self) -> Self::Values;

    /// Invoke `notify` whenever any dependency changes.
    fn watch(&self, notify: Rc<dyn Fn()>) -> Vec<Subscription>;
}

macro_rules! impl_sources_for_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name),+> Sources for ($($name,)+)
        where
            $($name: Readable + 'static,)+
        {
            type Values = ($($name::Value,)+);

            fn values(&self) -> Self::Values {
                ($(self.$idx.current(),)+)
            }

            fn watch(&self, notify: Rc<dyn Fn()>) -> Vec<Subscription> {
                vec![$({
                    let notify = Rc::clone(&notify);
                    self.$idx.on_change_boxed(Rc::new(move |_: &<$name as Readable>::Value| notify()))
                }),+]
            }
        }
    };
}

impl_sources_for_tuple!(A: 0);
impl_sources_for_tuple!(A: 0, B: 1);
impl_sources_for_tuple!(A: 0, B: 1, C: 2);
impl_sources_for_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_sources_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_sources_for_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

impl<R: Readable + 'static> Sources for Vec<R> {
    type Values = Vec<R::Value>;

    fn values(&self) -> Self::Values {
        self.iter().map(Readable::current).collect()
    }

    fn watch(&self, notify: Rc<dyn Fn()>) -> Vec<Subscription> {
        self.iter()
            .map(|source| {
                let notify = Rc::clone(&notify);
                source.on_change_boxed(Rc::new(move |_: &R::Value| notify()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Derived
// ---------------------------------------------------------------------------

struct DerivedInner<T> {
    compute: Box<dyn Fn() -> T>,
    /// `None` until the first computation.
    cached: RefCell<Option<T>>,
    dirty: Observable<bool>,
    version: Cell<u64>,
    /// Invalidation listeners registered on the dependencies.
    dependencies: Vec<Subscription>,
}

impl<T> Drop for DerivedInner<T> {
    fn drop(&mut self) {
        for dependency in &self.dependencies {
            dependency.unsubscribe();
        }
    }
}

/// A lazily recomputed value derived from other readables.
///
/// Cloning a `Derived` creates a new handle to the **same** inner state.
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("cached", &self.inner.cached.borrow())
            .field("dirty", &self.inner.dirty.with(|d| *d))
            .field("version", &self.inner.version.get())
            .field("dependencies", &self.inner.dependencies.len())
            .finish()
    }
}

/// Derive a value from a single readable.
pub fn derive<R, T>(source: &R, map: impl Fn(&R::Value) -> T + 'static) -> Derived<T>
where
    R: Readable + Clone + 'static,
    T: Clone + PartialEq + 'static,
{
    Derived::new(source, map)
}

/// Derive a value from an ordered set of readables.
///
/// ```
/// use cellflow::{Observable, Readable, derive_all};
///
/// let a = Observable::new(1);
/// let b = Observable::new(2);
/// let sum = derive_all((a.clone(), b.clone()), |(a, b)| a + b);
/// assert_eq!(sum.current(), 3);
/// b.set(5);
/// assert_eq!(sum.current(), 6);
/// ```
pub fn derive_all<S, T>(sources: S, combine: impl Fn(S::Values) -> T + 'static) -> Derived<T>
where
    S: Sources,
    T: Clone + PartialEq + 'static,
{
    Derived::combine(sources, combine)
}

impl<T: Clone + PartialEq + 'static> Derived<T> {
    /// Create a derived value from a single readable.
    ///
    /// The `map` function receives a reference to the source value.
    pub fn new<R>(source: &R, map: impl Fn(&R::Value) -> T + 'static) -> Self
    where
        R: Readable + Clone + 'static,
    {
        Self::combine((source.clone(),), move |(value,)| map(&value))
    }

    /// Create a derived value from an ordered set of readables.
    pub fn combine<S: Sources>(sources: S, combine: impl Fn(S::Values) -> T + 'static) -> Self {
        let dirty = Observable::new(true);

        let weak_dirty = dirty.downgrade();
        let dependencies = sources.watch(Rc::new(move || {
            if let Some(dirty) = weak_dirty.upgrade() {
                dirty.set(true);
            }
        }));

        Self {
            inner: Rc::new(DerivedInner {
                compute: Box::new(move || combine(sources.values())),
                cached: RefCell::new(None),
                dirty,
                version: Cell::new(0),
                dependencies,
            }),
        }
    }

    /// Run `f` against the current value, recomputing first if stale.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let fresh = self.current();
        f(&fresh)
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.with(|dirty| *dirty)
    }

    /// Force invalidation of the cached value.
    ///
    /// Subscribers are notified if the next recomputation yields a new value.
    pub fn invalidate(&self) {
        self.inner.dirty.set(true);
    }

    /// Number of recomputations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Recompute if the cache is empty or dirty and return the fresh value;
    /// otherwise return the cached one.
    fn refresh(&self) -> T {
        let stale = self.is_dirty() || self.inner.cached.borrow().is_none();
        if !stale {
            if let Some(cached) = self.inner.cached.borrow().as_ref() {
                return cached.clone();
            }
        }

        let fresh = (self.inner.compute)();
        self.inner.version.set(self.inner.version.get() + 1);
        let changed = self.inner.cached.borrow().as_ref() != Some(&fresh);
        tracing::trace!(
            target: "cellflow::derived",
            version = self.version(),
            changed,
            "recompute"
        );
        if changed {
            *self.inner.cached.borrow_mut() = Some(fresh.clone());
        }
        self.inner.dirty.set(false);
        fresh
    }

    /// Wrap `callback` so it fires with the recomputed value each time the
    /// dirty flag turns on, skipping values equal to the last one delivered.
    ///
    /// The wrapper lives in this value's own dirty flag, so it must not own
    /// the value.
    fn dirty_listener(&self, callback: Callback<T>, seen: Option<T>) -> Callback<bool> {
        let weak: Weak<DerivedInner<T>> = Rc::downgrade(&self.inner);
        let last = RefCell::new(seen);
        Rc::new(move |dirty: &bool| {
            if !*dirty {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let fresh = Derived { inner }.refresh();
            if last.borrow().as_ref() == Some(&fresh) {
                return;
            }
            *last.borrow_mut() = Some(fresh.clone());
            callback(&fresh);
        })
    }

    /// Tie `subscription` to a strong handle, keeping this value alive until
    /// it is unsubscribed.
    fn hold(&self, subscription: Subscription) -> Subscription {
        let this = self.clone();
        Subscription::new(move || {
            subscription.unsubscribe();
            drop(this);
        })
    }
}

impl<T: Clone + PartialEq + 'static> Readable for Derived<T> {
    type Value = T;

    fn current(&self) -> T {
        self.refresh()
    }

    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        let value = self.refresh();
        let subscription = self
            .inner
            .dirty
            .on_change_boxed(self.dirty_listener(Rc::clone(&callback), Some(value.clone())));
        callback(&value);
        self.hold(subscription)
    }

    fn on_change_boxed(&self, callback: Callback<T>) -> Subscription {
        // A never-computed value is already dirty and would miss the first
        // change, so establish the baseline now.
        let seen = self.refresh();
        let subscription = self
            .inner
            .dirty
            .on_change_boxed(self.dirty_listener(callback, Some(seen)));
        self.hold(subscription)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0u32));
        (Rc::clone(&count), count)
    }

    #[test]
    fn single_dep_derived() {
        let source = Observable::new(10);
        let doubled = derive(&source, |v| v * 2);

        assert_eq!(doubled.current(), 20);
        assert_eq!(doubled.version(), 1);

        source.set(5);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.current(), 10);
        assert_eq!(doubled.version(), 2);
    }

    #[test]
    fn multi_dep_derived() {
        let width = Observable::new(10);
        let height = Observable::new(20);
        let area = derive_all((width.clone(), height.clone()), |(w, h)| w * h);

        assert_eq!(area.current(), 200);

        width.set(5);
        assert_eq!(area.current(), 100);

        height.set(30);
        assert_eq!(area.current(), 150);
    }

    #[test]
    fn three_dep_subscription() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let c = Observable::new(3);
        let sum = derive_all((a.clone(), b.clone(), c.clone()), |(a, b, c)| a + b + c);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = sum.subscribe(move |v| sink.borrow_mut().push(*v));
        assert_eq!(*seen.borrow(), vec![6]);

        c.set(6);
        assert_eq!(*seen.borrow(), vec![6, 9]);
    }

    #[test]
    fn vec_sources_in_order() {
        let parts: Vec<Observable<&str>> = ["a", "b", "c"].into_iter().map(Observable::new).collect();
        let joined = derive_all(parts.clone(), |values| values.concat());
        assert_eq!(joined.current(), "abc");

        parts[1].set("B");
        assert_eq!(joined.current(), "aBc");
    }

    #[test]
    fn lazy_until_read() {
        let (count, inner) = counter();
        let source = Observable::new(42);
        let derived = derive(&source, move |v| {
            inner.set(inner.get() + 1);
            v * 2
        });

        // Not computed yet.
        assert_eq!(count.get(), 0);

        for i in 0..100 {
            source.set(i);
        }
        assert_eq!(count.get(), 0);

        assert_eq!(derived.current(), 198);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn memoization() {
        let (count, inner) = counter();
        let source = Observable::new(10);
        let derived = derive(&source, move |v| {
            inner.set(inner.get() + 1);
            v * 2
        });

        assert_eq!(derived.current(), 20);
        assert_eq!(derived.current(), 20);
        assert_eq!(count.get(), 1);

        source.set(20);
        assert_eq!(derived.current(), 40);
        assert_eq!(derived.current(), 40);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn burst_of_changes_recomputes_once_per_notification() {
        let (count, inner) = counter();
        let a = Observable::new(1);
        let b = Observable::new(1);
        let product = derive_all((a.clone(), b.clone()), move |(a, b)| {
            inner.set(inner.get() + 1);
            a * b
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = product.on_change(move |v| sink.borrow_mut().push(*v));

        a.set(2);
        b.set(3);

        // Each upstream change produces its own notification.
        assert_eq!(*seen.borrow(), vec![2, 6]);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn unchanged_result_is_not_renotified() {
        let source = Observable::new(1);
        let parity = derive(&source, |v| v % 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = parity.subscribe(move |v| sink.borrow_mut().push(*v));

        source.set(3);
        source.set(4);
        source.set(6);
        source.set(7);

        assert_eq!(*seen.borrow(), vec![1, 0, 1]);
        assert!(!parity.is_dirty());
    }

    #[test]
    fn unchanged_result_keeps_cached_value() {
        let source = Observable::new(vec![1, 2]);
        let len = derive(&source, Vec::len);
        assert_eq!(len.current(), 2);

        source.set(vec![3, 4]);
        assert_eq!(len.current(), 2);
        assert_eq!(len.version(), 2);
        assert!(!len.is_dirty());
    }

    #[test]
    fn subscribe_on_clean_value_still_delivers() {
        let source = Observable::new(3);
        let derived = derive(&source, |v| v + 1);
        assert_eq!(derived.current(), 4);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = derived.subscribe(move |v| sink.borrow_mut().push(*v));
        assert_eq!(*seen.borrow(), vec![4]);
    }

    #[test]
    fn on_change_does_not_deliver_immediately() {
        let source = Observable::new(3);
        let derived = derive(&source, |v| v + 1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = derived.on_change(move |v| sink.borrow_mut().push(*v));
        assert!(seen.borrow().is_empty());

        source.set(10);
        assert_eq!(*seen.borrow(), vec![11]);
    }

    #[test]
    fn multiple_subscribers_share_one_recompute() {
        let (count, inner) = counter();
        let source = Observable::new(1);
        let derived = derive(&source, move |v| {
            inner.set(inner.get() + 1);
            *v
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink_a = Rc::clone(&seen);
        let sink_b = Rc::clone(&seen);
        let _a = derived.subscribe(move |v| sink_a.borrow_mut().push(("a", *v)));
        let _b = derived.subscribe(move |v| sink_b.borrow_mut().push(("b", *v)));
        assert_eq!(count.get(), 1);

        source.set(2);
        assert_eq!(count.get(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let source = Observable::new(1);
        let derived = derive(&source, |v| v * 10);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = derived.on_change(move |v| sink.borrow_mut().push(*v));

        source.set(2);
        sub.unsubscribe();
        source.set(3);

        assert_eq!(*seen.borrow(), vec![20]);
        assert_eq!(derived.current(), 30);
    }

    #[test]
    fn chain_propagates() {
        let (outer_count, outer_inner) = counter();
        let source = Observable::new(2);
        let squared = derive(&source, |v| v * v);
        let labelled = derive(&squared, move |v| {
            outer_inner.set(outer_inner.get() + 1);
            format!("sq={v}")
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = labelled.subscribe(move |v: &String| sink.borrow_mut().push(v.clone()));

        source.set(3);
        source.set(-3);
        source.set(4);

        assert_eq!(*seen.borrow(), vec!["sq=4", "sq=9", "sq=16"]);
        assert_eq!(outer_count.get(), 3);
    }

    #[test]
    fn dropped_chain_is_freed() {
        let token = Rc::new(());
        {
            let held = Rc::clone(&token);
            let source = Observable::new(1);
            let plus_one = derive(&source, move |v| {
                let _ = &held;
                v + 1
            });
            let doubled = derive(&plus_one, |v| v * 2);
            let sub = doubled.subscribe(|_: &i32| {});
            source.set(2);
            assert_eq!(doubled.current(), 6);
            sub.unsubscribe();
            assert_eq!(Rc::strong_count(&token), 2);
        }
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn dropped_derived_detaches_from_source() {
        let source = Observable::new(0);
        for _ in 0..100 {
            let derived = derive(&source, |v| v + 1);
            assert_eq!(derived.current(), 1);
        }
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn subscription_keeps_derived_alive() {
        let source = Observable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = derive(&source, |v| v * 10).on_change(move |v: &i32| sink.borrow_mut().push(*v));

        source.set(2);
        assert_eq!(*seen.borrow(), vec![20]);
        assert_eq!(source.subscriber_count(), 1);

        sub.unsubscribe();
        source.set(3);
        assert_eq!(*seen.borrow(), vec![20]);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn chain_stays_fresh_without_subscribers() {
        let source = Observable::new(1);
        let plus_one = derive(&source, |v| v + 1);
        let times_two = derive(&plus_one, |v| v * 2);

        assert_eq!(times_two.current(), 4);
        source.set(5);
        assert_eq!(times_two.current(), 12);
        source.set(6);
        assert_eq!(times_two.current(), 14);
    }

    #[test]
    fn diamond_dependency() {
        let a = Observable::new(10);
        let b = derive(&a, |v| v + 1);
        let c = derive(&a, |v| v * 2);
        let d = derive_all((b.clone(), c.clone()), |(b, c)| b + c);

        assert_eq!(d.current(), 31);
        a.set(5);
        assert_eq!(d.current(), 16);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let (count, inner) = counter();
        let source = Observable::new(5);
        let derived = derive(&source, move |v| {
            inner.set(inner.get() + 1);
            *v
        });

        assert_eq!(derived.current(), 5);
        derived.invalidate();
        assert!(derived.is_dirty());
        assert_eq!(derived.current(), 5);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn equal_source_set_keeps_clean() {
        let source = Observable::new(42);
        let derived = derive(&source, |v| *v);
        let _ = derived.current();

        source.set(42);
        assert!(!derived.is_dirty());
        assert_eq!(derived.version(), 1);
    }

    #[test]
    fn with_access() {
        let source = Observable::new(vec![1, 2, 3]);
        let sum = derive(&source, |v| v.iter().sum::<i32>());
        assert_eq!(sum.with(|s| *s), 6);
    }

    #[test]
    fn clone_shares_state() {
        let source = Observable::new(10);
        let c1 = derive(&source, |v| v + 1);
        let c2 = c1.clone();

        assert_eq!(c1.current(), 11);
        source.set(20);
        assert_eq!(c2.current(), 21);
        assert_eq!(c1.version(), 2);
    }

    #[test]
    fn debug_format() {
        let source = Observable::new(42);
        let derived = derive(&source, |v| *v);
        let _ = derived.current();
        let dbg = format!("{derived:?}");
        assert!(dbg.contains("Derived"));
        assert!(dbg.contains("42"));
    }
}
