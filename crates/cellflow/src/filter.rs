#![forbid(unsafe_code)]

//! Conditional mirroring of a source through a list of limitations.
//!
//! A [`Filtered<T>`] owns one internal [`Observable<Option<T>>`]. Every value
//! the source emits is run through the limitations in order; only a value
//! that passes all of them is written to the internal cell. `None` marks a
//! seed value that was rejected at construction.
//!
//! Limitations receive the internal cell as their second argument. They
//! return plain booleans, but may schedule a later write into that cell;
//! [`debounce`](crate::debounce) is built on this.
//!
//! # Invariants
//!
//! 1. Limitations run in list order and stop at the first `false`.
//! 2. The internal cell changes only when every limitation accepts, or when a
//!    limitation writes to it directly.
//! 3. The internal cell is never exposed mutably.

use std::fmt;
use std::rc::Rc;

use crate::observable::{Callback, Observable, Readable, Subscription};
use crate::view::ReadOnly;

/// A predicate deciding whether a candidate value is accepted.
pub type Limitation<T> = Rc<dyn Fn(&T, &Observable<Option<T>>) -> bool>;

/// Build a [`Limitation`] from a plain predicate on the candidate.
pub fn limitation<T: 'static>(predicate: impl Fn(&T) -> bool + 'static) -> Limitation<T> {
    Rc::new(move |value: &T, _: &Observable<Option<T>>| predicate(value))
}

/// Run `limitations` in order against `value`, short-circuiting on failure.
fn accepts<T>(limitations: &[Limitation<T>], value: &T, target: &Observable<Option<T>>) -> bool {
    limitations.iter().all(|limitation| limitation(value, target))
}

/// A read-only value that mirrors a source, minus rejected updates.
pub struct Filtered<T> {
    view: ReadOnly<Option<T>>,
    upstream: Subscription,
}

impl<T> Clone for Filtered<T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Filtered<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filtered")
            .field("current", &self.view.current())
            .field("upstream", &self.upstream)
            .finish()
    }
}

/// Mirror `source`, accepting only values every limitation allows.
///
/// ```
/// use cellflow::{Observable, Readable, filter, limitation};
///
/// let input = Observable::new(4);
/// let even = filter(&input, vec![limitation(|v: &i32| v % 2 == 0)]);
/// input.set(7);
/// assert_eq!(even.current(), Some(4));
/// input.set(8);
/// assert_eq!(even.current(), Some(8));
/// ```
pub fn filter<R, T>(source: &R, limitations: Vec<Limitation<T>>) -> Filtered<T>
where
    R: Readable<Value = T>,
    T: Clone + PartialEq + 'static,
{
    Filtered::new(source, limitations)
}

impl<T: Clone + PartialEq + 'static> Filtered<T> {
    /// Seed from the source's current value, then follow its changes.
    pub fn new<R>(source: &R, limitations: Vec<Limitation<T>>) -> Self
    where
        R: Readable<Value = T>,
    {
        let seed = source.current();
        let cell: Observable<Option<T>> = Observable::new(None);
        if accepts(&limitations, &seed, &cell) {
            cell.set(Some(seed));
        }

        let target = cell.clone();
        let upstream = source.on_change_boxed(Rc::new(move |value: &T| {
            if accepts(&limitations, value, &target) {
                target.set(Some(value.clone()));
            } else {
                tracing::trace!(target: "cellflow::filter", "rejected");
            }
        }));

        Self {
            view: ReadOnly::new(cell),
            upstream,
        }
    }

    /// Stop following the source. The last accepted value is kept.
    pub fn detach(&self) {
        self.upstream.unsubscribe();
    }
}

impl<T: Clone + PartialEq + 'static> Readable for Filtered<T> {
    type Value = Option<T>;

    fn current(&self) -> Option<T> {
        self.view.current()
    }

    fn subscribe_boxed(&self, callback: Callback<Option<T>>) -> Subscription {
        self.view.subscribe_boxed(callback)
    }

    fn on_change_boxed(&self, callback: Callback<Option<T>>) -> Subscription {
        self.view.on_change_boxed(callback)
    }
}
