#![forbid(unsafe_code)]

//! Read-only views over any [`Readable`].
//!
//! A [`ReadOnly<T>`] forwards `current`, `subscribe` and `on_change` to the
//! wrapped value. Nothing is copied: the view and its source stay linked for
//! as long as the view exists, and `set` is simply not reachable through it.

use std::fmt;
use std::rc::Rc;

use crate::observable::{Callback, Readable, Subscription};

/// A type-erased, read-only handle to a reactive value.
pub struct ReadOnly<T> {
    source: Rc<dyn Readable<Value = T>>,
}

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnly")
            .field("current", &self.source.current())
            .finish()
    }
}

impl<T: Clone + 'static> ReadOnly<T> {
    /// Wrap `source` in a read-only view.
    pub fn new<R>(source: R) -> Self
    where
        R: Readable<Value = T> + 'static,
    {
        Self {
            source: Rc::new(source),
        }
    }
}

/// Strip mutation capability from `source`.
///
/// ```
/// use cellflow::{Observable, Readable, readonly};
///
/// let cell = Observable::new(1);
/// let view = readonly(cell.clone());
/// cell.set(2);
/// assert_eq!(view.current(), 2);
/// ```
pub fn readonly<R>(source: R) -> ReadOnly<R::Value>
where
    R: Readable + 'static,
{
    ReadOnly::new(source)
}

impl<T: Clone + 'static> Readable for ReadOnly<T> {
    type Value = T;

    fn current(&self) -> T {
        self.source.current()
    }

    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        self.source.subscribe_boxed(callback)
    }

    fn on_change_boxed(&self, callback: Callback<T>) -> Subscription {
        self.source.on_change_boxed(callback)
    }
}
