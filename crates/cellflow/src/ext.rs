#![forbid(unsafe_code)]

//! Method-style combinators for every [`Readable`].

use crate::derived::{Derived, derive};
use crate::filter::{Filtered, Limitation, filter};
use crate::observable::Readable;
use crate::view::{ReadOnly, readonly};

/// Chaining helpers, implemented for all cloneable readables.
///
/// ```
/// use cellflow::{Observable, Readable, ReadableExt, limitation};
///
/// let celsius = Observable::new(20.0_f64);
/// let fahrenheit = celsius.map(|c| c * 9.0 / 5.0 + 32.0);
/// let warm = celsius.filtered(vec![limitation(|c: &f64| *c > 25.0)]);
///
/// celsius.set(30.0);
/// assert_eq!(fahrenheit.current(), 86.0);
/// assert_eq!(warm.current(), Some(30.0));
/// ```
pub trait ReadableExt: Readable + Clone + Sized + 'static {
    /// Derive a value from this one.
    fn map<U>(&self, f: impl Fn(&Self::Value) -> U + 'static) -> Derived<U>
    where
        U: Clone + PartialEq + 'static,
    {
        derive(self, f)
    }

    /// Mirror this value through `limitations`.
    fn filtered(&self, limitations: Vec<Limitation<Self::Value>>) -> Filtered<Self::Value>
    where
        Self::Value: PartialEq,
    {
        filter(self, limitations)
    }

    /// A read-only view of this value.
    fn read_only(&self) -> ReadOnly<Self::Value> {
        readonly(self.clone())
    }
}

impl<R: Readable + Clone + 'static> ReadableExt for R {}
