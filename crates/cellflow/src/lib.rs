#![forbid(unsafe_code)]

//! Lazy, push-based reactive values.
//!
//! This crate provides change-tracking primitives built on one contract,
//! [`Readable`]:
//!
//! - [`Observable`]: a shared, version-tracked mutable cell with change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: explicit unsubscribe handle, idempotent.
//! - [`Derived`]: a lazily recomputed value derived from one or more
//!   readables.
//! - [`ReadOnly`]: a view that strips `set` from any readable.
//! - [`Filtered`]: a mirror of a source that only accepts values passing a
//!   list of [`Limitation`]s, including [`debounce`].
//! - [`Task`] and [`unwrap_task`]: asynchronous computations reported as
//!   [`Unwrapped`] status records, with [`fulfilled`], [`pending`] and
//!   [`rejected`] projections.
//! - [`EventSource`]: the latest event of an [`EventTarget`].
//!
//! # Architecture
//!
//! All state lives behind `Rc`, so handles are cheap to clone and `!Send`.
//! A cell's `set` fans out over a copy of its observer list taken when the
//! change lands. The cell is not borrowed during that fan-out, so a callback
//! may write to any cell, this one included, or unsubscribe anyone.
//! Timers and task awaits are the only work that happens later; they run as
//! `spawn_local` tasks on the caller's tokio `LocalSet` (feature `async`).
//!
//! A `Derived<T>` never pushes values through its dependencies. They only
//! raise its dirty flag, and its subscribers hang off that flag and pull the
//! fresh value when it rises. A derived value is owned by its handles and
//! its subscriptions; dependencies hold it weakly.
//!
//! # Invariants
//!
//! 1. An observer stays registered until its `Subscription::unsubscribe`
//!    runs. Dropping the handle alone does not remove it, though a `Derived`
//!    left with no handles and no subscriptions is freed along with its
//!    observers.
//! 2. One fan-out calls each observer in the copied list exactly once, in
//!    registration order.
//! 3. Writing a value equal to the stored one changes nothing: no version
//!    bump, no fan-out.
//! 4. `subscribe` hands over the current value before it returns;
//!    `on_change` waits for the next change.
//! 5. Reading a `Derived` after a dependency changed runs its function
//!    again; reading it twice without a change runs it once.
//! 6. No batching: two writes in one turn may reach a subscriber twice.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use cellflow::{Observable, Readable, derive_all};
//!
//! let a = Observable::new(1);
//! let b = Observable::new(2);
//! let c = Observable::new(3);
//! let sum = derive_all((a, b, c.clone()), |(a, b, c)| a + b + c);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let _sub = sum.subscribe(move |v| sink.borrow_mut().push(*v));
//!
//! c.set(6);
//! assert_eq!(*seen.borrow(), vec![6, 9]);
//! ```

pub mod derived;
pub mod error;
pub mod event;
pub mod ext;
pub mod filter;
pub mod observable;
pub mod view;

#[cfg(feature = "async")]
pub mod debounce;
#[cfg(feature = "async")]
pub mod task;

pub use derived::{Derived, Sources, derive, derive_all};
pub use error::Rejection;
pub use event::{Dispatcher, EventSource, EventTarget, Listener, from_event};
pub use ext::ReadableExt;
pub use filter::{Filtered, Limitation, filter, limitation};
pub use observable::{Callback, Observable, Readable, Subscription, WeakObservable};
pub use view::{ReadOnly, readonly};

#[cfg(feature = "async")]
pub use debounce::debounce;
#[cfg(feature = "async")]
pub use task::{Task, Unwrapped, fulfilled, pending, rejected, unwrap_task};
