#![forbid(unsafe_code)]

//! Trailing-edge debounce as a [`Limitation`].
//!
//! The limitation returned by [`debounce`] rejects every candidate, so the
//! filtered value never updates synchronously. Instead each call aborts the
//! previously scheduled write and spawns a new local task that writes the
//! latest candidate into the filtered value once `duration` has passed with
//! no newer candidate.
//!
//! The timer runs on the current tokio [`LocalSet`](tokio::task::LocalSet);
//! calling the limitation outside one panics. The deadline is taken when the
//! candidate arrives, not when the task is first polled.
//!
//! Unsubscribing from the filtered value does not cancel a pending write.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::filter::Limitation;
use crate::observable::Observable;

/// Create a debounce limitation with the given quiet window.
///
/// Every filtered value built with it gets its own pending timer only if each
/// gets its own limitation; share one instance and they share the timer.
pub fn debounce<T>(duration: Duration) -> Limitation<T>
where
    T: Clone + PartialEq + 'static,
{
    let pending: RefCell<Option<JoinHandle<()>>> = RefCell::new(None);
    Rc::new(move |value: &T, target: &Observable<Option<T>>| {
        if let Some(previous) = pending.borrow_mut().take() {
            previous.abort();
        }

        let deadline = Instant::now() + duration;
        let value = value.clone();
        let target = target.clone();
        tracing::debug!(
            target: "cellflow::debounce",
            delay = ?duration,
            "schedule"
        );
        let handle = tokio::task::spawn_local(async move {
            sleep_until(deadline).await;
            tracing::debug!(target: "cellflow::debounce", "fire");
            target.set(Some(value));
        });
        *pending.borrow_mut() = Some(handle);
        false
    })
}
