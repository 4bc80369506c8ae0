//! Error handling for the crate's single fallible entry point.
//!
//! Everything on the timing-critical path (`send_frame`, `tick`, `request`,
//! the dispatcher) keeps its original infallible signature — a `bool`, a
//! `u32`, or a status enum — because a `Result` there would just be
//! unwrapped or ignored by every caller. Construction is the one place a
//! typed error earns its keep.

use thiserror::Error;

/// Failure constructing a [`crate::Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Reserved for a future validated-callback table; not yet
    /// constructible by any code path in this crate.
    #[error("callback rejected by validation")]
    InvalidCallback,
    /// The supplied [`crate::Clock`] reported a `now_micros()` that went
    /// backwards between the two startup samples `Link::new` takes to
    /// sanity-check it.
    #[error("clock is not monotonic")]
    ClockNotMonotonic,
}

pub type LinkResult<T> = Result<T, LinkError>;
