//! Support for structured logging.
//!
//! The kernel logs through the [`tracing`] crate. Each lifecycle call of an
//! actor is wrapped in a span with the following metadata:
//!
//! - name: `actor`,
//! - target: `moccasin`,
//! - verbosity level: [`Level::TRACE`](tracing::Level::TRACE),
//! - a field called `name`, set to the name given to the actor in
//!   [`CompositeActor::add_actor`](crate::composite::CompositeActor::add_actor),
//!   and a field called `phase` naming the lifecycle call.
//!
//! Directors emit `debug` events when they compute a schedule, advance their
//! tag or grow a process-network queue, and the manager emits `info` events
//! when a run starts and ends.
//!
//! Events emitted by actors can be filtered with the usual `RUST_LOG`
//! directives of `tracing-subscriber`, for instance:
//!
//! ```text
//! $ RUST_LOG="warn,moccasin=debug,[actor{name=sink}]=trace" cargo test
//! ```
//!
//! With the `tracing-timer` feature, the [`ModelTime`] timer can stamp events
//! emitted from within an actor with the current model time.

use std::cell::Cell;

use crate::time::SuperdenseTime;

thread_local! {
    static MODEL_TIME: Cell<Option<SuperdenseTime>> = const { Cell::new(None) };
}

/// Returns the tag of the actor call in progress on this thread, if any.
pub fn current_model_time() -> Option<SuperdenseTime> {
    MODEL_TIME.get()
}

/// Publishes the tag of an actor call to the current thread until dropped.
pub(crate) struct ModelTimeGuard {
    previous: Option<SuperdenseTime>,
}

impl ModelTimeGuard {
    pub(crate) fn enter(tag: SuperdenseTime) -> Self {
        Self {
            previous: MODEL_TIME.replace(Some(tag)),
        }
    }
}

impl Drop for ModelTimeGuard {
    fn drop(&mut self) {
        MODEL_TIME.set(self.previous);
    }
}

#[cfg(feature = "tracing-timer")]
pub use timer::ModelTime;

#[cfg(feature = "tracing-timer")]
mod timer {
    use std::fmt;

    use tracing_subscriber::fmt::format::Writer;
    use tracing_subscriber::fmt::time::{FormatTime, SystemTime};

    use super::MODEL_TIME;

    /// A timer for the [`tracing-subscriber`][tracing_subscriber] crate that
    /// stamps events emitted by actors with model time.
    ///
    /// Events emitted outside of actors are stamped by the fallback timer.
    ///
    /// ```
    /// use moccasin::logging::ModelTime;
    ///
    /// tracing_subscriber::fmt()
    ///     .with_timer(ModelTime::with_system_timer())
    ///     .init();
    /// ```
    #[derive(Default, Debug)]
    pub struct ModelTime<T> {
        fallback: T,
    }

    impl ModelTime<SystemTime> {
        /// Creates a timer which falls back to the [`SystemTime`] timer.
        pub fn with_system_timer() -> Self {
            Self::default()
        }
    }

    impl<T: FormatTime> ModelTime<T> {
        /// Creates a timer which falls back to the provided timer.
        pub fn with_custom_timer(fallback: T) -> Self {
            Self { fallback }
        }
    }

    impl<T: FormatTime> FormatTime for ModelTime<T> {
        fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
            match MODEL_TIME.get() {
                Some(tag) => write!(w, "[{tag}]"),
                None => self.fallback.format_time(w),
            }
        }
    }
}
