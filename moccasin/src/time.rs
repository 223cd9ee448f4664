//! Model time.
//!
//! This module provides most notably:
//!
//! * [`MonotonicTime`]: a monotonic timestamp based on the [TAI] time standard
//!   with nanosecond resolution, used as the real-valued part of model time,
//! * [`SuperdenseTime`]: a timestamp complemented by a microstep, which
//!   totally orders simultaneous events,
//! * [`Clock`]: a trait for types that can throttle a run to the wall clock,
//!   implemented for instance by [`SystemClock`] and [`AutoSystemClock`].
//!
//! [TAI]: https://en.wikipedia.org/wiki/International_Atomic_Time
//!
//! # Examples
//!
//! Tags at the same timestamp are ordered by their microstep:
//!
//! ```
//! use std::time::Duration;
//! use moccasin::time::{MonotonicTime, SuperdenseTime};
//!
//! let t = MonotonicTime::EPOCH + Duration::from_secs(5);
//! let a = SuperdenseTime::new(t, 0);
//! let b = a.checked_next_microstep().unwrap();
//! let c = SuperdenseTime::at(t + Duration::from_secs(2));
//!
//! assert!(a < b && b < c);
//! assert_eq!(b.microstep(), 1);
//! ```

mod clock;

use std::fmt;

pub use tai_time::MonotonicTime;

pub use clock::{AutoSystemClock, Clock, NoClock, SyncStatus, SystemClock};

/// A superdense time tag.
///
/// Tags are ordered lexicographically: first by timestamp, then by
/// microstep. The microstep distinguishes causally related events that occur
/// at the same timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SuperdenseTime {
    timestamp: MonotonicTime,
    microstep: u32,
}

impl SuperdenseTime {
    /// The tag at the epoch with microstep zero.
    pub const EPOCH: Self = Self {
        timestamp: MonotonicTime::EPOCH,
        microstep: 0,
    };

    /// Creates a tag from a timestamp and a microstep.
    pub const fn new(timestamp: MonotonicTime, microstep: u32) -> Self {
        Self {
            timestamp,
            microstep,
        }
    }

    /// Creates a tag with microstep zero.
    pub const fn at(timestamp: MonotonicTime) -> Self {
        Self::new(timestamp, 0)
    }

    /// Returns the timestamp.
    pub fn timestamp(&self) -> MonotonicTime {
        self.timestamp
    }

    /// Returns the microstep.
    pub fn microstep(&self) -> u32 {
        self.microstep
    }

    /// Returns the tag at the same timestamp and the next microstep, or
    /// `None` if the microstep would overflow.
    ///
    /// An overflow can only result from a zero-delay loop firing
    /// indefinitely.
    pub fn checked_next_microstep(&self) -> Option<Self> {
        let microstep = self.microstep.checked_add(1)?;

        Some(Self::new(self.timestamp, microstep))
    }
}

impl From<MonotonicTime> for SuperdenseTime {
    fn from(timestamp: MonotonicTime) -> Self {
        Self::at(timestamp)
    }
}

impl fmt::Display for SuperdenseTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}.{:09}s, {})",
            self.timestamp.as_secs(),
            self.timestamp.subsec_nanos(),
            self.microstep
        )
    }
}
