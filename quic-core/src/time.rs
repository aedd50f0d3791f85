// SPDX-License-Identifier: Apache-2.0

//! Defines time-related datatypes usable without the standard library.

use core::{fmt, num::NonZeroU64, ops, time::Duration};

/// An absolute point in time, opaque outside of a single clock's readings.
///
/// `Timestamp`s are comparable only when sourced from the same clock. This
/// mirrors `std::time::Instant` but stays representable without `std`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub struct Timestamp(NonZeroU64);

const ONE_MICROSECOND: NonZeroU64 = match NonZeroU64::new(1) {
    Some(v) => v,
    None => unreachable!(),
};

impl Timestamp {
    /// Constructs a `Timestamp` from a `Duration` since an arbitrary epoch.
    ///
    /// The duration is stored in microseconds and is rounded up to at least
    /// one microsecond so the internal representation can stay non-zero.
    pub fn from_duration(duration: Duration) -> Self {
        let micros = duration.as_micros().max(1).min(u64::MAX as u128) as u64;
        Timestamp(NonZeroU64::new(micros).unwrap_or(ONE_MICROSECOND))
    }

    /// Returns the `Duration` since the epoch this timestamp was constructed from.
    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0.get() - 1)
    }

    /// Returns `Some(timestamp)` if `self + duration` is representable.
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let micros = duration.as_micros();
        let micros: u64 = micros.try_into().ok()?;
        self.0.get().checked_add(micros).map(|v| {
            Timestamp(NonZeroU64::new(v).expect("sum of two positive values is positive"))
        })
    }

    /// Returns the elapsed `Duration` between an earlier and later timestamp,
    /// clamped to zero if `earlier` is actually later than `self`.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        self.as_duration()
            .checked_sub(earlier.as_duration())
            .unwrap_or(Duration::ZERO)
    }
}

impl ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        self.checked_add(rhs)
            .expect("timestamp overflow; durations in this crate should stay bounded")
    }
}

impl ops::Sub<Timestamp> for Timestamp {
    type Output = Duration;

    /// Panics if `rhs` is later than `self`; use [`Timestamp::saturating_duration_since`]
    /// when the ordering is not already known to be correct.
    fn sub(self, rhs: Timestamp) -> Duration {
        self.as_duration()
            .checked_sub(rhs.as_duration())
            .expect("subtracting a later timestamp from an earlier one")
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({:?})", self.as_duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_duration() {
        let d = Duration::from_millis(1234);
        let t = Timestamp::from_duration(d);
        assert_eq!(t.as_duration(), d);
    }

    #[test]
    fn add_and_sub_agree() {
        let t0 = Timestamp::from_duration(Duration::from_millis(100));
        let t1 = t0 + Duration::from_millis(50);
        assert_eq!(t1 - t0, Duration::from_millis(50));
    }

    #[test]
    fn saturating_duration_since_clamps() {
        let t0 = Timestamp::from_duration(Duration::from_millis(100));
        let t1 = Timestamp::from_duration(Duration::from_millis(50));
        assert_eq!(t1.saturating_duration_since(t0), Duration::ZERO);
    }
}
