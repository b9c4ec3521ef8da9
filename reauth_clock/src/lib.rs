//! Utilities for messing with time
//!
//! Credentials and session tickets are stamped with absolute expiry times in
//! milliseconds since the Unix epoch. The types here allow those stamps to be
//! compared against a [`Clock`], which can be swapped for a [`TestClock`] to
//! pin or advance time deterministically.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::{
    ops,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Unix time in milliseconds
///
/// Represented by the number of milliseconds elapsed since the beginning of
/// the Unix epoch on 1970/01/01 at 00:00:00 UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct UnixMillis(pub u64);

impl UnixMillis {
    /// The epoch itself
    pub const EPOCH: Self = Self(0);

    /// Constructs a time from whole seconds since the epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// The number of milliseconds since the epoch
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns the time elapsed from `earlier` until `self`, or zero if
    /// `earlier` is in the future
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl From<SystemTime> for UnixMillis {
    #[inline]
    fn from(t: SystemTime) -> Self {
        // Times before the epoch collapse onto it.
        let millis = t
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();

        UnixMillis(millis)
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl ops::Add<Duration> for UnixMillis {
    type Output = UnixMillis;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        UnixMillis(self.0.saturating_add(duration_millis(rhs)))
    }
}

impl ops::AddAssign<Duration> for UnixMillis {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl ops::Sub<Duration> for UnixMillis {
    type Output = UnixMillis;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        UnixMillis(self.0.saturating_sub(duration_millis(rhs)))
    }
}

impl ops::Sub for UnixMillis {
    type Output = Duration;

    /// Saturates to zero when `rhs` is later than `self`
    #[inline]
    fn sub(self, rhs: UnixMillis) -> Self::Output {
        self.saturating_duration_since(rhs)
    }
}

#[cfg(any(feature = "serde", doc))]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl Serialize for UnixMillis {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(any(feature = "serde", doc))]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl<'de> Deserialize<'de> for UnixMillis {
    #[inline]
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Self(ms))
    }
}

/// Represents a clock, which can tell the current time
pub trait Clock {
    /// Gets the current time according to this clock
    fn now(&self) -> UnixMillis;
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now(&self) -> UnixMillis {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now(&self) -> UnixMillis {
        (**self).now()
    }
}

/// The system clock as provided by `std::time::SystemTime`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    #[inline]
    fn now(&self) -> UnixMillis {
        UnixMillis::from(SystemTime::now())
    }
}

/// A test clock which maintains the current time as shared internal state
///
/// Clones observe the same time, so a clone handed to the component under
/// test can be advanced from the test body.
#[derive(Clone, Debug, Default)]
pub struct TestClock(Arc<AtomicU64>);

impl Clock for TestClock {
    #[inline]
    fn now(&self) -> UnixMillis {
        UnixMillis(self.0.load(Ordering::Acquire))
    }
}

impl TestClock {
    /// Creates a new test clock with the specified time
    pub fn new(time: UnixMillis) -> Self {
        Self(Arc::new(AtomicU64::new(time.0)))
    }

    /// Updates the clock's current time to `val`
    pub fn set(&self, val: UnixMillis) {
        self.0.store(val.0, Ordering::Release);
    }

    /// Advances the clock's current time by `inc`
    pub fn advance(&self, inc: Duration) {
        self.0.fetch_add(duration_millis(inc), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_saturates() {
        let t = UnixMillis(1_500);
        assert_eq!(t - Duration::from_secs(2), UnixMillis::EPOCH);
        assert_eq!(t + Duration::from_millis(500), UnixMillis::from_secs(2));
        assert_eq!(UnixMillis(1_000) - t, Duration::ZERO);
        assert_eq!(t - UnixMillis(1_000), Duration::from_millis(500));
    }

    #[test]
    fn test_clock_clones_share_time() {
        let clock = TestClock::new(UnixMillis::from_secs(10));
        let observer = clock.clone();

        clock.advance(Duration::from_secs(5));
        assert_eq!(observer.now(), UnixMillis::from_secs(15));

        observer.set(UnixMillis(42));
        assert_eq!(clock.now(), UnixMillis(42));
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(System.now() > UnixMillis::from_secs(1_600_000_000));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&UnixMillis(1234)).unwrap();
        assert_eq!(json, "1234");
        let back: UnixMillis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UnixMillis(1234));
    }
}
