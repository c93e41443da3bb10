//! Injected sources of time and randomness.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of fallback file-name stems.
pub trait StemSource: Send + Sync {
    /// Returns a six-digit number in `100000..=999999`.
    fn next_stem(&self) -> u32;
}

/// Uniformly random six-digit stems.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStem;

impl StemSource for RandomStem {
    fn next_stem(&self) -> u32 {
        rand::thread_rng().gen_range(100_000..=999_999)
    }
}
