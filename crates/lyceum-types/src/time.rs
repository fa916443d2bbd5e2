use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Chain time: whole seconds since the Unix epoch, as agreed by consensus.
///
/// Block timestamps, expirations, and activity-window bounds are all
/// `ChainTime` values. The chain never reads the wall clock on the apply
/// path; time only advances when a block does.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChainTime(u32);

impl ChainTime {
    /// The epoch (all-zero) instant.
    pub const ZERO: ChainTime = ChainTime(0);

    /// The maximum representable instant. Activity windows are parked here
    /// once permanently closed so no time-range scan matches them again.
    pub const MAX: ChainTime = ChainTime(u32::MAX);

    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn secs(self) -> u32 {
        self.0
    }

    /// Seconds from `earlier` to `self`, zero if `earlier` is later.
    pub fn secs_since(self, earlier: ChainTime) -> u32 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_add(self, secs: u32) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl Add<u32> for ChainTime {
    type Output = ChainTime;

    fn add(self, secs: u32) -> ChainTime {
        ChainTime(self.0 + secs)
    }
}

impl Sub<u32> for ChainTime {
    type Output = ChainTime;

    fn sub(self, secs: u32) -> ChainTime {
        ChainTime(self.0 - secs)
    }
}

impl fmt::Debug for ChainTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainTime({})", self.0)
    }
}

impl fmt::Display for ChainTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl From<u32> for ChainTime {
    fn from(secs: u32) -> Self {
        Self(secs)
    }
}
