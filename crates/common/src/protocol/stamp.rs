use std::{
    fmt::{self, Debug, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

const EPOCH_SHIFT: u32 = 32;
const COUNTER_MASK: u64 = 0xffff_ffff;

/// A stamp packs the leader epoch into the high 32 bits and the counter
/// within that epoch into the low 32 bits. Every record committed by the
/// pipeline gets one, and the version of a membership config is the stamp
/// (floored by the reconfig version rule) of the record that committed it.
///
/// On the wire a stamp is rendered as lowercase hex without leading zeros,
/// e.g. epoch 1 counter 2 is `100000002`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp(u64);

/// Version of a `MembershipConfig`.
pub type Version = Stamp;

impl Stamp {
    pub const ZERO: Stamp = Stamp(0);

    #[inline]
    pub const fn new(epoch: u32, counter: u32) -> Self {
        Stamp(((epoch as u64) << EPOCH_SHIFT) | counter as u64)
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn epoch(&self) -> u32 {
        (self.0 >> EPOCH_SHIFT) as u32
    }

    #[inline]
    pub const fn counter(&self) -> u32 {
        (self.0 & COUNTER_MASK) as u32
    }

    /// First stamp of the next leader epoch, the counter restarts from 0.
    #[inline]
    pub fn next_epoch(&self) -> Self {
        Stamp::new(self.epoch().saturating_add(1), 0)
    }

    /// Next stamp in the same epoch.
    #[inline]
    pub fn next_counter(&self) -> Self {
        Stamp::new(self.epoch(), self.counter().saturating_add(1))
    }

    /// Parse the version argument of a reconfig, `-1` is the wildcard
    /// and means "accept any current version".
    pub fn parse_expected(version: &str) -> Result<Option<Self>> {
        let version = version.trim();
        if version.is_empty() || version == "-1" {
            return Ok(None);
        }
        version.parse::<Stamp>().map(Some)
    }
}

impl Display for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl Debug for Stamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}({}.{})", self.0, self.epoch(), self.counter())
    }
}

impl FromStr for Stamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16)
            .map(Stamp)
            .map_err(|_| Error::bad_arguments(format!("invalid version {:?}", s)))
    }
}
