//! Conversion between stored 64-bit datetimes and wall-clock timestamps.
//!
//! Entry headers carry a count of 100 ns ticks since a fixed anchor. The
//! conversion bakes in a five-hour zone adjustment that every existing file
//! depends on, so it is kept exactly.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Tick count stored for the conversion anchor.
pub const DATETIME_EPOCH: u64 = 0x007c_9567_4beb_4000;
/// Stored ticks per second (100 ns resolution).
pub const TICKS_PER_SECOND: i64 = 10_000_000;
/// Fixed zone adjustment added when decoding, in seconds.
pub const ZONE_ADJUSTMENT_SECS: i64 = 18_000;

const TICKS_PER_MICRO: i64 = 10;

/// Whole seconds plus microsecond fraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub micros: u32,
}

impl Timestamp {
    #[must_use]
    pub const fn new(seconds: i64, micros: u32) -> Self {
        Self { seconds, micros }
    }

    /// Decode a raw stored datetime.
    #[must_use]
    pub fn from_ticks(ticks: u64) -> Self {
        let delta = ticks.wrapping_sub(DATETIME_EPOCH) as i64;
        let seconds = delta.div_euclid(TICKS_PER_SECOND) + ZONE_ADJUSTMENT_SECS;
        let micros = (delta.rem_euclid(TICKS_PER_SECOND) / TICKS_PER_MICRO) as u32;
        Self { seconds, micros }
    }

    /// Encode as a raw stored datetime; inverse of [`Timestamp::from_ticks`].
    #[must_use]
    pub fn to_ticks(self) -> u64 {
        let delta = (self.seconds - ZONE_ADJUSTMENT_SECS)
            .wrapping_mul(TICKS_PER_SECOND)
            .wrapping_add(i64::from(self.micros) * TICKS_PER_MICRO);
        DATETIME_EPOCH.wrapping_add(delta as u64)
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => Self {
                seconds: elapsed.as_secs() as i64,
                micros: elapsed.subsec_micros(),
            },
            Err(before) => {
                let behind = before.duration();
                Self {
                    seconds: -(behind.as_secs() as i64),
                    micros: 0,
                }
            }
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.seconds, self.micros)
    }
}
