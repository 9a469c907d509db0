//! Quantisation of wall-clock time into days, epochs and units.
//!
//! Keys rotate per epoch, identifiers rotate per unit, and the day-chain ratchets per day.  A
//! [`Time`] names one epoch; it remembers which unit it was built from, but that unit plays no
//! part in equality, ordering or hashing.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::util::check_overflow;
use crate::Error;

/// Seconds since the Unix epoch
pub type Timestamp = u64;

/// Length of a day, in seconds
pub const T_DAY: u64 = 24 * 60 * 60;
/// Length of an epoch, in seconds
pub const T_EPOCH: u64 = 60 * 60;
/// Length of a unit, in seconds
pub const T_UNIT: u64 = 5 * 60;
/// Units in each epoch
pub const UNITS_IN_EPOCH: u64 = T_EPOCH / T_UNIT;
/// Epochs in each day
pub const EPOCHS_IN_DAY: u8 = 24;
/// How far either side of a contact's receive time the matcher looks for the sender's unit
pub const JITTER_THRESHOLD: u64 = 10 * 60;
/// Width of the rolling window that contact intake is rate-limited over
pub const T_WINDOW: u64 = 5 * 60;
/// Most contacts accepted in any one rolling window
pub const MAX_CONTACTS_IN_WINDOW: usize = 1000;

/// The first second of `day`
///
/// # Errors
///
/// Fails with [`Error::EncodingOverflow`] if the result doesn't fit a [`Timestamp`].
pub fn day_to_second(day: u64) -> Result<Timestamp, Error> {
    check_overflow(
        day.overflowing_mul(T_DAY),
        &format!("day {day} is too far in the future to express in seconds"),
    )
}

/// A (day, epoch) pair, optionally carrying the unit it was quantised from
#[derive(Clone, Copy, Debug)]
pub struct Time {
    /// Days since the Unix epoch
    day: u64,
    /// Epoch within `day`, always less than [`EPOCHS_IN_DAY`]
    epoch: u8,
    /// Unit within `epoch`; zero when built from a bare (day, epoch)
    unit: u8,
}

/// Hashable identity of a single unit, used to key the matcher's cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    /// Days since the Unix epoch
    pub day: u64,
    /// Epoch within the day
    pub epoch: u8,
    /// Unit within the epoch
    pub unit: u8,
}

impl Time {
    /// Quantise an absolute timestamp
    #[allow(clippy::cast_possible_truncation)] // epoch and unit are both bounded well below 256
    pub fn from_timestamp(ts: Timestamp) -> Self {
        let in_day = ts % T_DAY;

        Time {
            day: ts / T_DAY,
            epoch: (in_day / T_EPOCH) as u8,
            unit: ((in_day % T_EPOCH) / T_UNIT) as u8,
        }
    }

    /// Name an epoch directly, for key derivation
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidEpoch`] if `epoch` is not less than [`EPOCHS_IN_DAY`].
    pub fn from_day_epoch(day: u64, epoch: u8) -> Result<Self, Error> {
        if epoch >= EPOCHS_IN_DAY {
            return Err(Error::InvalidEpoch {
                epoch,
                limit: EPOCHS_IN_DAY,
            });
        }

        Ok(Time {
            day,
            epoch,
            unit: 0,
        })
    }

    /// Days since the Unix epoch
    pub fn day(&self) -> u64 {
        self.day
    }

    /// Epoch within the day
    pub fn epoch(&self) -> u8 {
        self.epoch
    }

    /// Unit within the epoch
    pub fn units(&self) -> u8 {
        self.unit
    }

    /// The epoch immediately after this one, rolling over into the next day after the last
    pub fn next(&self) -> Self {
        match self.epoch.checked_add(1).filter(|e| *e < EPOCHS_IN_DAY) {
            Some(epoch) => Time {
                day: self.day,
                epoch,
                unit: 0,
            },
            None => Time {
                day: self.day.saturating_add(1),
                epoch: 0,
                unit: 0,
            },
        }
    }

    /// Cache identity including the unit
    pub fn unit_key(&self) -> UnitKey {
        UnitKey {
            day: self.day,
            epoch: self.epoch,
            unit: self.unit,
        }
    }

    /// The first second of this time's unit
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EncodingOverflow`] if the day is too large to express in seconds.
    pub fn to_timestamp(&self) -> Result<Timestamp, Error> {
        let offset = u64::from(self.epoch) * T_EPOCH + u64::from(self.unit) * T_UNIT;

        check_overflow(
            day_to_second(self.day)?.overflowing_add(offset),
            &format!("day {} is too far in the future to express in seconds", self.day),
        )
    }

    /// Position of the epoch on a single absolute scale
    fn ordinal(&self) -> u128 {
        u128::from(self.day) * u128::from(EPOCHS_IN_DAY) + u128::from(self.epoch)
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.day == other.day && self.epoch == other.epoch
    }
}

impl Eq for Time {}

impl Hash for Time {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.day.hash(state);
        self.epoch.hash(state);
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}
