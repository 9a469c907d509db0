#![doc = include_str!("../README.md")]
#[cfg(doctest)]
pub struct ReadmeDoctests;

mod ciphersuite;
mod contact;
mod ephid;
mod error;
mod keys;
mod matching;
mod server;
mod time;
mod user;
mod util;

#[doc(inline)]
pub use {
    contact::{Contact, Match, Rssi},
    ephid::{EphemeralId, Geotag, Proof, EPHID_LEN, GEOTAG_LEN, PROOF_LEN},
    error::Error,
    keys::{
        BundleIdentity, DayKey, EpochKey, IdentityKeys, Key, MasterKey, PreEpochKey,
        UserKeyBundle, KEY_LEN,
    },
    server::{AggregationServer, PublishedKeys, StoredEpoch},
    time::{
        day_to_second, Time, Timestamp, UnitKey, EPOCHS_IN_DAY, JITTER_THRESHOLD,
        MAX_CONTACTS_IN_WINDOW, T_DAY, T_EPOCH, T_UNIT, T_WINDOW, UNITS_IN_EPOCH,
    },
    user::UserAgent,
};

pub mod aes128v1;

mod hash;
mod kbkdf;
mod prf;

#[cfg(feature = "serde")]
mod serde;

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

// Tells unused_crate_dependencies to STFU about the "unused dev dependency"
#[cfg(test)]
use criterion as _;
#[cfg(all(test, not(feature = "serde")))]
use serde_json as _;
