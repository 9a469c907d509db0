//! The aggregation server: takes in diagnosed users' key bundles and republishes them.
//!
//! Stored entries are kept sorted by epoch value within each (day, epoch) bucket.  Epoch values
//! are pseudo-random, so this order says nothing about which bundle arrived when.
//!
//! All mutation goes through `&mut self`; a host that shares a server between threads has to wrap
//! it in a lock, which also keeps each insert-and-sort atomic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use zeroize::Zeroizing;

use crate::ciphersuite::CipherSuite;
use crate::ephid::Proof;
use crate::keys::{
    day_commitment, day_verification_key, epoch_value, epoch_verification,
    identity_commitment_key, Key, UserKeyBundle,
};
use crate::prf::Block;
use crate::time::Time;
use crate::Error;

/// The published feed: day → epoch → epoch values
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PublishedKeys {
    /// Epoch values by day, then epoch
    days: BTreeMap<u64, BTreeMap<u8, Vec<Key>>>,
}

impl PublishedKeys {
    /// The epoch values published for one (day, epoch), in published order
    pub fn get(&self, day: u64, epoch: u8) -> &[Key] {
        self.days
            .get(&day)
            .and_then(|epochs| epochs.get(&epoch))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Append an epoch value to a bucket
    pub fn insert(&mut self, day: u64, epoch: u8, value: Key) {
        self.days
            .entry(day)
            .or_default()
            .entry(epoch)
            .or_default()
            .push(value);
    }

    /// Every non-empty bucket, in (day, epoch) order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u8, &[Key])> + '_ {
        self.days.iter().flat_map(|(day, epochs)| {
            epochs
                .iter()
                .map(move |(epoch, values)| (*day, *epoch, values.as_slice()))
        })
    }

    /// Whether nothing at all is published
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// One stored disclosure
#[derive(Clone, PartialEq, Eq)]
pub struct StoredEpoch {
    /// The published epoch value
    pub epoch: Key,
    /// The epoch verification block, never published
    pub verification: Block,
}

impl fmt::Debug for StoredEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredEpoch")
            .field("epoch", &self.epoch)
            .field("verification", &"**REDACTED**")
            .finish()
    }
}

/// Collects, stores and republishes diagnosed users' keys
pub struct AggregationServer<S: CipherSuite> {
    /// day → epoch → entries sorted by epoch value
    epochs: BTreeMap<u64, BTreeMap<u8, Vec<StoredEpoch>>>,
    /// Ciphersuite marker
    _suite: PhantomData<S>,
}

impl<S: CipherSuite> Default for AggregationServer<S> {
    fn default() -> Self {
        AggregationServer {
            epochs: BTreeMap::new(),
            _suite: PhantomData,
        }
    }
}

impl<S: CipherSuite> fmt::Debug for AggregationServer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationServer")
            .field("days", &self.epochs.len())
            .finish()
    }
}

impl<S: CipherSuite> AggregationServer<S> {
    /// An empty server
    pub fn new() -> Self {
        Self::default()
    }

    /// Take in a diagnosed user's keys
    ///
    /// The bundle's user id and identity key are consumed and zeroed before any epoch is
    /// processed; afterwards [`UserKeyBundle::identity`] returns `None`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MalformedInput`] if the bundle's identity was already consumed, with
    /// [`Error::InvalidEpoch`] if any disclosed epoch is out of range, and with
    /// [`Error::EncodingOverflow`] if any day doesn't fit in four bytes.  Nothing is stored
    /// unless every disclosed epoch is valid.
    pub fn receive_user_key(&mut self, bundle: &mut UserKeyBundle) -> Result<(), Error> {
        let commitment_key = {
            let identity = bundle.take_identity().ok_or_else(|| {
                Error::MalformedInput("key bundle has no identity (already received?)".to_string())
            })?;

            Zeroizing::new(identity_commitment_key::<S>(
                identity.identity_key(),
                identity.user_id(),
            )?)
        };

        let mut daily_commitments: HashMap<u64, Block> = HashMap::new();
        let mut entries = Vec::with_capacity(bundle.pre_epochs().len());

        for pre_epoch in bundle.pre_epochs() {
            let time = Time::from_day_epoch(pre_epoch.day, pre_epoch.epoch)?;

            let commit = match daily_commitments.get(&pre_epoch.day) {
                Some(c) => *c,
                None => {
                    let c = day_commitment::<S>(&commitment_key, pre_epoch.day)?;
                    daily_commitments.insert(pre_epoch.day, c);
                    c
                }
            };

            let epoch = epoch_value::<S>(&pre_epoch.pre_key, &commit, &time)?;
            let day_verification =
                day_verification_key::<S>(bundle.master_verification_key(), pre_epoch.day)?;
            let verification = epoch_verification::<S>(&day_verification, &time)?;

            entries.push((time, StoredEpoch {
                epoch,
                verification,
            }));
        }

        log::debug!("received key bundle disclosing {} epochs", entries.len());

        for (time, entry) in entries {
            self.insert(&time, entry);
        }

        Ok(())
    }

    /// Insert into a bucket, keeping it sorted by epoch value
    fn insert(&mut self, time: &Time, entry: StoredEpoch) {
        let bucket = self
            .epochs
            .entry(time.day())
            .or_default()
            .entry(time.epoch())
            .or_default();

        let pos = bucket.partition_point(|e| e.epoch <= entry.epoch);
        bucket.insert(pos, entry);
    }

    /// Everything stored, minus the verification material
    pub fn send_keys(&self) -> PublishedKeys {
        let mut published = PublishedKeys::default();

        for (day, epochs) in &self.epochs {
            for (epoch, entries) in epochs {
                for entry in entries {
                    published.insert(*day, *epoch, entry.epoch);
                }
            }
        }

        published
    }

    /// Whether `proof` is the proof of some entry stored for (day, epoch)
    pub fn verify_contact(&self, day: u64, epoch: u8, proof: &Proof) -> bool {
        self.bucket(day, epoch)
            .iter()
            .any(|e| Proof::of(&e.verification) == *proof)
    }

    /// The stored entries for (day, epoch), in stored order
    pub fn bucket(&self, day: u64, epoch: u8) -> &[StoredEpoch] {
        self.epochs
            .get(&day)
            .and_then(|epochs| epochs.get(&epoch))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Drop everything stored for days before `day`
    pub fn expire_before(&mut self, day: u64) {
        let kept = self.epochs.split_off(&day);
        let expired = std::mem::replace(&mut self.epochs, kept);

        if !expired.is_empty() {
            log::debug!("expired {} days of published keys before day {day}", expired.len());
        }
    }
}
