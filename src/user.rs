//! The user agent: one person's keys, broadcasts, contacts and matches.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::ciphersuite::CipherSuite;
use crate::contact::{Contact, ContactStore, Match, Rssi};
use crate::ephid::{seal, EphemeralId, Geotag};
use crate::keys::{
    day_bytes, DayChain, EpochKey, IdentityKeys, MasterKey, PreEpochKey, UserKeyBundle,
};
use crate::matching::find_matches;
use crate::server::PublishedKeys;
use crate::time::{Time, Timestamp, EPOCHS_IN_DAY};
use crate::Error;

/// A single user's view of the world
///
/// Epoch keys are materialised a whole day at a time by walking the day-chain forward.  Once
/// the chain has moved past a day, that day's keys can only be deleted, never re-derived.
pub struct UserAgent<S: CipherSuite> {
    /// Long-term id, handed to the server on diagnosis
    user_id: Vec<u8>,
    /// Keys derived from the master key
    identity: IdentityKeys,
    /// The next day whose epoch keys are still to be derived
    chain: DayChain,
    /// Materialised epoch keys
    epoch_keys: BTreeMap<Time, EpochKey>,
    /// Overheard identifiers
    contacts: ContactStore,
    /// Ciphersuite marker
    _suite: PhantomData<S>,
}

impl<S: CipherSuite> fmt::Debug for UserAgent<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAgent")
            .field("identity", &self.identity)
            .field("chain", &self.chain)
            .field("epoch_keys", &self.epoch_keys.len())
            .field("contacts", &self.contacts.as_slice().len())
            .finish()
    }
}

impl<S: CipherSuite> UserAgent<S> {
    /// Set up an agent installed at `install_time`, with every epoch key for that day ready
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EncodingOverflow`] if the install day doesn't fit in four bytes.
    pub fn new(
        user_id: &[u8],
        master_key: &MasterKey,
        install_time: Timestamp,
    ) -> Result<Self, Error> {
        let install_day = Time::from_timestamp(install_time).day();

        let mut agent = UserAgent {
            user_id: user_id.to_vec(),
            identity: IdentityKeys::derive::<S>(master_key, user_id)?,
            chain: DayChain::install::<S>(master_key, install_day)?,
            epoch_keys: BTreeMap::new(),
            contacts: ContactStore::default(),
            _suite: PhantomData,
        };
        agent.ensure_epoch_keys(install_day)?;

        Ok(agent)
    }

    /// Keys derived from the master key
    pub fn identity(&self) -> &IdentityKeys {
        &self.identity
    }

    /// Make sure keys exist up to `future_time`'s day, then forget everything before `past_time`
    ///
    /// # Errors
    ///
    /// Fails with [`Error::PastKeyUnavailable`] if `future_time`'s day is missing keys the
    /// day-chain has already moved past.
    pub fn update_key_databases(
        &mut self,
        past_time: Timestamp,
        future_time: Timestamp,
    ) -> Result<(), Error> {
        self.ensure_epoch_keys(Time::from_timestamp(future_time).day())?;
        self.delete_history(past_time);

        Ok(())
    }

    /// The identifier to broadcast at `time`, from `geotag`
    ///
    /// # Errors
    ///
    /// Fails with [`Error::KeyNotAvailable`] unless the epoch key for `time` is held.
    pub fn generate_ephemeral_id(
        &self,
        time: Timestamp,
        geotag: &Geotag,
    ) -> Result<EphemeralId, Error> {
        let t = Time::from_timestamp(time);
        let key = self.epoch_key(&t).ok_or(Error::KeyNotAvailable {
            day: t.day(),
            epoch: t.epoch(),
        })?;

        seal::<S>(key, t.units(), geotag)
    }

    /// Record an overheard identifier
    ///
    /// Returns `false`, storing nothing, if the contact is more than the jitter allowance older
    /// than the last one stored, or if the rolling window is already full.
    pub fn store_contact(
        &mut self,
        id: EphemeralId,
        rssi: Option<Rssi>,
        time: Timestamp,
        location: Geotag,
    ) -> bool {
        self.contacts.store(Contact {
            id,
            rssi,
            time,
            location,
        })
    }

    /// Forget every stored contact equal to `contact`
    pub fn delete_contact(&mut self, contact: &Contact) {
        self.contacts.delete(contact);
    }

    /// Forget every epoch key before `cutoff`'s epoch and every contact before `cutoff`
    pub fn delete_history(&mut self, cutoff: Timestamp) {
        let t = Time::from_timestamp(cutoff);
        let before = (self.epoch_keys.len(), self.contacts.as_slice().len());

        self.epoch_keys = self.epoch_keys.split_off(&t);
        self.contacts.delete_before(cutoff);

        log::debug!(
            "deleted {} epoch keys and {} contacts before {cutoff}",
            before.0.saturating_sub(self.epoch_keys.len()),
            before.1.saturating_sub(self.contacts.as_slice().len())
        );
    }

    /// Forget the epoch keys from `start`'s epoch through `end`'s epoch, inclusive
    ///
    /// Contacts are left alone.
    pub fn delete_my_keys(&mut self, start: Timestamp, end: Timestamp) {
        let (start, end) = (Time::from_timestamp(start), Time::from_timestamp(end));

        self.epoch_keys.retain(|t, _| !(start <= *t && *t <= end));
    }

    /// Everything the server needs to publish this user's keys
    pub fn get_keys_for_server(&self) -> UserKeyBundle {
        let pre_epochs = self
            .epoch_keys
            .iter()
            .map(|(t, k)| PreEpochKey {
                day: t.day(),
                epoch: t.epoch(),
                pre_key: *k.pre_key(),
            })
            .collect();

        UserKeyBundle::new(
            self.user_id.clone(),
            *self.identity.identity_key(),
            pre_epochs,
            *self.identity.master_verification_key(),
        )
    }

    /// Test every stored contact against a published feed
    ///
    /// The contact store is sorted into ascending time order first.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EncodingOverflow`] if the feed names a day that doesn't fit in four
    /// bytes.
    pub fn find_crypto_matches(&mut self, published: &PublishedKeys) -> Result<Vec<Match>, Error> {
        self.contacts.sort();

        find_matches::<S>(self.contacts.as_slice(), published)
    }

    /// Stored contacts, in stored order
    pub fn contacts(&self) -> &[Contact] {
        self.contacts.as_slice()
    }

    /// The epoch key for `time`'s epoch, if held
    pub fn epoch_key(&self, time: &Time) -> Option<&EpochKey> {
        self.epoch_keys.get(time)
    }

    /// Every epoch an epoch key is held for, in order
    pub fn epoch_key_times(&self) -> impl Iterator<Item = &Time> + '_ {
        self.epoch_keys.keys()
    }

    /// Derive every epoch key from the chain's current day through `target_day`
    fn ensure_epoch_keys(&mut self, target_day: u64) -> Result<(), Error> {
        let complete = (0..EPOCHS_IN_DAY).all(|epoch| {
            Time::from_day_epoch(target_day, epoch).is_ok_and(|t| self.epoch_keys.contains_key(&t))
        });
        if complete {
            return Ok(());
        }

        if self.chain.day() > target_day {
            return Err(Error::PastKeyUnavailable {
                requested: target_day,
                current: self.chain.day(),
            });
        }

        day_bytes(target_day)?;

        while self.chain.day() <= target_day {
            let day = self.chain.day();
            let day_key = self.chain.day_key::<S>(&self.identity)?;

            let epochs = (0..EPOCHS_IN_DAY)
                .map(|epoch| {
                    let t = Time::from_day_epoch(day, epoch)?;
                    Ok((t, EpochKey::derive::<S>(&t, &day_key)?))
                })
                .collect::<Result<Vec<_>, Error>>()?;

            self.chain.advance::<S>()?;
            self.epoch_keys.extend(epochs);
        }

        Ok(())
    }
}
