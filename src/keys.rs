//! The key hierarchy.
//!
//! ```text
//! master ─┬─ identity ── commitment ──────────────┐
//!         ├─ verification ─────────────┐          │
//!         └─ day-chain link (per day) ─┴─ DayKey ─┴─ EpochKey (per epoch)
//! ```
//!
//! Everything is deterministic: two parties holding the same inputs derive byte-identical keys,
//! which is what lets a receiver (or the server) re-derive a broadcaster's epoch keys from the
//! pre-keys it publishes.  The day-chain is the only stateful part, and it only runs forward.

use rand::RngCore;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ciphersuite::CipherSuite;
use crate::prf::Block;
use crate::time::Time;
use crate::util::{check_overflow, num_to_bytes, to_array};
use crate::Error;

/// Length of every symmetric key in the hierarchy
pub const KEY_LEN: usize = 16;

/// A symmetric key
pub type Key = [u8; KEY_LEN];

/// Domain-separation labels for every derivation
mod label {
    /// Identity key from the master key
    pub(super) const IDENTITY: &[u8] = b"IdentityKey";
    /// Commitment key from the identity key and user id
    pub(super) const IDENTITY_COMMITMENT: &[u8] = b"IdentityCommitment";
    /// Master verification key from the master key
    pub(super) const VERIFICATION: &[u8] = b"VerificationKey";
    /// First day-chain link, from the master key
    pub(super) const MASTER_FIRST: &[u8] = b"DeriveMasterFirstKey";
    /// Every later day-chain link, from the one before
    pub(super) const MASTER: &[u8] = b"DeriveMasterKey";
    /// Day encryption seed from a chain link
    pub(super) const DAY: &[u8] = b"DeriveDayKey";
    /// Day verification key from the master verification key
    pub(super) const DAY_VERIFICATION: &[u8] = b"DeriveVerificationKey";
    /// Epoch value from a pre-key
    pub(super) const EPOCH: &[u8] = b"DeriveEpoch";
}

/// Fixed-width little-endian encoding of a day
pub(crate) fn day_bytes(day: u64) -> Result<[u8; 4], Error> {
    num_to_bytes::<4>(u128::from(day))
}

/// `day (4) || epoch (1) || tweak (1) || zero (10)`
fn time_block(time: &Time, tweak: u8) -> Result<Block, Error> {
    let mut block = [0u8; 16];
    let (day, rest) = block.split_at_mut(4);

    day.copy_from_slice(&day_bytes(time.day())?);
    rest.get_mut(..2)
        .ok_or_else(|| Error::InternalError("time block too short".to_string()))?
        .copy_from_slice(&[num_to_bytes::<1>(u128::from(time.epoch()))?[0], tweak]);

    Ok(block)
}

/// Commitment key binding a user id to an identity key
///
/// # Errors
///
/// Fails only if the underlying primitives do.
pub(crate) fn identity_commitment_key<S: CipherSuite>(
    identity_key: &Key,
    user_id: &[u8],
) -> Result<Key, Error> {
    S::derive_key(identity_key, &[user_id, label::IDENTITY_COMMITMENT].concat())
}

/// Per-day commitment value
///
/// # Errors
///
/// Fails with [`Error::EncodingOverflow`] if `day` doesn't fit in four bytes.
pub(crate) fn day_commitment<S: CipherSuite>(
    commitment_key: &Key,
    day: u64,
) -> Result<Block, Error> {
    let mut block = [0u8; 16];
    block
        .get_mut(..4)
        .ok_or_else(|| Error::InternalError("commitment block too short".to_string()))?
        .copy_from_slice(&day_bytes(day)?);

    S::encrypt(commitment_key, &block)
}

/// Per-day verification key
///
/// # Errors
///
/// Fails with [`Error::EncodingOverflow`] if `day` doesn't fit in four bytes.
pub(crate) fn day_verification_key<S: CipherSuite>(
    master_verification_key: &Key,
    day: u64,
) -> Result<Key, Error> {
    S::derive_key(
        master_verification_key,
        &[day_bytes(day)?.as_slice(), label::DAY_VERIFICATION].concat(),
    )
}

/// The "epoch" value the server publishes, re-derived from a pre-key and that day's commitment
///
/// # Errors
///
/// Fails with [`Error::EncodingOverflow`] if the day doesn't fit in four bytes.
pub(crate) fn epoch_value<S: CipherSuite>(
    pre_key: &Key,
    day_commitment: &Block,
    time: &Time,
) -> Result<Key, Error> {
    S::derive_key(
        pre_key,
        &[
            day_commitment.as_slice(),
            &day_bytes(time.day())?,
            &[time.epoch()],
            label::EPOCH,
        ]
        .concat(),
    )
}

/// The (encryption, MAC) sub-key pair for an epoch value
///
/// # Errors
///
/// Fails with [`Error::EncodingOverflow`] if the day doesn't fit in four bytes.
pub(crate) fn epoch_sub_keys<S: CipherSuite>(
    epoch_value: &Key,
    time: &Time,
) -> Result<(Key, Key), Error> {
    Ok((
        S::encrypt(epoch_value, &time_block(time, 0)?)?,
        S::encrypt(epoch_value, &time_block(time, 1)?)?,
    ))
}

/// The verification block for an epoch, whose prefix is the proof carried in identifiers
///
/// # Errors
///
/// Fails with [`Error::EncodingOverflow`] if the day doesn't fit in four bytes.
pub(crate) fn epoch_verification<S: CipherSuite>(
    day_verification_key: &Key,
    time: &Time,
) -> Result<Block, Error> {
    S::encrypt(day_verification_key, &time_block(time, 0)?)
}

/// The per-user root secret
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Key);

impl MasterKey {
    /// Wrap an existing key
    pub fn new(key: Key) -> Self {
        MasterKey(key)
    }

    /// Wrap an existing key held in a slice
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MalformedInput`] unless the slice is exactly [`KEY_LEN`] bytes.
    pub fn from_slice(key: &[u8]) -> Result<Self, Error> {
        Ok(MasterKey(to_array(key, "master key")?))
    }

    /// Generate a fresh key from OS entropy
    pub fn random() -> Self {
        let mut k = [0u8; KEY_LEN];
        ChaCha20Rng::from_entropy().fill_bytes(&mut k);

        MasterKey(k)
    }

    /// The raw key
    pub(crate) fn as_bytes(&self) -> &Key {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MasterKey").field(&"**REDACTED**").finish()
    }
}

/// Long-lived keys derived once from the master key
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct IdentityKeys {
    /// `MAC(master, "IdentityKey")`
    identity: Key,
    /// `MAC(identity, user_id || "IdentityCommitment")`
    commitment: Key,
    /// `MAC(master, "VerificationKey")`
    verification: Key,
}

impl IdentityKeys {
    /// Derive the identity keys for `user_id`
    ///
    /// # Errors
    ///
    /// Fails only if the underlying primitives do.
    pub fn derive<S: CipherSuite>(master: &MasterKey, user_id: &[u8]) -> Result<Self, Error> {
        let identity = S::derive_key(master.as_bytes(), label::IDENTITY)?;
        let commitment = identity_commitment_key::<S>(&identity, user_id)?;
        let verification = S::derive_key(master.as_bytes(), label::VERIFICATION)?;

        Ok(IdentityKeys {
            identity,
            commitment,
            verification,
        })
    }

    /// The identity key
    pub fn identity_key(&self) -> &Key {
        &self.identity
    }

    /// The identity-commitment key
    pub fn commitment_key(&self) -> &Key {
        &self.commitment
    }

    /// The master verification key
    pub fn master_verification_key(&self) -> &Key {
        &self.verification
    }
}

impl fmt::Debug for IdentityKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeys")
            .field("keys", &"**REDACTED**")
            .finish()
    }
}

/// Forward-only hash chain with one link per day
///
/// Only the link for the next day still to be expanded is held; advancing overwrites it.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct DayChain {
    /// The day `link` belongs to
    day: u64,
    /// The current link
    link: Key,
}

impl DayChain {
    /// Seed the chain for the install day
    pub(crate) fn install<S: CipherSuite>(master: &MasterKey, day: u64) -> Result<Self, Error> {
        Ok(DayChain {
            day,
            link: S::derive_key(master.as_bytes(), label::MASTER_FIRST)?,
        })
    }

    /// The day the current link belongs to
    pub(crate) fn day(&self) -> u64 {
        self.day
    }

    /// Expand the current link into its day key
    pub(crate) fn day_key<S: CipherSuite>(&self, identity: &IdentityKeys) -> Result<DayKey, Error> {
        DayKey::derive::<S>(self.day, &self.link, identity)
    }

    /// Ratchet to the next day, destroying the current link
    pub(crate) fn advance<S: CipherSuite>(&mut self) -> Result<(), Error> {
        let next_day = check_overflow(
            self.day.overflowing_add(1),
            "day-chain cannot advance past the last representable day",
        )?;
        let next = S::derive_key(&self.link, label::MASTER)?;

        self.link.zeroize();
        self.link = next;
        self.day = next_day;

        log::debug!("day-chain advanced to day {next_day}");

        Ok(())
    }

    /// The current link, for checking the chain against known vectors
    #[cfg(test)]
    pub(crate) fn link(&self) -> &Key {
        &self.link
    }
}

impl fmt::Debug for DayChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DayChain")
            .field("day", &self.day)
            .field("link", &"**REDACTED**")
            .finish()
    }
}

/// Keys for a single day
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DayKey {
    /// Day index
    index: u64,
    /// Encryption seed for the day's pre-keys
    day: Key,
    /// Day verification key
    verification: Key,
    /// Day commitment value
    commit: Block,
}

impl DayKey {
    /// Derive the keys for `day` from that day's chain link
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EncodingOverflow`] if `day` doesn't fit in four bytes.
    fn derive<S: CipherSuite>(
        day: u64,
        link: &Key,
        identity: &IdentityKeys,
    ) -> Result<Self, Error> {
        Ok(DayKey {
            index: day,
            day: S::derive_key(link, label::DAY)?,
            verification: day_verification_key::<S>(identity.master_verification_key(), day)?,
            commit: day_commitment::<S>(identity.commitment_key(), day)?,
        })
    }

    /// The day these keys belong to
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Day encryption seed
    pub fn day_key(&self) -> &Key {
        &self.day
    }

    /// Day verification key
    pub fn verification_key(&self) -> &Key {
        &self.verification
    }

    /// Day commitment value
    pub fn commitment(&self) -> &Block {
        &self.commit
    }
}

impl fmt::Debug for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DayKey")
            .field("day", &self.index)
            .field("keys", &"**REDACTED**")
            .finish()
    }
}

/// Keys for a single epoch
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EpochKey {
    /// What gets disclosed to the server
    pre_key: Key,
    /// What the server publishes
    epoch: Key,
    /// Masks identifiers
    enc: Key,
    /// Tags identifiers
    mac: Key,
    /// Proves ownership of the epoch to the server
    ver: Block,
}

impl EpochKey {
    /// Derive the keys for the epoch named by `time`
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MalformedInput`] if `time` is on a different day to `day_key`.
    pub fn derive<S: CipherSuite>(time: &Time, day_key: &DayKey) -> Result<Self, Error> {
        if time.day() != day_key.index() {
            return Err(Error::MalformedInput(format!(
                "cannot derive an epoch key for day {} from the key for day {}",
                time.day(),
                day_key.index()
            )));
        }

        let pre_key = S::encrypt(day_key.day_key(), &time_block(time, 0)?)?;
        let epoch = epoch_value::<S>(&pre_key, day_key.commitment(), time)?;
        let (enc, mac) = epoch_sub_keys::<S>(&epoch, time)?;
        let ver = epoch_verification::<S>(day_key.verification_key(), time)?;

        Ok(EpochKey {
            pre_key,
            epoch,
            enc,
            mac,
            ver,
        })
    }

    /// The pre-key disclosed to the server on diagnosis
    pub fn pre_key(&self) -> &Key {
        &self.pre_key
    }

    /// The epoch value the server publishes
    pub fn epoch(&self) -> &Key {
        &self.epoch
    }

    /// The identifier masking sub-key
    pub fn enc(&self) -> &Key {
        &self.enc
    }

    /// The identifier tagging sub-key
    pub fn mac(&self) -> &Key {
        &self.mac
    }

    /// The epoch verification block
    pub fn verification(&self) -> &Block {
        &self.ver
    }
}

impl fmt::Debug for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochKey")
            .field("keys", &"**REDACTED**")
            .finish()
    }
}

/// One disclosed epoch: `(day, epoch, pre-key)`
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreEpochKey {
    /// Day of the epoch
    pub day: u64,
    /// Epoch within the day
    pub epoch: u8,
    /// The epoch's pre-key
    pub pre_key: Key,
}

/// The part of a bundle the server must discard as soon as it has used it
#[derive(Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BundleIdentity {
    /// The user's long-term id
    #[cfg_attr(feature = "serde", serde(with = "serde_bytes"))]
    user_id: Vec<u8>,
    /// The user's identity key
    identity_key: Key,
}

impl BundleIdentity {
    /// The user's long-term id
    pub fn user_id(&self) -> &[u8] {
        &self.user_id
    }

    /// The user's identity key
    pub fn identity_key(&self) -> &Key {
        &self.identity_key
    }
}

impl fmt::Debug for BundleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleIdentity")
            .field("user_id", &"**REDACTED**")
            .field("identity_key", &"**REDACTED**")
            .finish()
    }
}

/// Everything a diagnosed user hands to the aggregation server
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserKeyBundle {
    /// Consumed (and zeroed) by the server on receipt
    identity: Option<BundleIdentity>,
    /// The disclosed epochs
    pre_epochs: Vec<PreEpochKey>,
    /// The user's master verification key
    master_verification: Key,
}

impl UserKeyBundle {
    /// Assemble a bundle
    pub fn new(
        user_id: Vec<u8>,
        identity_key: Key,
        pre_epochs: Vec<PreEpochKey>,
        master_verification: Key,
    ) -> Self {
        UserKeyBundle {
            identity: Some(BundleIdentity {
                user_id,
                identity_key,
            }),
            pre_epochs,
            master_verification,
        }
    }

    /// The identity part, if it has not been consumed yet
    pub fn identity(&self) -> Option<&BundleIdentity> {
        self.identity.as_ref()
    }

    /// Remove the identity part, leaving nothing behind
    pub(crate) fn take_identity(&mut self) -> Option<BundleIdentity> {
        self.identity.take()
    }

    /// The disclosed epochs
    pub fn pre_epochs(&self) -> &[PreEpochKey] {
        &self.pre_epochs
    }

    /// The user's master verification key
    pub fn master_verification_key(&self) -> &Key {
        &self.master_verification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aes128v1::CipherSuite as Suite;
    use hex_literal::hex;

    const USER_ID: [u8; 16] = hex!["6eb31a71 798b46e3 98ee0158 1b8c70c6"];
    const MASTER: [u8; 16] = hex!["333ea5ce d8f432dc 83b729cd c6a89144"];
    const INSTALL_DAY: u64 = 18_374;

    fn identity() -> IdentityKeys {
        IdentityKeys::derive::<Suite>(&MasterKey::new(MASTER), &USER_ID).unwrap()
    }

    #[test]
    fn identity_keys_match_reference_vectors() {
        let ids = identity();

        assert_eq!(&hex!["a04276d9 51082a7f eac7b1fe 3f02440b"], ids.identity_key());
        assert_eq!(&hex!["1561afac 09fb646c 1d46c5da 6a968ea4"], ids.commitment_key());
        assert_eq!(
            &hex!["124a2d6c 0256ef75 936bf309 2a6ba665"],
            ids.master_verification_key()
        );
    }

    #[test]
    fn identity_keys_are_reproducible() {
        let a = identity();
        let b = identity();

        assert_eq!(a.identity_key(), b.identity_key());
        assert_eq!(a.commitment_key(), b.commitment_key());
        assert_eq!(a.master_verification_key(), b.master_verification_key());
    }

    #[test]
    fn commitment_depends_on_user_id() {
        let other =
            IdentityKeys::derive::<Suite>(&MasterKey::new(MASTER), b"someone else").unwrap();

        assert_eq!(identity().identity_key(), other.identity_key());
        assert_ne!(identity().commitment_key(), other.commitment_key());
    }

    #[test]
    fn day_chain_matches_reference_vectors() {
        let mut chain = DayChain::install::<Suite>(&MasterKey::new(MASTER), INSTALL_DAY).unwrap();

        assert_eq!(&hex!["8051c4ba 0a44982c ba906b2f 46c5221c"], chain.link());

        chain.advance::<Suite>().unwrap();

        assert_eq!(INSTALL_DAY + 1, chain.day());
        assert_eq!(&hex!["d8f991c9 8a8831ce 1f4a7837 9b550d51"], chain.link());
    }

    #[test]
    fn install_link_differs_from_ratchet_step() {
        let master = MasterKey::new(MASTER);
        let installed = DayChain::install::<Suite>(&master, 0).unwrap();
        let stepped = Suite::derive_key(master.as_bytes(), label::MASTER).unwrap();

        assert_ne!(installed.link(), &stepped);
    }

    #[test]
    fn day_key_matches_reference_vectors() {
        let chain = DayChain::install::<Suite>(&MasterKey::new(MASTER), INSTALL_DAY).unwrap();
        let dk = chain.day_key::<Suite>(&identity()).unwrap();

        assert_eq!(&hex!["8fe52b13 c1406ef1 f2d56572 92e37986"], dk.day_key());
        assert_eq!(&hex!["228ac385 355a2c3a 29552633 915a3b78"], dk.verification_key());
        assert_eq!(&hex!["1e5eb8b3 06b508ad 424ac213 ba208c24"], dk.commitment());
    }

    #[test]
    fn epoch_key_matches_reference_vectors() {
        let chain = DayChain::install::<Suite>(&MasterKey::new(MASTER), INSTALL_DAY).unwrap();
        let dk = chain.day_key::<Suite>(&identity()).unwrap();

        let first_time = Time::from_day_epoch(INSTALL_DAY, 0).unwrap();
        let first = EpochKey::derive::<Suite>(&first_time, &dk).unwrap();

        assert_eq!(&hex!["a6e6bb15 5c7ae325 93748925 cf09adc0"], first.pre_key());
        assert_eq!(&hex!["a6041343 a8562429 93a5e82c 148ab008"], first.epoch());
        assert_eq!(&hex!["276374c8 8a95cddb c052c4d0 b0b606ec"], first.enc());
        assert_eq!(&hex!["ef237d11 ef3e7188 74e9b87b 24e34894"], first.mac());
        assert_eq!(&hex!["29321028 1bee8b58 161ff899 0768bdfc"], first.verification());

        let last_time = Time::from_day_epoch(INSTALL_DAY, 23).unwrap();
        let last = EpochKey::derive::<Suite>(&last_time, &dk).unwrap();

        assert_eq!(&hex!["3fe185cc 964877f4 81a44a24 84c7987a"], last.pre_key());
        assert_eq!(&hex!["4bad4611 6f056a78 82f79609 7dd40a4e"], last.epoch());
        assert_eq!(&hex!["08cb756e 70d7291a bf9b9a58 ae71ce0c"], last.enc());
        assert_eq!(&hex!["46d6096d 51ea0d7c de4e07b4 de92bfc8"], last.mac());
        assert_eq!(&hex!["8c3d8b06 91a64cad df4f2572 81190a92"], last.verification());
    }

    #[test]
    fn server_side_rederivation_agrees_with_local_keys() {
        let ids = identity();
        let chain = DayChain::install::<Suite>(&MasterKey::new(MASTER), INSTALL_DAY).unwrap();
        let dk = chain.day_key::<Suite>(&ids).unwrap();
        let t = Time::from_day_epoch(INSTALL_DAY, 9).unwrap();
        let local = EpochKey::derive::<Suite>(&t, &dk).unwrap();

        let commitment_key =
            identity_commitment_key::<Suite>(ids.identity_key(), &USER_ID).unwrap();
        let commit = day_commitment::<Suite>(&commitment_key, INSTALL_DAY).unwrap();
        let epoch = epoch_value::<Suite>(local.pre_key(), &commit, &t).unwrap();
        let dv = day_verification_key::<Suite>(ids.master_verification_key(), INSTALL_DAY).unwrap();

        assert_eq!(local.epoch(), &epoch);
        assert_eq!((*local.enc(), *local.mac()), epoch_sub_keys::<Suite>(&epoch, &t).unwrap());
        assert_eq!(local.verification(), &epoch_verification::<Suite>(&dv, &t).unwrap());
    }

    #[test]
    fn epoch_key_refuses_mismatched_day() {
        let chain = DayChain::install::<Suite>(&MasterKey::new(MASTER), INSTALL_DAY).unwrap();
        let dk = chain.day_key::<Suite>(&identity()).unwrap();

        assert!(matches!(
            EpochKey::derive::<Suite>(&Time::from_day_epoch(INSTALL_DAY + 1, 0).unwrap(), &dk),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn day_beyond_four_bytes_overflows() {
        let ids = identity();

        assert!(matches!(
            day_commitment::<Suite>(ids.commitment_key(), u64::from(u32::MAX) + 1),
            Err(Error::EncodingOverflow(_))
        ));
    }

    #[test]
    fn master_key_from_short_slice_is_malformed() {
        assert!(matches!(
            MasterKey::from_slice(&[0u8; 8]),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn random_master_keys_differ() {
        assert_ne!(MasterKey::random().as_bytes(), MasterKey::random().as_bytes());
    }

    #[test]
    fn debug_output_is_redacted() {
        let s = format!("{:?}", identity());

        assert!(s.contains("REDACTED"));
        assert!(!s.contains("a0"));
    }
}
