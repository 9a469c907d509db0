//! Ephemeral identifiers: the 16 byte values actually broadcast.
//!
//! ```text
//! plain  = 000000 || geotag (5) || proof (4) || 00000000
//! masked = plain XOR AES(enc, unit counter)
//! id     = masked[..12] || AES(mac, masked)[..4]
//! ```
//!
//! Anyone holding the epoch's enc/mac sub-keys can strip the mask, check the leading zeroes, and
//! confirm the tag.  Nobody else learns anything from an identifier.

use crate::ciphersuite::CipherSuite;
use crate::keys::{EpochKey, Key};
use crate::prf::Block;
use crate::util::{copy_at, num_to_bytes, segment, to_array, xor};
use crate::Error;

/// Length of a broadcast identifier
pub const EPHID_LEN: usize = 16;
/// Length of a location tag
pub const GEOTAG_LEN: usize = 5;
/// Length of an ownership proof
pub const PROOF_LEN: usize = 4;

/// Leading zero bytes in an unmasked identifier
const ZERO_PREFIX_LEN: usize = 3;
/// Where the geotag sits in an unmasked identifier
const GEOTAG_OFFSET: usize = ZERO_PREFIX_LEN;
/// Where the proof sits in an unmasked identifier
const PROOF_OFFSET: usize = GEOTAG_OFFSET + GEOTAG_LEN;
/// Bytes of the identifier covered by the tag
const BODY_LEN: usize = PROOF_OFFSET + PROOF_LEN;
/// Length of the truncated tag closing an identifier
const TAG_LEN: usize = EPHID_LEN - BODY_LEN;

/// Generates the newtype boilerplate for a fixed-size byte value
macro_rules! byte_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Wrap a byte array
            pub const fn new(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }

            #[doc = concat!("Wrap a slice, which must be exactly the length of a ", $what)]
            ///
            /// # Errors
            ///
            /// Fails with [`Error::MalformedInput`] if the slice is the wrong length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                Ok($name(to_array(bytes, $what)?))
            }

            /// The raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

byte_newtype!(
    /// A broadcast identifier
    EphemeralId,
    EPHID_LEN,
    "ephemeral id"
);

byte_newtype!(
    /// An opaque location tag
    Geotag,
    GEOTAG_LEN,
    "geotag"
);

byte_newtype!(
    /// The prefix of an epoch verification block, proving who broadcast an identifier
    Proof,
    PROOF_LEN,
    "proof"
);

impl Proof {
    /// The proof for an epoch verification block
    pub fn of(verification: &Block) -> Self {
        let mut p = [0u8; PROOF_LEN];
        for (d, s) in p.iter_mut().zip(verification) {
            *d = *s;
        }
        Proof(p)
    }
}

/// The per-unit mask: `AES(enc, unit as a 16 byte little-endian counter)`
pub(crate) fn unit_mask<S: CipherSuite>(enc: &Key, unit: u8) -> Result<Block, Error> {
    S::encrypt(enc, &num_to_bytes::<16>(u128::from(unit))?)
}

/// Build the identifier for `unit` of the epoch `key` belongs to
pub(crate) fn seal<S: CipherSuite>(
    key: &EpochKey,
    unit: u8,
    geotag: &Geotag,
) -> Result<EphemeralId, Error> {
    let mask = unit_mask::<S>(key.enc(), unit)?;

    let mut plain = [0u8; EPHID_LEN];
    copy_at(&mut plain, GEOTAG_OFFSET, geotag.as_bytes())?;
    copy_at(&mut plain, PROOF_OFFSET, Proof::of(key.verification()).as_bytes())?;

    let masked = xor(&plain, &mask);
    let tag = S::encrypt(key.mac(), &masked)?;

    let mut id = [0u8; EPHID_LEN];
    copy_at(&mut id, 0, segment(&masked, 0, BODY_LEN)?)?;
    copy_at(&mut id, BODY_LEN, segment(&tag, 0, TAG_LEN)?)?;

    Ok(EphemeralId(id))
}

/// Try to open `id` with a candidate (mask, MAC key) pair
///
/// Returns the embedded geotag and proof only if the zero prefix is intact *and* the tag checks
/// out; anything else is simply not a match.
pub(crate) fn open<S: CipherSuite>(
    mask: &Block,
    mac_key: &Key,
    id: &EphemeralId,
) -> Result<Option<(Geotag, Proof)>, Error> {
    let plain = xor(mask, id.as_bytes());

    if plain.iter().take(ZERO_PREFIX_LEN).any(|b| *b != 0) {
        return Ok(None);
    }

    // The trailing bytes of the masked plaintext are all mask
    let mut body = *mask;
    copy_at(&mut body, 0, segment(id.as_bytes(), 0, BODY_LEN)?)?;

    let tag = S::encrypt(mac_key, &body)?;
    if segment(&tag, 0, TAG_LEN)? != segment(id.as_bytes(), BODY_LEN, TAG_LEN)? {
        return Ok(None);
    }

    let geotag = Geotag::from_slice(segment(&plain, GEOTAG_OFFSET, GEOTAG_LEN)?)?;
    let proof = Proof::from_slice(segment(&plain, PROOF_OFFSET, PROOF_LEN)?)?;

    Ok(Some((geotag, proof)))
}
