//! Keyed hash function trait and implementations
//!
//! Every key-sized value in the hierarchy that isn't a block encryption is a keyed MAC over a
//! domain-separation label (plus, sometimes, a little context).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::Error;

/// The length of the key every hash function in this crate accepts
pub const HASH_KEY_LEN: usize = 16;

/// The length of a full hash function output
pub const HASH_LEN: usize = 32;

/// Defines what you need to do in order to be a hash function
#[allow(unreachable_pub)]
// I can't help thinking this is a bug in the lint; see https://github.com/rust-lang/rust/issues/110923
#[allow(clippy::module_name_repetitions)] // it's a trait, get over it
pub trait HashFunction: Sized {
    /// Turns a key and an arbitrary-length message into a full-width tag
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MalformedInput`] unless the key is exactly [`HASH_KEY_LEN`] bytes.
    fn hash(key: &[u8], message: &[u8]) -> Result<[u8; HASH_LEN], Error>;
}

/// HMAC with SHA-256, as specified by RFC 2104 / FIPS 180-4.
#[allow(unreachable_pub)] // I think this is a bug in the lint; see also https://github.com/rust-lang/rust/issues/110923
#[derive(Debug)]
pub struct HMACSHA256HF {}

impl HashFunction for HMACSHA256HF {
    fn hash(key: &[u8], message: &[u8]) -> Result<[u8; HASH_LEN], Error> {
        if key.len() != HASH_KEY_LEN {
            return Err(Error::MalformedInput(format!(
                "key for HMACSHA256HF must be exactly {HASH_KEY_LEN} bytes (got {})",
                key.len()
            )));
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| {
            Error::InternalError(format!(
                "HMACSHA256HF received a key of invalid length ({e})"
            ))
        })?;
        mac.update(message);

        Ok(mac.finalize().into_bytes().into())
    }
}
