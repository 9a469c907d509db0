//! Pseudo-random function (single block encryption) functionality
//!
//! Almost every value in the key hierarchy, and both halves of an ephemeral identifier, come from
//! encrypting exactly one 16 byte block under a 16 byte key.  Nothing ever encrypts more than one
//! block at a time, so there is no mode of operation to speak of.
//!
//! This module defines the traits that expose this functionality, as well as the available
//! implementations.
//!

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::Error;

/// The size of the block every PRF operates on
pub const BLOCK_LEN: usize = 16;

/// A single block of input to, or output from, a PRF
pub type Block = [u8; BLOCK_LEN];

/// Initialisation of a PRF
pub trait PseudoRandomFunctionInit: Sized + PseudoRandomFunction {
    /// Create a new PRF keyed with `key`
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MalformedInput`] if the key is not of the length the underlying cipher
    /// expects.
    fn new(key: &[u8]) -> Result<Self, Error>;
}

/// Operation of a PRF
pub trait PseudoRandomFunction: Sized {
    /// Encrypt one block in place
    fn randomise(&self, block: &mut Block);

    /// Encrypt one block, returning the result
    fn encrypt(&self, block: &Block) -> Block {
        let mut b = *block;
        self.randomise(&mut b);
        b
    }
}

/// A PRF based on single-block AES128, as specified by FIPS-197
#[allow(unreachable_pub)] // I think this is a bug in the lint; see also https://github.com/rust-lang/rust/issues/110923
pub struct AES128PRF {
    /// Wot does the encryption -- stored so that a caller encrypting many blocks under the same
    /// key doesn't redo the keying schedule for every call
    cipher: Aes128,
}

impl PseudoRandomFunctionInit for AES128PRF {
    fn new(key: &[u8]) -> Result<Self, Error> {
        let cipher = Aes128::new_from_slice(key).map_err(|e| {
            Error::MalformedInput(format!(
                "key for AES128PRF must be exactly 16 bytes (got {}: {e})",
                key.len()
            ))
        })?;

        Ok(AES128PRF { cipher })
    }
}

impl PseudoRandomFunction for AES128PRF {
    fn randomise(&self, block: &mut Block) {
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(block.as_mut_slice()));
    }
}

impl core::fmt::Debug for AES128PRF {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AES128PRF")
            .field("key", &"**REDACTED**")
            .finish()
    }
}
