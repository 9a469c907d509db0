//! Key-based Key Derivation
//!
//! Every key-sized derivation in the hierarchy is the same shape: run a keyed hash over a
//! domain-separation label (with some context glued on the front), and keep as many leading bytes
//! of the tag as the new key needs.
//!

use std::fmt;
use zeroize::ZeroizeOnDrop;

use crate::hash::{HashFunction, HMACSHA256HF, HASH_KEY_LEN, HASH_LEN};
use crate::Error;

/// Initialisation of a KBKDF
///
#[allow(clippy::upper_case_acronyms)]
#[doc(hidden)]
pub trait KBKDFInit: KBKDF + Sized {
    /// Create a KBKDF instance
    ///
    /// # Errors
    ///
    /// Different KBKDFs have different requirements for the size of their key, which will be the
    /// most likely cause of errors.
    ///
    fn new(root_key: &[u8]) -> Result<Self, Error>;
}

/// The key-generating functionality of a KBKDF
///
#[allow(clippy::upper_case_acronyms)]
pub trait KBKDF {
    /// Generate a new key
    ///
    /// The derived key is written to `subkey`, which can be at most one hash output long.
    /// If the same `id` is passed to a KBKDF created with the same `root_key`, the same subkey will be generated each time.
    /// Thus, make your `id`s distinct for each different use of the same KBKDF.
    ///
    /// # Errors
    ///
    /// Will fail if an underlying cryptographic operation fails, or if `subkey` is longer than
    /// the hash function can fill.
    ///
    fn derive_key(&self, subkey: &mut [u8], id: &[u8]) -> Result<(), Error>;
}

/// A KBKDF based on truncated HMAC-SHA256
#[derive(ZeroizeOnDrop)]
#[allow(clippy::upper_case_acronyms)]
pub struct HMACSHA256 {
    /// The key from which all our new keys are derived
    root_key: [u8; HASH_KEY_LEN],
}

impl KBKDFInit for HMACSHA256 {
    fn new(root_key: &[u8]) -> Result<Self, Error> {
        if root_key.len() != HASH_KEY_LEN {
            return Err(Error::MalformedInput(format!(
                "key for a HMACSHA256 KBKDF must be exactly {HASH_KEY_LEN} bytes (got {})",
                root_key.len()
            )));
        }

        let mut kbkdf = Self {
            root_key: Default::default(),
        };
        kbkdf.root_key.copy_from_slice(root_key);

        Ok(kbkdf)
    }
}

impl KBKDF for HMACSHA256 {
    fn derive_key(&self, subkey: &mut [u8], id: &[u8]) -> Result<(), Error> {
        let subkey_len = subkey.len();
        let tag = HMACSHA256HF::hash(&self.root_key, id)?;

        let key_segment = tag.get(..subkey_len).ok_or_else(|| {
            Error::MalformedInput(format!(
                "attempted to derive a {subkey_len} byte key, but HMACSHA256 only produces {HASH_LEN}"
            ))
        })?;
        subkey.copy_from_slice(key_segment);

        Ok(())
    }
}

impl fmt::Debug for HMACSHA256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KBKDF")
            .field("key", &"**REDACTED**")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    mod hmacsha256 {
        use super::*;

        #[test]
        fn derive_one_block_subkey() {
            let key = hex!["333ea5ce d8f432dc 83b729cd c6a89144"];
            let mut subkey = [0u8; 16];

            HMACSHA256::new(&key)
                .unwrap()
                .derive_key(&mut subkey, b"IdentityKey")
                .unwrap();

            assert_eq!(hex!["a04276d9 51082a7f eac7b1fe 3f02440b"], subkey);
        }

        #[test]
        fn short_subkey_is_a_prefix() {
            let key = hex!["333ea5ce d8f432dc 83b729cd c6a89144"];
            let mut subkey = [0u8; 4];

            HMACSHA256::new(&key)
                .unwrap()
                .derive_key(&mut subkey, b"IdentityKey")
                .unwrap();

            assert_eq!(hex!["a04276d9"], subkey);
        }

        #[test]
        fn oversized_subkey_is_rejected() {
            let mut subkey = [0u8; 33];

            assert!(matches!(
                HMACSHA256::new(&[0u8; 16])
                    .unwrap()
                    .derive_key(&mut subkey, b"too much"),
                Err(Error::MalformedInput(_))
            ));
        }

        #[test]
        fn bad_root_key_is_rejected() {
            assert!(matches!(
                HMACSHA256::new(&[0u8; 32]),
                Err(Error::MalformedInput(_))
            ));
        }
    }
}
