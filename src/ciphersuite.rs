use crate::hash::{HashFunction, HASH_LEN};
use crate::kbkdf::{KBKDFInit, KBKDF};
use crate::keys::{Key, KEY_LEN};
use crate::prf::{Block, PseudoRandomFunction, PseudoRandomFunctionInit};
use crate::Error;

/// The set of primitives everything else in the crate is built from.
///
/// Agents and servers that want to interoperate must agree on a ciphersuite, since every derived
/// value is compared byte-for-byte against an independently computed one.
pub trait CipherSuite {
    /// Single block encryption
    type PRF: PseudoRandomFunctionInit;
    /// Keyed hash
    type HF: HashFunction;
    /// Truncating key derivation on top of `HF`
    type KBKDF: KBKDFInit;

    /// Encrypt a single block under `key`
    ///
    /// # Errors
    ///
    /// Fails if `key` is the wrong size for the PRF.
    fn encrypt(key: &[u8], block: &Block) -> Result<Block, Error> {
        Ok(Self::PRF::new(key)?.encrypt(block))
    }

    /// Full-width keyed hash of `message`
    ///
    /// # Errors
    ///
    /// Fails if `key` is the wrong size for the hash function.
    fn mac(key: &[u8], message: &[u8]) -> Result<[u8; HASH_LEN], Error> {
        Self::HF::hash(key, message)
    }

    /// Derive a key-sized value from `root` and a domain-separated `id`
    ///
    /// # Errors
    ///
    /// Fails if `root` is the wrong size for the KBKDF.
    fn derive_key(root: &[u8], id: &[u8]) -> Result<Key, Error> {
        let mut k = [0u8; KEY_LEN];
        Self::KBKDF::new(root)?.derive_key(&mut k, id)?;
        Ok(k)
    }
}
