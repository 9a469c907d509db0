//! Contact tracing with AES128 as the block cipher and HMAC-SHA256 as the keyed hash.
//!
//! This is the only ciphersuite defined so far, and the one every published test vector is
//! computed under.  Most users want the [`UserAgent`] and [`AggregationServer`] aliases rather
//! than naming the generic types directly.

use crate::ciphersuite::CipherSuite as SuperSweet;
use crate::{hash, kbkdf, prf};

/// The full set of parameters that make up the [`aes128v1`](super) ciphersuite.
///
/// This struct simply represents the concrete choices about which cryptographic operators to use
/// for the various parts of the system.  These can *never* change; if anything needs to change,
/// for any reason, a new ciphersuite is defined with the different parameters.
///
#[derive(Debug)]
#[non_exhaustive]
pub struct CipherSuite {}

impl SuperSweet for CipherSuite {
    type PRF = prf::AES128PRF;
    type HF = hash::HMACSHA256HF;
    type KBKDF = kbkdf::HMACSHA256;
}

/// A user agent using the `aes128v1` ciphersuite
pub type UserAgent = crate::user::UserAgent<CipherSuite>;

/// An aggregation server using the `aes128v1` ciphersuite
pub type AggregationServer = crate::server::AggregationServer<CipherSuite>;
