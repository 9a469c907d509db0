//! Defines the Error type for everything Hashomer.

use thiserror::Error;

/// Error type for all Hashomer operations
///
/// Every variant is a contract violation by the caller.  Expected outcomes, such as a contact
/// being rate-limited or an identifier not matching any published key, are reported through
/// ordinary return values instead.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// An epoch index was outside the 24-epochs-per-day range
    #[error("epoch {epoch} is out of range (must be < {limit})")]
    InvalidEpoch {
        /// The epoch index that was asked for
        epoch: u8,
        /// The exclusive upper bound on epoch indices
        limit: u8,
    },

    /// Keys were requested for a day the day-chain has already ratcheted past
    #[error("cannot derive keys for day {requested}: the day-chain is already at day {current}")]
    PastKeyUnavailable {
        /// The day whose keys were asked for
        requested: u64,
        /// The earliest day the chain can still produce
        current: u64,
    },

    /// No epoch key is held for the requested (day, epoch)
    #[error("no epoch key is available for day {day}, epoch {epoch}")]
    KeyNotAvailable {
        /// Day of the missing key
        day: u64,
        /// Epoch of the missing key
        epoch: u8,
    },

    /// An integer did not fit into its fixed-width byte field
    #[error("{0}")]
    EncodingOverflow(String),

    /// A key, block, identifier or tag had the wrong length, or a bundle was incomplete
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Congratulations, you've found a bug!
    #[error("Internal error: {0} (please report as a bug)")]
    InternalError(String),
}
