//! Byte-twiddling helpers shared by the key hierarchy, the identifier codec and the matcher.

use crate::Error;

/// Convert the result of an `overflowing_*` operation into a `Result`
pub(crate) fn check_overflow<T>(v: (T, bool), msg: &str) -> Result<T, Error> {
    let (result, overflowed) = v;

    if overflowed {
        Err(Error::EncodingOverflow(msg.to_string()))
    } else {
        Ok(result)
    }
}

/// Little-endian encoding of `num` into exactly `W` bytes
///
/// Fails if any set bit of `num` falls outside the field.
pub(crate) fn num_to_bytes<const W: usize>(num: u128) -> Result<[u8; W], Error> {
    let le = num.to_le_bytes();
    let (head, tail) = le.split_at(W.min(le.len()));

    if tail.iter().any(|b| *b != 0) {
        return Err(Error::EncodingOverflow(format!(
            "{num} does not fit in a {W} byte field"
        )));
    }

    let mut out = [0u8; W];
    out.get_mut(..head.len())
        .ok_or_else(|| {
            Error::InternalError(format!("{W} byte field shorter than {}", head.len()))
        })?
        .copy_from_slice(head);

    Ok(out)
}

/// Bytewise exclusive-or of two equal-sized blocks
pub(crate) fn xor<const N: usize>(a: &[u8; N], b: &[u8; N]) -> [u8; N] {
    let mut out = [0u8; N];

    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x ^ y;
    }

    out
}

/// Copy `src` into `dst` starting at byte `offset`
pub(crate) fn copy_at(dst: &mut [u8], offset: usize, src: &[u8]) -> Result<(), Error> {
    let dst_len = dst.len();

    offset
        .checked_add(src.len())
        .and_then(|end| dst.get_mut(offset..end))
        .ok_or_else(|| {
            Error::InternalError(format!(
                "{} bytes at offset {offset} overrun a {dst_len} byte buffer",
                src.len()
            ))
        })?
        .copy_from_slice(src);

    Ok(())
}

/// The `len` bytes of `src` starting at `offset`
pub(crate) fn segment(src: &[u8], offset: usize, len: usize) -> Result<&[u8], Error> {
    offset
        .checked_add(len)
        .and_then(|end| src.get(offset..end))
        .ok_or_else(|| {
            Error::InternalError(format!(
                "{len} bytes at offset {offset} overrun a {} byte buffer",
                src.len()
            ))
        })
}

/// Copy a slice into a fixed-size array, complaining about `what` if the length is off
pub(crate) fn to_array<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], Error> {
    bytes.try_into().map_err(|_| {
        Error::MalformedInput(format!(
            "{what} must be exactly {N} bytes (got {})",
            bytes.len()
        ))
    })
}
