//! PKCS#7-style padding to a fixed block size.

/// Pad `data` up to the next multiple of `block_size`.
///
/// Appends `n = block_size - data.len() % block_size` bytes, each equal to `n`.
/// Already aligned input gets a full extra block, so `n` is always in
/// `1..=block_size`.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!((1..=255).contains(&block_size));
    let n = block_size - data.len() % block_size;
    let mut out = Vec::with_capacity(data.len() + n);
    out.extend_from_slice(data);
    out.resize(data.len() + n, n as u8);
    out
}

/// Strip the padding added by [`pad`].
///
/// Reads the last byte `n` and drops the trailing `n` bytes. The padding bytes
/// themselves are not checked against `n`, which keeps values written by older
/// writers readable. Returns `None` when the input is empty or `n` exceeds the
/// input length.
pub fn unpad(data: &[u8]) -> Option<&[u8]> {
    let n = *data.last()? as usize;
    let keep = data.len().checked_sub(n)?;
    Some(&data[..keep])
}
