//! XOR payload masking (RFC 6455 section 5.3).

/// Byte-by-byte XOR masking. Masking and unmasking are the same operation.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time XOR masking: processes 4 bytes per iteration, falling back
/// to byte XOR for the tail.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let (chunks, tail) = data.split_at_mut(data.len() - data.len() % 4);

    for chunk in chunks.chunks_exact_mut(4) {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    for (i, byte) in tail.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}
