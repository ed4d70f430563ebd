/// XOR `payload` with `key`, cycling every four bytes.
///
/// The cycle starts at `key[0]` for the first byte of the slice, so callers
/// must pass exactly one frame's payload.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    let mut chunks = payload.chunks_exact_mut(4);
    for chunk in &mut chunks {
        chunk[0] ^= key[0];
        chunk[1] ^= key[1];
        chunk[2] ^= key[2];
        chunk[3] ^= key[3];
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(key) {
        *byte ^= k;
    }
}
