//! Payload masking (RFC 6455 section 5.3).

/// XORs `buf` with the 4-byte masking key, starting at stride offset zero.
///
/// Full 4-byte strides are processed as native-endian words; the 1–3 byte
/// remainder is XORed byte-wise. Callers that stop on a stride boundary and
/// resume later must carry the remainder themselves so every invocation
/// starts on a fresh stride.
pub(crate) fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    let mask_word = u32::from_ne_bytes(mask);

    let mut chunks = buf.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ mask_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }

    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_mask(buf: &mut [u8], mask: [u8; 4]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    #[test]
    fn matches_bytewise_reference() {
        let mask = [0xA1, 0x02, 0xD3, 0x44];

        for len in 0..32 {
            let mut fast: std::vec::Vec<u8> = (0..len).map(|i| i as u8).collect();
            let mut reference = fast.clone();

            apply_mask(&mut fast, mask);
            reference_mask(&mut reference, mask);

            assert_eq!(fast, reference, "mismatch at len {len}");
        }
    }

    #[test]
    fn involution() {
        let mask = [0x01, 0x02, 0x03, 0x04];
        let original = *b"mask me twice, shame on me";

        let mut buf = original;
        apply_mask(&mut buf, mask);
        apply_mask(&mut buf, mask);

        assert_eq!(buf, original);
    }

    #[test]
    fn zero_key_is_identity() {
        let original = *b"nothing to see";

        let mut buf = original;
        apply_mask(&mut buf, [0; 4]);

        assert_eq!(buf, original);
    }
}
