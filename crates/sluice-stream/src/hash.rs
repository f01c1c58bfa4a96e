//! FNV-1a frame checksums.
//!
//! Not cryptographic. Catches torn or corrupted frames, nothing more.

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

/// FNV-1a 64 over `bytes`.
///
/// Returns the offset basis for an empty slice.
pub fn checksum(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(FNV_PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_offset_basis() {
        assert_eq!(checksum(&[]), FNV_OFFSET);
    }

    #[test]
    fn known_vector() {
        // Published FNV-1a 64 test vector for "a".
        assert_eq!(checksum(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn byte_order_matters() {
        assert_ne!(checksum(&[1, 2]), checksum(&[2, 1]));
    }
}
