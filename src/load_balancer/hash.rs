// src/load_balancer/hash.rs
//! 32-bit FNV-1a.

const OFFSET_BASIS: u32 = 0x811c_9dc5;
const PRIME: u32 = 0x0100_0193;

/// FNV-1a over the raw bytes of `input`. The empty input hashes to the
/// offset basis.
pub const fn fnv1a_32(input: &[u8]) -> u32 {
    let mut hash = OFFSET_BASIS;
    let mut i = 0;
    while i < input.len() {
        hash ^= input[i] as u32;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

pub fn hash_key(key: &str) -> u32 {
    fnv1a_32(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_string_is_offset_basis() {
        assert_eq!(hash_key(""), 0x811c9dc5);
    }

    #[test]
    fn matches_reference_vectors() {
        assert_eq!(hash_key("a"), 0xe40c292c);
        assert_eq!(hash_key("foobar"), 0xbf9cf968);
    }

    #[test]
    fn different_strings_differ() {
        assert_ne!(hash_key("hello"), hash_key("world"));
    }

    proptest! {
        #[test]
        fn is_deterministic(key in ".*") {
            prop_assert_eq!(hash_key(&key), hash_key(&key.clone()));
        }
    }
}
