use md5::{Digest, Md5};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hex-encoded MD5 of a generated collector configuration.
///
/// The digest is stamped onto the workload's pod template so that any configuration change rolls
/// the collector pods.
pub fn config_hash(config: &str) -> String {
    format!("{:x}", Md5::digest(config.as_bytes()))
}

/// 64-bit FNV-1a over a sequence of byte chunks.
///
/// Each chunk is followed by a zero byte so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fnv1a64<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for chunk in chunks {
        for b in chunk.iter().chain(std::iter::once(&0u8)) {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_of_known_input() {
        assert_eq!(config_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            config_hash("[sources]\n"),
            config_hash("[sources]\n"),
            "hash must be stable"
        );
        assert_ne!(config_hash("a"), config_hash("b"));
    }

    #[test]
    fn fnv_chunk_boundaries_matter() {
        let a = fnv1a64([b"ab".as_slice(), b"c".as_slice()]);
        let b = fnv1a64([b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(a, b);
        assert_eq!(fnv1a64(std::iter::empty()), FNV_OFFSET_BASIS);
    }
}
