use std::hash::{BuildHasherDefault, Hasher};

/// 32-bit FNV-1a.
///
/// Both hash tables default to this hasher: it is cheap, spreads short keys
/// (strings, small integers) well enough for chaining and linear probing, and
/// keeps hash values reproducible across runs, which the chained table's
/// hash-sorted ordering makes directly observable.
pub struct FnvHasher {
    state: u32,
}

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

impl Default for FnvHasher {
    fn default() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Hasher for FnvHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state as u64
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u32;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

pub type FnvBuildHasher = BuildHasherDefault<FnvHasher>;

#[cfg(test)]
mod tests {
    use super::FnvHasher;
    use std::hash::Hasher;

    fn fnv(bytes: &[u8]) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(bytes);
        hasher.finish()
    }

    #[test]
    fn reference_vectors() {
        // Values from the FNV reference implementation.
        assert_eq!(fnv(b""), 0x811c_9dc5);
        assert_eq!(fnv(b"a"), 0xe40c_292c);
        assert_eq!(fnv(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn distinct_short_keys() {
        assert_ne!(fnv(b"ab"), fnv(b"ba"));
    }
}
