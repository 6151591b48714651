use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};

use files::FileId;
use rustc_hash::FxHasher;

/// A 128-bit content hash.
///
/// The two halves come from independent hash functions so that an accidental
/// collision in one lane does not alias two distinct inputs. Both hashers are
/// seeded deterministically, which keeps fingerprints stable across runs of
/// the same build.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u64, u64);

impl Fingerprint {
    pub const ZERO: Fingerprint = Fingerprint(0, 0);

    pub fn of<T: Hash + ?Sized>(value: &T) -> Fingerprint {
        let mut hasher = FingerprintHasher::default();
        value.hash(&mut hasher);
        hasher.finish_fingerprint()
    }

    /// Order-dependent combination of two fingerprints.
    pub fn combine(self, other: Fingerprint) -> Fingerprint {
        Fingerprint::of(&(self, other))
    }

    pub fn combine_all(fingerprints: impl IntoIterator<Item = Fingerprint>) -> Fingerprint {
        fingerprints.into_iter().fold(Fingerprint::ZERO, Fingerprint::combine)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x}{:016x})", self.0, self.1)
    }
}

#[derive(Default)]
pub struct FingerprintHasher {
    fast: FxHasher,
    sip: DefaultHasher,
}

impl FingerprintHasher {
    pub fn finish_fingerprint(&self) -> Fingerprint {
        Fingerprint(self.fast.finish(), self.sip.finish())
    }
}

impl Hasher for FingerprintHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.fast.write(bytes);
        self.sip.write(bytes);
    }

    fn finish(&self) -> u64 {
        self.fast.finish() ^ self.sip.finish()
    }
}

/// Identity of a top-level block.
///
/// Blocks with identical content in the same document are told apart by
/// their occurrence index, counted among blocks with the same fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdentity {
    pub file: FileId,
    pub fingerprint: Fingerprint,
    pub occurrence: u32,
}

impl NodeIdentity {
    pub fn new(file: FileId, fingerprint: Fingerprint, occurrence: u32) -> NodeIdentity {
        NodeIdentity { file, fingerprint, occurrence }
    }
}

#[cfg(test)]
mod tests {
    use super::Fingerprint;

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(Fingerprint::of("paragraph"), Fingerprint::of("paragraph"));
        assert_ne!(Fingerprint::of("paragraph"), Fingerprint::of("paragraphs"));
    }

    #[test]
    fn test_combine_order() {
        let a = Fingerprint::of("a");
        let b = Fingerprint::of("b");
        assert_ne!(a.combine(b), b.combine(a));
        assert_eq!(Fingerprint::combine_all([a, b]), Fingerprint::ZERO.combine(a).combine(b));
    }
}
