use rustc_hash::FxBuildHasher;
use string_interner::{StringInterner, Symbol, backend::BucketBackend, symbol::SymbolU32};

/// A stable ID for names used in `\include{name}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IncludeNameId(SymbolU32);

impl Symbol for IncludeNameId {
    fn try_from_usize(index: usize) -> Option<IncludeNameId> {
        SymbolU32::try_from_usize(index).map(IncludeNameId)
    }

    fn to_usize(self) -> usize {
        SymbolU32::to_usize(self.0)
    }
}

pub struct IncludeNameInterner(StringInterner<BucketBackend<IncludeNameId>, FxBuildHasher>);

impl Default for IncludeNameInterner {
    fn default() -> IncludeNameInterner {
        IncludeNameInterner(StringInterner::new())
    }
}

impl IncludeNameInterner {
    pub fn intern(&mut self, name: &str) -> IncludeNameId {
        self.0.get_or_intern(name)
    }

    pub fn lookup(&self, name: &str) -> Option<IncludeNameId> {
        self.0.get(name)
    }

    pub fn resolve(&self, id: IncludeNameId) -> Option<&str> {
        self.0.resolve(id)
    }
}
