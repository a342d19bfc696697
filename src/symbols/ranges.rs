/// A sorted set of symbol start addresses.
/// Each start implicitly covers every address up to the next start;
/// the last one covers everything above it.
#[derive(Debug, Clone, Default)]
pub struct SortedStarts {
    inner: Vec<u32>,
}

impl SortedStarts {
    #[inline]
    pub fn new() -> Self { Self { inner: vec![] } }

    pub fn insert(&mut self, start: u32) {
        if let Err(pos) = self.inner.binary_search(&start) {
            self.inner.insert(pos, start);
        }
    }

    /// Returns the start of the range containing `address` and the offset into it.
    pub fn find(&self, address: u32) -> Option<(u32, u32)> {
        let pos = match self.inner.binary_search(&address) {
            Ok(_) => return Some((address, 0)),
            Err(pos) => pos,
        };
        if pos == 0 {
            return None;
        }
        let start = self.inner[pos - 1];
        Some((start, address - start))
    }
}

/// Resolves `address` against each set in turn; the first set with a match wins.
///
/// Returns `(0, 0)` when nothing matches. A genuine match at address 0 with
/// offset 0 looks the same, so callers treat a zero start as unresolved.
pub fn resolve_range(address: u32, sets: &[&SortedStarts]) -> (u32, u32) {
    sets.iter().find_map(|set| set.find(address)).unwrap_or((0, 0))
}
