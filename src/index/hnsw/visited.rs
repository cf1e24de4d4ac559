//! Bitset of visited graph nodes for a single traversal.

/// One bit per node. Allocated per search so concurrent readers never share it.
#[derive(Debug)]
pub struct VisitedSet {
    words: Vec<u64>,
}

impl VisitedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Mark `id` as visited. Returns `true` if it was not visited before.
    #[inline]
    pub fn insert(&mut self, id: u32) -> bool {
        let idx = id as usize;
        let word = idx / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << (idx % 64);
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}
