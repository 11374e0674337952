//! Chunk sequencing
//!
//! Assigns monotonic chunk numbers within one recording session. A new
//! session numbers from 1; an addendum continues from the session's
//! already-persisted chunk count so the externally-visible count never
//! shrinks back to the new-chunks-only figure.

/// How a recording relates to the session's existing chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Fresh session: numbering starts at 1
    New,
    /// Continuation: numbering starts after the persisted chunk count
    Addendum,
}

/// Per-session chunk number allocator.
///
/// `next()` is called once per emitted chunk from the single chunk-handling
/// task, so no internal synchronization is needed.
#[derive(Debug)]
pub struct ChunkSequencer {
    seed: u32,
    assigned: u32,
}

impl ChunkSequencer {
    /// Sequencer for a brand-new session.
    pub fn new_session() -> Self {
        Self { seed: 0, assigned: 0 }
    }

    /// Sequencer continuing an existing session with `seed` chunks
    /// already persisted. Callers must know the seed; guessing zero here
    /// would overwrite existing chunk numbers.
    pub fn addendum(seed: u32) -> Self {
        Self { seed, assigned: 0 }
    }

    /// Next chunk number, strictly increasing.
    pub fn next(&mut self) -> u32 {
        self.assigned += 1;
        self.seed + self.assigned
    }

    /// Chunks assigned by this sequencer (excluding the seed).
    pub fn assigned(&self) -> u32 {
        self.assigned
    }

    /// Session-wide chunk count: seed plus newly assigned chunks.
    pub fn chunk_count(&self) -> u32 {
        self.seed + self.assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_counts_from_one() {
        let mut seq = ChunkSequencer::new_session();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.next(), 3);
        assert_eq!(seq.chunk_count(), 3);
        assert_eq!(seq.assigned(), 3);
    }

    #[test]
    fn addendum_continues_from_seed() {
        let mut seq = ChunkSequencer::addendum(7);
        assert_eq!(seq.next(), 8);
        assert_eq!(seq.next(), 9);
        assert_eq!(seq.next(), 10);
        assert_eq!(seq.chunk_count(), 10);
        assert_eq!(seq.assigned(), 3);
    }

    #[test]
    fn count_reflects_seed_before_any_chunks() {
        let seq = ChunkSequencer::addendum(4);
        assert_eq!(seq.chunk_count(), 4);
        assert_eq!(seq.assigned(), 0);
    }
}
