use std::fmt;

/// Counters every provider keeps about the blocks it has handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub allocations: u64,
    pub reallocations: u64,
    pub frees: u64,
    pub failures: u64,
}

impl AllocStats {
    pub fn is_balanced(&self) -> bool {
        self.live_blocks == 0 && self.live_bytes == 0
    }

    pub(crate) fn on_alloc(&mut self, size: usize) {
        self.live_blocks += 1;
        self.live_bytes += size;
        self.allocations += 1;
    }

    pub(crate) fn on_realloc(&mut self, old: usize, new: usize) {
        self.live_bytes = self.live_bytes - old + new;
        self.reallocations += 1;
    }

    pub(crate) fn on_free(&mut self, size: usize) {
        self.live_blocks = self.live_blocks.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(size);
        self.frees += 1;
    }

    pub(crate) fn on_failure(&mut self) {
        self.failures += 1;
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live_blocks={} live_bytes={} allocs={} reallocs={} frees={} failures={}",
            self.live_blocks,
            self.live_bytes,
            self.allocations,
            self.reallocations,
            self.frees,
            self.failures
        )
    }
}
