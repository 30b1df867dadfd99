/// Render generation counter.
///
/// Every render pass takes a token from `begin_pass` and checks `is_current` after each
/// suspension point. A pass whose token is no longer current stops without publishing,
/// so overlapping passes converge on the last one issued.
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationToken(u64);

impl GenerationToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Monotonic counter; starts at 0, never reset or decremented.
#[derive(Debug, Default)]
pub struct RenderGeneration {
    current: AtomicU64,
}

impl RenderGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass: bump the counter and return the new value.
    pub fn begin_pass(&self) -> GenerationToken {
        GenerationToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: GenerationToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.0
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
