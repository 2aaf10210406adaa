//! Generation-based cancellation.
//!
//! Every build takes a token from a shared [`CancellationSource`]. Issuing a
//! new token cancels all earlier ones, so starting a build implicitly cancels
//! the one in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancellationSource {
    current: Arc<AtomicU64>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a new generation, cancelling every earlier token.
    pub fn next_token(&self) -> CancellationToken {
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        CancellationToken {
            current: Arc::clone(&self.current),
            generation,
        }
    }

    /// Cancel every issued token without starting a new generation.
    pub fn cancel_all(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone)]
pub struct CancellationToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl CancellationToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        CancellationSource::new().next_token()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.generation
    }
}
