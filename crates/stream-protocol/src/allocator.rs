//! Signal-number allocator (spec §4.3).

use std::sync::Mutex;

const SIGNAL_NUMBER_MASK: u32 = 0x000f_ffff;
const MAX_SIGNAL_NUMBER: u32 = SIGNAL_NUMBER_MASK;

/// Hands out 20-bit signal numbers, unique within the allocator's
/// lifetime, skipping zero (reserved for stream-scoped meta).
///
/// A real producer process has exactly one allocator shared by every
/// signal it constructs (replacing the source's hidden process-global
/// counter with an explicit, injectable handle — see DESIGN.md).
#[derive(Debug)]
pub struct SignalNumberAllocator {
    next: Mutex<u32>,
}

impl Default for SignalNumberAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalNumberAllocator {
    pub fn new() -> Self {
        Self { next: Mutex::new(0) }
    }

    /// Allocates the next signal number, or `None` if the 20-bit space
    /// has been exhausted (2²⁰−1 live allocations since construction).
    /// The source leaves this behaviour unspecified; this
    /// implementation saturates rather than reusing a number or
    /// wrapping silently, since either would violate the
    /// no-two-live-signals-share-a-number invariant (spec §8, resolved
    /// in DESIGN.md).
    pub fn allocate(&self) -> Option<u32> {
        let mut next = self.next.lock().unwrap();
        if *next >= MAX_SIGNAL_NUMBER {
            tracing::warn!(max = MAX_SIGNAL_NUMBER, "signal number space exhausted");
            return None;
        }
        *next += 1;
        let masked = *next & SIGNAL_NUMBER_MASK;
        let number = if masked == 0 {
            *next += 1;
            *next & SIGNAL_NUMBER_MASK
        } else {
            masked
        };
        Some(number)
    }
}
