//! Bookkeeping of packet counters seen on one link.
//!
//! Nonce uniqueness is the pad's responsibility; the host only observes.
//! A repeated counter is still decrypted and authenticated as usual but is
//! reported here so diagnostics can surface a misbehaving peer.

const WORDS: usize = 16;
/// Counters tracked behind the newest one.
pub const WINDOW_SIZE: u64 = (WORDS * 64) as u64;

/// How a counter relates to what the link has already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterObservation {
    /// Not seen before.
    Fresh,
    /// Already seen inside the window.
    Repeated,
    /// Too far behind the newest counter to tell.
    BehindWindow,
}

/// Sliding bitmap over the most recent [`WINDOW_SIZE`] counters.
///
/// Bit `i` of the bitmap stands for counter `window_start + i`.
#[derive(Debug, Clone)]
pub struct CounterWindow {
    window_start: u64,
    seen: [u64; WORDS],
    distinct: u64,
    repeated: u64,
}

impl Default for CounterWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterWindow {
    pub fn new() -> Self {
        Self {
            window_start: 0,
            seen: [0; WORDS],
            distinct: 0,
            repeated: 0,
        }
    }

    /// Record `counter` and classify it.
    pub fn observe(&mut self, counter: u32) -> CounterObservation {
        let counter = u64::from(counter);

        if counter < self.window_start {
            return CounterObservation::BehindWindow;
        }

        if counter - self.window_start >= WINDOW_SIZE {
            self.slide_to(counter);
        }

        let offset = counter - self.window_start;
        let word = (offset / 64) as usize;
        let mask = 1u64 << (offset % 64);

        if self.seen[word] & mask != 0 {
            self.repeated += 1;
            return CounterObservation::Repeated;
        }

        self.seen[word] |= mask;
        self.distinct += 1;
        CounterObservation::Fresh
    }

    /// Number of distinct counters observed over the window's lifetime.
    pub fn distinct(&self) -> u64 {
        self.distinct
    }

    /// Number of counters observed more than once.
    pub fn repeated(&self) -> u64 {
        self.repeated
    }

    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    /// Move the window so `counter` lands in its last word.
    fn slide_to(&mut self, counter: u64) {
        let last_word_start = counter - (counter % 64);
        let new_start = last_word_start.saturating_sub(WINDOW_SIZE - 64);
        let shift_words = ((new_start - self.window_start) / 64) as usize;

        if shift_words >= WORDS {
            self.seen = [0; WORDS];
        } else {
            self.seen.copy_within(shift_words.., 0);
            for w in &mut self.seen[WORDS - shift_words..] {
                *w = 0;
            }
        }

        self.window_start = new_start;
    }
}
