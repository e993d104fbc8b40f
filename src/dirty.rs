//! The dirty-tracking fast path.
//!
//! Each tracked record owns a bit index sized to its member count. A single
//! setter mutation per instrumented member marks its bit; the diff engine,
//! when a descriptor exposes a tracker, enumerates only the popped bits
//! instead of walking every member.
//!
//! Two variants are provided, splitting plain from atomic state the way a
//! single-writer/multi-writer delta pipeline usually does: `BitIndex`
//! (cheapest, must not be shared across threads) and `AtomicBitIndex`
//! (unlimited concurrent writers, single `pop_next` consumer, CAS clearing,
//! no lost updates under arbitrary interleavings).

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::document::MemberIndex;

const WORD_BITS: usize = 64;

/// The interface the engine consumes for dirty-bit enumeration. Uses
/// `&self` throughout so both interior-mutable variants below share one
/// trait regardless of thread-safety discipline.
pub trait DirtyTracker {
    /// Set `bit`. Idempotent - marking an already-set bit changes nothing.
    fn mark(&self, bit: usize);

    /// Whether any bit is currently set.
    fn has_any(&self) -> bool;

    /// Pop and clear the lowest set bit, if any. Successive calls yield
    /// bits in strictly ascending order (per `pop_next`'s own state, which
    /// shrinks after each pop).
    fn pop_next(&self) -> Option<usize>;

    /// Clear every bit (called by the applicator after a successful apply).
    fn clear_all(&self);
}

/// Single-threaded bit index. Must not be shared across threads - there is
/// no synchronisation between `mark` and `pop_next`.
pub struct BitIndex {
    words: Vec<Cell<u64>>,
}

impl BitIndex {
    /// A bit index sized to hold at least `num_bits` bits.
    pub fn new(num_bits: usize) -> Self {
        let num_words = num_bits.div_ceil(WORD_BITS).max(1);
        Self {
            words: (0..num_words).map(|_| Cell::new(0)).collect(),
        }
    }
}

impl DirtyTracker for BitIndex {
    fn mark(&self, bit: usize) {
        let (word, offset) = (bit / WORD_BITS, bit % WORD_BITS);
        let current = self.words[word].get();
        self.words[word].set(current | (1u64 << offset));
    }

    fn has_any(&self) -> bool {
        self.words.iter().any(|w| w.get() != 0)
    }

    fn pop_next(&self) -> Option<usize> {
        for (i, word) in self.words.iter().enumerate() {
            let value = word.get();
            if value != 0 {
                let offset = value.trailing_zeros() as usize;
                word.set(value & !(1u64 << offset));
                return Some(i * WORD_BITS + offset);
            }
        }
        None
    }

    fn clear_all(&self) {
        for word in &self.words {
            word.set(0);
        }
    }
}

/// Concurrent bit index: unlimited concurrent `mark` writers, a single
/// `pop_next` consumer. Clearing uses compare-and-swap so a writer that
/// sets a bit between the consumer's load and its swap is never lost - the
/// CAS simply fails and retries against the new word value.
pub struct AtomicBitIndex {
    words: Vec<AtomicU64>,
}

impl AtomicBitIndex {
    /// An atomic bit index sized to hold at least `num_bits` bits.
    pub fn new(num_bits: usize) -> Self {
        let num_words = num_bits.div_ceil(WORD_BITS).max(1);
        Self {
            words: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
        }
    }
}

impl DirtyTracker for AtomicBitIndex {
    fn mark(&self, bit: usize) {
        let (word, offset) = (bit / WORD_BITS, bit % WORD_BITS);
        self.words[word].fetch_or(1u64 << offset, Ordering::AcqRel);
    }

    fn has_any(&self) -> bool {
        self.words.iter().any(|w| w.load(Ordering::Acquire) != 0)
    }

    fn pop_next(&self) -> Option<usize> {
        for (i, word) in self.words.iter().enumerate() {
            loop {
                let value = word.load(Ordering::Acquire);
                if value == 0 {
                    break;
                }
                let offset = value.trailing_zeros() as usize;
                let cleared = value & !(1u64 << offset);
                match word.compare_exchange_weak(
                    value,
                    cleared,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return Some(i * WORD_BITS + offset),
                    Err(_) => continue,
                }
            }
        }
        None
    }

    fn clear_all(&self) {
        for word in &self.words {
            word.store(0, Ordering::Release);
        }
    }
}

/// One recorded member write, for the bounded recent-event log.
#[derive(Debug, Clone, Copy)]
pub struct AccessEvent {
    /// Member that was written.
    pub member_index: MemberIndex,
    /// Wall-clock time of the write, nanoseconds since the Unix epoch.
    pub timestamp_nanos: u128,
    /// Caller-pushed scope label active at the time of the write, if any.
    pub scope: Option<&'static str>,
}

thread_local! {
    static SCOPE_STACK: std::cell::RefCell<Vec<&'static str>> = const { std::cell::RefCell::new(Vec::new()) };
}

/// RAII guard returned by `push_scope`; pops the label on drop.
pub struct ScopeGuard {
    _private: (),
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Push a scope label onto the current thread's stack for the lifetime of
/// the returned guard. Access events recorded while the guard is alive are
/// tagged with this label.
pub fn push_scope(label: &'static str) -> ScopeGuard {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(label));
    ScopeGuard { _private: () }
}

fn current_scope() -> Option<&'static str> {
    SCOPE_STACK.with(|stack| stack.borrow().last().copied())
}

/// Orthogonal, optional per-member access telemetry. Never influences delta
/// emission - purely read-only instrumentation.
pub struct AccessTracker {
    counters: Vec<AtomicU64>,
    recent: Mutex<VecDeque<AccessEvent>>,
    recent_capacity: usize,
    #[cfg(feature = "metrics")]
    prom_writes: Option<prometheus::IntCounterVec>,
}

impl AccessTracker {
    /// A tracker for `num_members` members, keeping at most
    /// `recent_capacity` events in its ring buffer.
    pub fn new(num_members: usize, recent_capacity: usize) -> Self {
        Self {
            counters: (0..num_members).map(|_| AtomicU64::new(0)).collect(),
            recent: Mutex::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
            #[cfg(feature = "metrics")]
            prom_writes: None,
        }
    }

    /// Register a prometheus counter vector (labeled by scope) to mirror
    /// writes into, alongside the in-process counters.
    #[cfg(feature = "metrics")]
    pub fn with_prometheus(mut self, counter: prometheus::IntCounterVec) -> Self {
        self.prom_writes = Some(counter);
        self
    }

    /// Record a write to `member_index`, tagged with the current scope.
    pub fn record_write(&self, member_index: MemberIndex) {
        if let Some(counter) = self.counters.get(member_index as usize) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        let scope = current_scope();
        let event = AccessEvent {
            member_index,
            timestamp_nanos: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            scope,
        };

        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.recent_capacity {
                recent.pop_front();
            }
            recent.push_back(event);
        }

        #[cfg(feature = "metrics")]
        if let Some(counter) = &self.prom_writes {
            counter
                .with_label_values(&[scope.unwrap_or("unscoped")])
                .inc();
        }
    }

    /// Total writes recorded for `member_index` since construction.
    pub fn write_count(&self, member_index: MemberIndex) -> u64 {
        self.counters
            .get(member_index as usize)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// A snapshot of the bounded recent-event log, oldest first.
    pub fn recent_events(&self) -> Vec<AccessEvent> {
        self.recent
            .lock()
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_next_yields_ascending_bits() {
        let idx = BitIndex::new(130);
        idx.mark(65);
        idx.mark(3);
        idx.mark(129);
        idx.mark(3); // idempotent re-mark

        assert_eq!(idx.pop_next(), Some(3));
        assert_eq!(idx.pop_next(), Some(65));
        assert_eq!(idx.pop_next(), Some(129));
        assert_eq!(idx.pop_next(), None);
        assert!(!idx.has_any());
    }

    #[test]
    fn atomic_pop_next_yields_ascending_bits() {
        let idx = AtomicBitIndex::new(130);
        idx.mark(65);
        idx.mark(3);
        idx.mark(129);

        assert_eq!(idx.pop_next(), Some(3));
        assert_eq!(idx.pop_next(), Some(65));
        assert_eq!(idx.pop_next(), Some(129));
        assert_eq!(idx.pop_next(), None);
    }

    #[test]
    fn atomic_concurrent_marks_are_not_lost() {
        use std::sync::Arc;
        use std::thread;

        let idx = Arc::new(AtomicBitIndex::new(256));
        let mut handles = Vec::new();
        for t in 0..8 {
            let idx = Arc::clone(&idx);
            handles.push(thread::spawn(move || {
                for i in 0..16 {
                    idx.mark(t * 16 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut popped = Vec::new();
        while let Some(bit) = idx.pop_next() {
            popped.push(bit);
        }
        popped.sort_unstable();
        let expected: Vec<usize> = (0..128).collect();
        assert_eq!(popped, expected);
    }

    #[test]
    fn clear_all_resets_every_word() {
        let idx = BitIndex::new(64);
        idx.mark(10);
        idx.mark(20);
        idx.clear_all();
        assert!(!idx.has_any());
    }

    #[test]
    fn access_tracker_counts_and_bounds_recent_log() {
        let tracker = AccessTracker::new(4, 2);
        {
            let _g = push_scope("import");
            tracker.record_write(1);
            tracker.record_write(1);
            tracker.record_write(2);
        }
        assert_eq!(tracker.write_count(1), 2);
        assert_eq!(tracker.write_count(2), 1);
        let recent = tracker.recent_events();
        assert_eq!(recent.len(), 2); // bounded to capacity
        assert_eq!(recent.last().unwrap().scope, Some("import"));
    }
}
