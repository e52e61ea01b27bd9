//! The out-of-order nonce window (anti-replay with bounded reordering
//! tolerance).
//!
//! Two orthogonal notions of "oldest" are in play: acceptance compares
//! against the *smallest nonce value* currently held (an arriving packet
//! older than that is definitely a replay or too late), while trimming
//! evicts by *arrival time* (so a burst of reordered-but-recent packets
//! doesn't get discarded just because the window briefly grew past
//! capacity). A `BTreeSet` gives the former in O(log n); a min-heap over
//! arrival time, lazily cleaned, gives the latter in amortized O(log n).

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use super::nonce::Nonce;

/// Bounded, time-aware record of recently accepted nonces.
pub struct NonceWindow {
    capacity: usize,
    duration: Duration,
    newest: Option<Nonce>,
    members: BTreeSet<Nonce>,
    arrival_of: HashMap<Nonce, Instant>,
    by_arrival: BinaryHeap<Reverse<(Instant, Nonce)>>,
}

impl NonceWindow {
    /// Create an empty window with the given capacity and duration.
    pub fn new(capacity: usize, duration: Duration) -> Self {
        Self {
            capacity,
            duration,
            newest: None,
            members: BTreeSet::new(),
            arrival_of: HashMap::new(),
            by_arrival: BinaryHeap::new(),
        }
    }

    /// The newest nonce accepted so far (`theirNonce`), if any.
    pub fn newest(&self) -> Option<Nonce> {
        self.newest
    }

    /// Decide whether `n` should be accepted, without recording it.
    pub fn is_acceptable(&self, n: Nonce) -> bool {
        match self.newest {
            None => true,
            Some(newest) => {
                if n.minus(&newest) > 0 {
                    return true;
                }
                match self.members.iter().next() {
                    Some(oldest) => n.minus(oldest) > 0 && !self.members.contains(&n),
                    None => false,
                }
            }
        }
    }

    /// Record an accepted nonce: update `theirNonce`, insert into the
    /// window, and trim. Callers must check [`NonceWindow::is_acceptable`]
    /// first; this does not re-check.
    pub fn record(&mut self, n: Nonce, now: Instant) {
        if self.newest.is_none_or(|newest| n.minus(&newest) > 0) {
            self.newest = Some(n);
        }
        self.members.insert(n);
        self.arrival_of.insert(n, now);
        self.by_arrival.push(Reverse((now, n)));
        self.trim(now);
    }

    /// Reset the window entirely (e.g. on ephemeral-key rotation).
    pub fn reset(&mut self) {
        self.newest = None;
        self.members.clear();
        self.arrival_of.clear();
        self.by_arrival.clear();
    }

    /// Number of nonces currently tracked.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true` if the window holds no entries.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn trim(&mut self, now: Instant) {
        while self.members.len() > self.capacity {
            let Some(Reverse((arrived, candidate))) = self.by_arrival.peek().copied() else {
                break;
            };
            // Lazy deletion: this heap entry may be stale if `candidate`
            // was already evicted (or re-recorded, which cannot happen
            // since `record` never revisits an accepted nonce).
            if self.arrival_of.get(&candidate) != Some(&arrived) {
                self.by_arrival.pop();
                continue;
            }
            if now.duration_since(arrived) > self.duration {
                self.by_arrival.pop();
                self.members.remove(&candidate);
                self.arrival_of.remove(&candidate);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce(counter: u64) -> Nonce {
        Nonce::from_counter(counter, false)
    }

    #[test]
    fn accepts_strictly_newer_and_updates_theirnonce() {
        let mut w = NonceWindow::new(64, Duration::from_secs(1));
        let now = Instant::now();
        assert!(w.is_acceptable(nonce(10)));
        w.record(nonce(10), now);
        assert_eq!(w.newest(), Some(nonce(10)));
        assert!(w.is_acceptable(nonce(12)));
        assert!(!w.is_acceptable(nonce(10)));
    }

    #[test]
    fn accepts_reordered_within_window_once() {
        let mut w = NonceWindow::new(64, Duration::from_secs(1));
        let now = Instant::now();
        for c in [10u64, 14, 12, 16] {
            assert!(w.is_acceptable(nonce(c)), "nonce {c} should be accepted");
            w.record(nonce(c), now);
        }
        assert_eq!(w.newest(), Some(nonce(16)));
        assert_eq!(w.len(), 4);
        // Replay of an already-accepted, non-newest nonce is rejected.
        assert!(!w.is_acceptable(nonce(12)));
    }

    #[test]
    fn rejects_nonce_older_than_window_floor() {
        let mut w = NonceWindow::new(2, Duration::from_secs(1));
        let now = Instant::now();
        w.record(nonce(100), now);
        w.record(nonce(102), now);
        // 1 is far below the smallest tracked nonce (100).
        assert!(!w.is_acceptable(nonce(1)));
    }

    #[test]
    fn trims_entries_older_than_duration_once_over_capacity() {
        let mut w = NonceWindow::new(2, Duration::from_millis(10));
        let t0 = Instant::now();
        w.record(nonce(10), t0);
        w.record(nonce(12), t0);
        assert_eq!(w.len(), 2);
        let later = t0 + Duration::from_millis(20);
        w.record(nonce(14), later);
        // entry for nonce(10) is older than the 10ms duration, gets trimmed
        assert_eq!(w.len(), 2);
        assert!(!w.is_acceptable(nonce(10)));
    }

    #[test]
    fn reset_clears_everything() {
        let mut w = NonceWindow::new(64, Duration::from_secs(1));
        w.record(nonce(5), Instant::now());
        w.reset();
        assert!(w.is_empty());
        assert_eq!(w.newest(), None);
    }
}
