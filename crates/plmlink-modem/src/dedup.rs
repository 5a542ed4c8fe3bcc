use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

const PRUNE_THRESHOLD: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Seen {
    at: Instant,
    hops_left: u8,
}

/// Collapses repeated broadcast and cleanup frames into single events.
///
/// A frame is new if nothing was seen for its key, if its hops-left count
/// went up (a fresh transmission rather than a relayed copy), or if at
/// least `interval` has passed since the last frame for that key. Every
/// frame, new or not, becomes the reference for the next comparison.
#[derive(Debug)]
pub struct Deduplicator {
    interval: Duration,
    seen: HashMap<String, Seen>,
}

impl Deduplicator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            seen: HashMap::new(),
        }
    }

    /// Record a frame and report whether it is a new event.
    pub fn is_new(&mut self, key: &str, hops_left: u8, now: Instant) -> bool {
        let fresh = match self.seen.get(key) {
            None => true,
            Some(prev) => {
                hops_left > prev.hops_left || now.duration_since(prev.at) >= self.interval
            }
        };

        if self.seen.len() >= PRUNE_THRESHOLD {
            self.prune(now);
        }
        self.seen.insert(
            key.to_string(),
            Seen {
                at: now,
                hops_left,
            },
        );
        fresh
    }

    /// Forget keys whose last frame is older than the interval.
    pub fn prune(&mut self, now: Instant) {
        let interval = self.interval;
        self.seen
            .retain(|_, seen| now.duration_since(seen.at) < interval);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}
