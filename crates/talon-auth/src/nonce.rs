//! Replay defense: the nonce guard contract and built-in implementations.
//!
//! A nonce is only meaningful within the timestamp freshness window, so a
//! guard only needs to remember `(id, nonce)` pairs for roughly one window's
//! worth of time. The guard is the single point of shared mutation between
//! concurrent requests and must provide atomic check-and-insert semantics.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::warn;

/// Trait for atomically recording nonce sightings.
///
/// Implementations must be internally synchronized: two concurrent calls with
/// the same `(id, nonce)` pair must not both report a first sighting.
/// Implementations that cannot answer (store unreachable) must fail closed
/// and report `false`.
#[async_trait::async_trait]
pub trait NonceGuard: Send + Sync {
    /// Record `(id, nonce)` and report whether this is its first sighting
    /// within the freshness window. `ts` is the request timestamp in unix
    /// seconds, usable for bucketing or expiry.
    async fn first_use(&self, id: &str, nonce: &str, ts: u64) -> bool;
}

/// Guard that accepts every nonce.
///
/// This is the default so the engine works out of the box, but it provides no
/// replay protection; a production deployment must supply a real store. A
/// warning is logged at construction.
#[derive(Debug, Clone, Copy)]
pub struct AcceptAllGuard;

impl AcceptAllGuard {
    /// Create the guard, logging that replay protection is disabled.
    #[must_use]
    pub fn new() -> Self {
        warn!("nonce guard disabled; replayed requests will not be detected");
        Self
    }
}

impl Default for AcceptAllGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl NonceGuard for AcceptAllGuard {
    async fn first_use(&self, _id: &str, _nonce: &str, _ts: u64) -> bool {
        true
    }
}

/// In-process nonce guard backed by a concurrent map.
///
/// Entries expire after `ttl_secs` (normally the clock-skew window, doubled
/// to cover skew in both directions). Expired entries are swept lazily every
/// [`SWEEP_INTERVAL`] insertions, keeping the common path lock-free.
///
/// # Examples
///
/// ```
/// use talon_auth::nonce::MemoryNonceGuard;
///
/// let guard = MemoryNonceGuard::new(120);
/// ```
#[derive(Debug)]
pub struct MemoryNonceGuard {
    seen: DashMap<(String, String), u64>,
    ttl_secs: u64,
    calls: AtomicU64,
}

/// Insertions between expiry sweeps.
const SWEEP_INTERVAL: u64 = 1024;

impl MemoryNonceGuard {
    /// Create a guard whose entries expire after `ttl_secs`.
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            seen: DashMap::new(),
            ttl_secs,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of live entries. Mostly useful for tests and metrics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the guard has no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn sweep(&self, now: u64) {
        let ttl = self.ttl_secs;
        self.seen.retain(|_, seen_at| now.saturating_sub(*seen_at) <= ttl);
    }
}

#[async_trait::async_trait]
impl NonceGuard for MemoryNonceGuard {
    async fn first_use(&self, id: &str, nonce: &str, ts: u64) -> bool {
        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep(ts);
        }

        match self.seen.entry((id.to_owned(), nonce.to_owned())) {
            dashmap::Entry::Occupied(mut entry) => {
                // A stale record that the sweep has not reached yet aged out
                // of the window; the nonce may be reused.
                if ts.saturating_sub(*entry.get()) > self.ttl_secs {
                    entry.insert(ts);
                    true
                } else {
                    false
                }
            }
            dashmap::Entry::Vacant(entry) => {
                entry.insert(ts);
                true
            }
        }
    }
}
