//! Per-provider cooldown tracking after throttling failures.
//!
//! A provider that answered with a throttling failure is excluded from
//! candidate selection until its cooldown expires. Entries live only in memory,
//! are owned by one tracker instance (never a process-wide singleton), and are
//! removed lazily on the first read after expiry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::ProviderId;

/// Default cooldown window applied by [`CooldownTracker::mark_throttled`].
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Upper bound on any single cooldown, whatever the provider asks for.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time source, injected so expiry can be tested without sleeping.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves the clock forward by `by`. Clones share the same time.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Remaining cooldown for one provider, as reported by
/// [`CooldownTracker::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStatus {
    pub provider: ProviderId,
    pub remaining: Duration,
}

/// Tracks cooldown expiries per provider.
///
/// All operations are total and synchronous. The map is guarded by a mutex so
/// a single tracker can be shared (via `Arc`) by concurrent orchestration runs
/// without lost updates.
#[derive(Debug)]
pub struct CooldownTracker {
    window: Duration,
    clock: Arc<dyn Clock>,
    /// Provider id -> cooldown expiry.
    entries: Mutex<HashMap<ProviderId, Instant>>,
}

impl CooldownTracker {
    /// Creates a tracker with the given window on the system clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The configured cooldown window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if `provider` is not cooling down.
    pub fn is_eligible(&self, provider: &ProviderId) -> bool {
        self.remaining_cooldown(provider).is_zero()
    }

    /// Starts (or restarts) the default cooldown window for `provider`.
    pub fn mark_throttled(&self, provider: &ProviderId) {
        self.mark_throttled_for(provider, None);
    }

    /// Starts a cooldown of `max(window, retry_after)`, capped at
    /// [`MAX_COOLDOWN`].
    ///
    /// An existing later expiry is never shortened.
    pub fn mark_throttled_for(&self, provider: &ProviderId, retry_after: Option<Duration>) {
        let cooldown = retry_after
            .map_or(self.window, |hint| hint.max(self.window))
            .min(MAX_COOLDOWN);
        let now = self.clock.now();
        let expiry = now
            .checked_add(cooldown)
            .or_else(|| now.checked_add(MAX_COOLDOWN))
            .unwrap_or(now);
        let mut entries = self.lock();
        let slot = entries.entry(provider.clone()).or_insert(expiry);
        if *slot < expiry {
            *slot = expiry;
        }
        tracing::info!(
            provider = %provider,
            cooldown_ms = cooldown.as_millis() as u64,
            "provider marked throttled"
        );
    }

    /// Time until `provider` becomes eligible again; zero when eligible.
    ///
    /// Removes the entry if it has expired.
    pub fn remaining_cooldown(&self, provider: &ProviderId) -> Duration {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(provider) {
            Some(expiry) if *expiry > now => *expiry - now,
            Some(_) => {
                entries.remove(provider);
                Duration::ZERO
            }
            None => Duration::ZERO,
        }
    }

    /// All providers currently cooling down, sorted by provider id.
    ///
    /// Expired entries are pruned as a side effect; the observable eligibility
    /// set is unaffected by the pruning.
    pub fn status(&self) -> Vec<CooldownStatus> {
        let now = self.clock.now();
        let mut entries = self.lock();
        entries.retain(|_, expiry| *expiry > now);
        let mut status: Vec<CooldownStatus> = entries
            .iter()
            .map(|(provider, expiry)| CooldownStatus {
                provider: provider.clone(),
                remaining: *expiry - now,
            })
            .collect();
        status.sort_by(|a, b| a.provider.cmp(&b.provider));
        status
    }

    /// Removes any cooldown for `provider`.
    pub fn clear(&self, provider: &ProviderId) {
        self.lock().remove(provider);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProviderId, Instant>> {
        // Every mutation leaves the map consistent, so a poisoned lock is safe to reuse.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
