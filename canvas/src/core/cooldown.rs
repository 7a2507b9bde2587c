//! Per-identity rate limiting.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace};

/// Outcome of asking the gate to admit one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied { remaining: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Tracks when each identity last had a mutation accepted.
///
/// Records live in a sharded map: calls for the same identity serialize on
/// that identity's entry, calls for unrelated identities do not contend on a
/// shared lock. Expiry is evaluated lazily; [`CooldownGate::prune`] only
/// reclaims memory.
pub struct CooldownGate {
    duration: Duration,
    records: DashMap<String, Instant>,
}

impl CooldownGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            records: DashMap::new(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Admit `identity` at `now` if it has no live record.
    ///
    /// On admission `now` becomes the identity's new timestamp. On denial the
    /// record is left untouched and the remaining wait is reported.
    pub fn admit(&self, identity: &str, now: Instant) -> Admission {
        match self.records.entry(identity.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                trace!(identity, "admitted (no record)");
                Admission::Admitted
            }
            Entry::Occupied(mut entry) => {
                let elapsed = now.saturating_duration_since(*entry.get());
                if elapsed >= self.duration {
                    entry.insert(now);
                    trace!(identity, "admitted (record expired)");
                    Admission::Admitted
                } else {
                    let remaining = self.duration - elapsed;
                    debug!(identity, remaining_ms = remaining.as_millis() as u64, "cooldown active");
                    Admission::Denied { remaining }
                }
            }
        }
    }

    /// Remaining wait for `identity` at `now`, without recording anything.
    pub fn remaining(&self, identity: &str, now: Instant) -> Option<Duration> {
        let last = *self.records.get(identity)?;
        let elapsed = now.saturating_duration_since(last);
        self.duration.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Drop records that have expired at `now`. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, last| now.saturating_duration_since(*last) < self.duration);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            debug!(removed, "pruned expired cooldown records");
        }
        removed
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
