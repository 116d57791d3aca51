use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroU32,
    sync::Arc,
    time::{Duration, Instant},
};

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter as GovernorRateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Outcome of admitting a proposal past the cooldown/restart-budget gates
/// (spec.md §4.8). Does not speak to the global concurrency semaphore,
/// which is acquired separately once a proposal is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Admit,
    CooldownActive,
    RestartBudgetExhausted,
}

#[derive(Default)]
struct LedgerEntry {
    last_applied: Option<Instant>,
    restart_times: VecDeque<Instant>,
}

/// Per-`(namespace,pod,container)` cooldown and restart-count state (spec.md
/// §3 "Cooldown / Restart Ledger"). Guarded by a single lock over the whole
/// map; entries are small and operations are non-blocking, so a coarse lock
/// is cheaper than per-key locking at this scale (spec.md §5 "keyed, bounded
/// map with per-key mutex" is satisfied at the map granularity here).
pub struct CooldownLedger {
    entries: parking_lot::RwLock<HashMap<String, LedgerEntry>>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        CooldownLedger {
            entries: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    fn is_cooling_down(&self, key: &str, cooldown: Duration) -> bool {
        self.entries
            .read()
            .get(key)
            .and_then(|e| e.last_applied)
            .map(|last| last.elapsed() < cooldown)
            .unwrap_or(false)
    }

    fn restarts_in_last_hour(&self, key: &str) -> u32 {
        let mut entries = self.entries.write();
        let entry = entries.entry(key.to_owned()).or_default();
        prune_restart_window(&mut entry.restart_times);
        entry.restart_times.len() as u32
    }

    /// Records a proposal's outcome for future cooldown/restart-budget
    /// checks. Call only after the applier reports a terminal outcome.
    pub fn record_applied(&self, key: &str, caused_restart: bool) {
        let mut entries = self.entries.write();
        let entry = entries.entry(key.to_owned()).or_default();
        entry.last_applied = Some(Instant::now());
        if caused_restart {
            entry.restart_times.push_back(Instant::now());
        }
        prune_restart_window(&mut entry.restart_times);
    }

    /// Periodic maintenance to bound ledger growth (spec.md REDESIGN FLAG
    /// "age-based eviction"); drops entries with no activity for over an
    /// hour.
    pub fn evict_stale(&self) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| {
            prune_restart_window(&mut entry.restart_times);
            let recently_applied = entry
                .last_applied
                .map(|t| t.elapsed() < Duration::from_secs(3600))
                .unwrap_or(false);
            recently_applied || !entry.restart_times.is_empty()
        });
    }
}

fn prune_restart_window(restart_times: &mut VecDeque<Instant>) {
    let window = Duration::from_secs(3600);
    while let Some(&front) = restart_times.front() {
        if front.elapsed() > window {
            restart_times.pop_front();
        } else {
            break;
        }
    }
}

/// Rate/Concurrency Governor (spec.md §4.8): bounds in-flight applies,
/// enforces per-target cooldown and restart budget, and throttles the
/// cluster-API client's own call rate underneath everything else.
pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    client_limiter: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    ledger: CooldownLedger,
    pub batch_size: usize,
}

impl ConcurrencyGovernor {
    pub fn new(max_concurrent_resizes: u32, client_qps: u32, client_burst: u32, batch_size: usize) -> Self {
        let qps = NonZeroU32::new(client_qps.max(1)).unwrap();
        let burst = NonZeroU32::new(client_burst.max(1)).unwrap();
        let quota = Quota::per_second(qps).allow_burst(burst);
        ConcurrencyGovernor {
            semaphore: Arc::new(Semaphore::new(max_concurrent_resizes.max(1) as usize)),
            client_limiter: GovernorRateLimiter::direct(quota),
            ledger: CooldownLedger::new(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    /// Cooldown + restart-budget gate, evaluated before a proposal is
    /// handed to the applier (spec.md §4.8).
    pub fn admit(&self, key: &str, cooldown: Duration, max_restarts_per_hour: u32) -> AdmitDecision {
        if self.ledger.is_cooling_down(key, cooldown) {
            return AdmitDecision::CooldownActive;
        }
        if self.ledger.restarts_in_last_hour(key) >= max_restarts_per_hour {
            return AdmitDecision::RestartBudgetExhausted;
        }
        AdmitDecision::Admit
    }

    /// Blocks until a global in-flight slot is free (spec.md §4.8 "global
    /// in-flight semaphore `maxConcurrentResizes`").
    pub async fn acquire_slot(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }

    /// Client-side QPS/burst throttle underneath the semaphore (spec.md
    /// §4.8 "client-side QPS/burst caps ... apply underneath").
    pub async fn throttle_client(&self) {
        loop {
            if self.client_limiter.check().is_ok() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Splits a tick's admitted proposals into fixed-size batches (spec.md
    /// §4.8 "batches proposals into groups of fixed size (default 5)").
    pub fn batch<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        items
            .into_iter()
            .fold(Vec::new(), |mut batches: Vec<Vec<T>>, item| {
                match batches.last_mut() {
                    Some(batch) if batch.len() < self.batch_size => batch.push(item),
                    _ => batches.push(vec![item]),
                }
                batches
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_key_is_not_cooling_down() {
        let ledger = CooldownLedger::new();
        assert!(!ledger.is_cooling_down("checkout/web-1/app", Duration::from_secs(300)));
    }

    #[test]
    fn recently_applied_key_cools_down() {
        let ledger = CooldownLedger::new();
        ledger.record_applied("checkout/web-1/app", false);
        assert!(ledger.is_cooling_down("checkout/web-1/app", Duration::from_secs(300)));
    }

    #[test]
    fn restart_budget_counts_only_recent_restarts() {
        let ledger = CooldownLedger::new();
        ledger.record_applied("checkout/web-1/app", true);
        ledger.record_applied("checkout/web-1/app", true);
        assert_eq!(ledger.restarts_in_last_hour("checkout/web-1/app"), 2);
    }

    #[test]
    fn batches_split_at_fixed_size() {
        let governor = ConcurrencyGovernor::new(5, 10, 10, 5);
        let batches = governor.batch((0..12).collect::<Vec<_>>());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[2].len(), 2);
    }

    #[tokio::test]
    async fn admit_rejects_during_cooldown() {
        let governor = ConcurrencyGovernor::new(5, 100, 100, 5);
        governor.ledger().record_applied("checkout/web-1/app", false);
        let decision = governor.admit("checkout/web-1/app", Duration::from_secs(300), 10);
        assert_eq!(decision, AdmitDecision::CooldownActive);
    }

    #[tokio::test]
    async fn admit_rejects_when_restart_budget_exhausted() {
        let governor = ConcurrencyGovernor::new(5, 100, 100, 5);
        for _ in 0..3 {
            governor.ledger().record_applied("checkout/web-1/app", true);
        }
        // Cooldown window is zero so only the restart budget gates here.
        let decision = governor.admit("checkout/web-1/app", Duration::from_secs(0), 3);
        assert_eq!(decision, AdmitDecision::RestartBudgetExhausted);
    }
}
