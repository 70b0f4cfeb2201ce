//! Per-newsgroup cache of assembled threads.
//!
//! The slot table is behind an async `RwLock`; each newsgroup has its own
//! slot behind a `Mutex`, so work on one newsgroup never waits on another.
//! A slot holds at most one complete [`CacheEntry`] and a generation counter:
//!
//! - readers take a [`Ticket`] (the generation) on a miss, fetch without
//!   holding the slot, and store the result only if the generation is still
//!   the same
//! - invalidation bumps the generation and drops the entry, so a fetch that
//!   raced a post can never repopulate the slot with pre-post data
//!
//! Entries are replaced whole, never patched, so a reader sees either the old
//! or the new assembly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use crate::threading::Assembly;

/// A complete assembly of one newsgroup and the time it was fetched.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub(crate) assembly: Assembly,
    pub(crate) fetched_at: Instant,
}

impl CacheEntry {
    pub(crate) fn is_fresh(&self, window: Duration) -> bool {
        self.fetched_at.elapsed() < window
    }
}

#[derive(Debug, Default)]
struct GroupSlot {
    entry: Option<Arc<CacheEntry>>,
    generation: u64,
}

type SharedSlot = Arc<Mutex<GroupSlot>>;

/// Permission to store a fetch result, valid until the slot is invalidated.
#[derive(Debug)]
pub(crate) struct Ticket {
    slot: SharedSlot,
    generation: u64,
}

/// Outcome of a cache lookup.
#[derive(Debug)]
pub(crate) enum Lookup {
    Hit(Arc<CacheEntry>),
    Miss(Ticket),
}

/// Cache occupancy, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Newsgroups with a cached assembly
    pub entries: usize,
    /// Newsgroups with a slot (cached or not)
    pub slots: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Cache {
    slots: RwLock<HashMap<String, SharedSlot>>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, group: &str) -> SharedSlot {
        if let Some(slot) = self.slots.read().await.get(group) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(group.to_string()).or_default())
    }

    /// Return the entry if fresh, otherwise a ticket for storing a new one.
    pub(crate) async fn lookup(&self, group: &str, window: Duration) -> Lookup {
        let slot = self.slot(group).await;
        let guard = slot.lock().await;
        if let Some(entry) = guard.entry.as_ref().filter(|e| e.is_fresh(window)) {
            return Lookup::Hit(Arc::clone(entry));
        }
        let generation = guard.generation;
        drop(guard);
        Lookup::Miss(Ticket { slot, generation })
    }

    /// A ticket for an unconditional refetch.
    pub(crate) async fn ticket(&self, group: &str) -> Ticket {
        let slot = self.slot(group).await;
        let generation = slot.lock().await.generation;
        Ticket { slot, generation }
    }

    /// The cached entry regardless of age.
    pub(crate) async fn peek(&self, group: &str) -> Option<Arc<CacheEntry>> {
        let slot = self.slots.read().await.get(group).cloned()?;
        let entry = slot.lock().await.entry.clone();
        entry
    }

    /// Store a finished assembly if the ticket is still valid.
    ///
    /// The entry is returned either way so the caller can serve it.
    pub(crate) async fn store(&self, ticket: Ticket, assembly: Assembly) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            assembly,
            fetched_at: Instant::now(),
        });

        let mut slot = ticket.slot.lock().await;
        if slot.generation == ticket.generation {
            slot.entry = Some(Arc::clone(&entry));
            debug!(newsgroup = %entry.assembly.group(), "cache entry stored");
        } else {
            debug!(
                newsgroup = %entry.assembly.group(),
                "cache entry discarded, newsgroup was invalidated during fetch"
            );
        }
        entry
    }

    /// Drop the entry of `group` and void every outstanding ticket.
    pub(crate) async fn invalidate(&self, group: &str) {
        let slot = self.slot(group).await;
        let mut guard = slot.lock().await;
        guard.generation += 1;
        guard.entry = None;
    }

    /// Evict entries older than `window`; returns the number evicted.
    pub(crate) async fn sweep(&self, window: Duration) -> usize {
        let mut slots = self.slots.write().await;
        let mut evicted = 0;

        let mut empty = Vec::new();
        for (group, slot) in slots.iter() {
            // Slots busy with a store or invalidation are left for the next sweep
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            match guard.entry.as_ref().map(|entry| entry.is_fresh(window)) {
                Some(true) => continue,
                Some(false) => {
                    guard.entry = None;
                    evicted += 1;
                }
                None => {}
            }
            // A ticket holder still needs this slot to store its fetch. The
            // write lock is held, so no new reference can appear meanwhile.
            if Arc::strong_count(slot) == 1 {
                empty.push(group.clone());
            }
        }
        for group in empty {
            slots.remove(&group);
        }
        evicted
    }

    pub(crate) async fn stats(&self) -> CacheStats {
        let slots: Vec<SharedSlot> = self.slots.read().await.values().cloned().collect();
        let mut stats = CacheStats {
            entries: 0,
            slots: slots.len(),
        };
        for slot in slots {
            if slot.lock().await.entry.is_some() {
                stats.entries += 1;
            }
        }
        stats
    }
}
