use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, Error};

use stgen_core::{
    stats::{BarrierStats, Stats},
    types::{Addr, Tid},
};

/// Trace-wide metadata shared by the backend and the finalizer.
///
/// All lists preserve first-sight order; the downstream simulator
/// depends on it. A single coarse mutex guards the whole table set,
/// which is written rarely (thread registration, spawns, barriers,
/// final statistics).
pub struct SyncTables {
    inner: Mutex<Tables>,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    /// Every thread id, in the order it was first seen.
    pub(crate) threads_in_order: Vec<Tid>,
    /// `(spawner, spawnee address)` pairs in insertion order.
    pub(crate) thread_spawns: Vec<(Tid, Addr)>,
    /// Barrier addresses in first-sight order with their participants.
    pub(crate) barriers: Vec<(Addr, BTreeSet<Tid>)>,
    /// Lifetime counters per thread, recorded at stream end.
    pub(crate) thread_stats: Vec<(Tid, Stats)>,
    /// Inter-barrier windows merged across threads, keyed by barrier
    /// address in first-sight order.
    pub(crate) barrier_stats: Vec<(Addr, BarrierStats)>,
}

impl SyncTables {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Tables>, Error> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("global trace tables lock poisoned"))
    }

    /// Registers a thread on first sight. Returns whether it was new.
    pub fn register_thread(&self, tid: Tid) -> Result<bool, Error> {
        let mut tables = self.lock()?;
        if tables.threads_in_order.contains(&tid) {
            return Ok(false);
        }
        tables.threads_in_order.push(tid);

        Ok(true)
    }

    pub fn record_spawn(&self, spawner: Tid, spawnee: Addr) -> Result<(), Error> {
        self.lock()?.thread_spawns.push((spawner, spawnee));

        Ok(())
    }

    /// Adds `tid` to the participant set of the barrier at `addr`,
    /// appending a fresh entry when the address is new. The linear scan
    /// keeps entries in first-sight order.
    pub fn record_barrier(&self, addr: Addr, tid: Tid) -> Result<(), Error> {
        let mut tables = self.lock()?;

        match tables.barriers.iter_mut().find(|(a, _)| *a == addr) {
            Some((_, participants)) => {
                participants.insert(tid);
            }
            None => tables.barriers.push((addr, BTreeSet::from([tid]))),
        }

        Ok(())
    }

    pub fn record_thread_stats(&self, tid: Tid, stats: Stats) -> Result<(), Error> {
        self.lock()?.thread_stats.push((tid, stats));

        Ok(())
    }

    /// Folds one thread's closed barrier windows into the trace-wide
    /// per-barrier counters.
    pub fn merge_barrier_windows(&self, windows: &[(Addr, BarrierStats)]) -> Result<(), Error> {
        let mut tables = self.lock()?;

        for (addr, stats) in windows {
            match tables.barrier_stats.iter_mut().find(|(a, _)| a == addr) {
                Some((_, merged)) => merged.merge(stats),
                None => tables.barrier_stats.push((*addr, *stats)),
            }
        }

        Ok(())
    }
}

impl Default for SyncTables {
    fn default() -> Self {
        Self::new()
    }
}
