use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, bail, Context, Error};

use stgen_core::{
    context::ThreadContext,
    logger::LoggerFactory,
    shadow::ShadowMemory,
    types::{
        prim::{self, CompKind, CxtKind, MemKind, SyncKind},
        Addr, SyncType, Tid,
    },
};

use crate::{manager::Backend, tables::SyncTables};

/// The SynchroTraceGen backend: owns the shared shadow memory and one
/// [`ThreadContext`] per observed thread, and routes each primitive to
/// the context selected by the last thread swap.
///
/// A context is created the first time its thread id appears in a
/// `Swap`; loggers come from the factory chosen at CLI parse, one per
/// thread. Shadow memory is a single instance handed to the active
/// context per call; the swap protocol guarantees exclusive access.
pub struct EventHandlers<F: LoggerFactory> {
    factory: F,
    prims_per_comp: u64,
    shadow: ShadowMemory,
    contexts: HashMap<Tid, ThreadContext<F::Logger>>,
    current: Option<Tid>,
    tables: Arc<SyncTables>,
}

impl<F: LoggerFactory> EventHandlers<F> {
    pub fn new(factory: F, prims_per_comp: u64, tables: Arc<SyncTables>) -> Self {
        Self {
            factory,
            prims_per_comp,
            shadow: ShadowMemory::new(),
            contexts: HashMap::new(),
            current: None,
            tables,
        }
    }

    fn current_tid(&self) -> Result<Tid, Error> {
        self.current
            .ok_or_else(|| anyhow!("primitive event arrived before any thread swap"))
    }

    fn current_context(&mut self) -> Result<&mut ThreadContext<F::Logger>, Error> {
        let tid = self.current_tid()?;
        self.contexts
            .get_mut(&tid)
            .ok_or_else(|| anyhow!("no context for thread {tid}"))
    }

    /// Redirects subsequent primitives to `new_tid`, constructing its
    /// context on first sight and flushing the accumulators of the
    /// context being switched away from. Swapping to the active thread
    /// is a no-op.
    fn on_swap(&mut self, id: Addr) -> Result<(), Error> {
        let new_tid = Tid::try_from(id).context("thread swap id exceeds the thread id range")?;
        if new_tid < 1 {
            bail!("thread swap to invalid thread id 0");
        }

        if self.current == Some(new_tid) {
            return Ok(());
        }

        if !self.contexts.contains_key(&new_tid) {
            self.tables.register_thread(new_tid)?;
            let logger = self.factory.create(new_tid)?;
            self.contexts.insert(
                new_tid,
                ThreadContext::new(new_tid, self.prims_per_comp, logger)?,
            );
        }

        if let Some(prev) = self.current {
            if let Some(ctx) = self.contexts.get_mut(&prev) {
                ctx.comp_flush_if_active()?;
                ctx.comm_flush_if_active()?;
            }
        }

        self.current = Some(new_tid);

        Ok(())
    }
}

impl<F: LoggerFactory> Backend for EventHandlers<F> {
    fn on_mem(&mut self, ev: &prim::Mem) -> Result<(), Error> {
        let tid = self.current_tid()?;
        let ctx = self
            .contexts
            .get_mut(&tid)
            .ok_or_else(|| anyhow!("no context for thread {tid}"))?;

        match ev.kind {
            MemKind::Load => ctx.on_read(&mut self.shadow, ev.addr, ev.bytes),
            MemKind::Store => ctx.on_write(&mut self.shadow, ev.addr, ev.bytes),
        }
    }

    fn on_comp(&mut self, ev: &prim::Comp) -> Result<(), Error> {
        let ctx = self.current_context()?;

        match ev.kind {
            CompKind::Iop => ctx.on_iop(),
            CompKind::Flop => ctx.on_flop(),
        }
    }

    fn on_sync(&mut self, ev: &prim::Sync) -> Result<(), Error> {
        if ev.kind == SyncKind::Swap {
            return self.on_swap(ev.id);
        }

        // spawn and barrier bookkeeping precedes trace emission
        match ev.kind {
            SyncKind::Create => {
                let spawner = self.current_tid()?;
                self.tables.record_spawn(spawner, ev.id)?;
            }
            SyncKind::Barrier => {
                let tid = self.current_tid()?;
                self.tables.record_barrier(ev.id, tid)?;
            }
            _ => {}
        }

        // kinds outside the pthread table (semaphores) drop here
        if let Some(ty) = SyncType::from_prim(ev.kind) {
            self.current_context()?.on_sync(ty, ev.id)?;
        }

        Ok(())
    }

    fn on_cxt(&mut self, ev: &prim::Cxt) -> Result<(), Error> {
        match ev.kind {
            CxtKind::Instr => self.current_context()?.on_instr(),
        }
    }

    /// Flushes every context in first-sight order and records its
    /// final statistics in the shared tables.
    fn finish(&mut self) -> Result<(), Error> {
        let threads = self.tables.lock()?.threads_in_order.clone();

        for tid in threads {
            if let Some(ctx) = self.contexts.get_mut(&tid) {
                ctx.finish()?;
                self.tables.record_thread_stats(tid, ctx.stats())?;
                self.tables.merge_barrier_windows(ctx.barrier_windows())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stgen_core::{
        logger::NullLoggerFactory,
        types::prim::{self, CompKind, MemKind, SyncKind},
    };

    use super::{Backend, EventHandlers, SyncTables};

    fn handlers() -> (EventHandlers<NullLoggerFactory>, Arc<SyncTables>) {
        let tables = Arc::new(SyncTables::new());
        (
            EventHandlers::new(NullLoggerFactory, 100, Arc::clone(&tables)),
            tables,
        )
    }

    fn swap(handlers: &mut EventHandlers<NullLoggerFactory>, tid: u64) {
        handlers
            .on_sync(&prim::Sync {
                kind: SyncKind::Swap,
                id: tid,
            })
            .unwrap();
    }

    #[test]
    fn events_before_first_swap_are_fatal() {
        let (mut handlers, _tables) = handlers();

        assert!(handlers
            .on_comp(&prim::Comp {
                kind: CompKind::Iop
            })
            .is_err());
    }

    #[test]
    fn swap_registers_threads_in_first_sight_order() {
        let (mut handlers, tables) = handlers();

        swap(&mut handlers, 2);
        swap(&mut handlers, 1);
        swap(&mut handlers, 2);

        assert_eq!(tables.lock().unwrap().threads_in_order, vec![2, 1]);
        assert_eq!(handlers.contexts.len(), 2);
    }

    #[test]
    fn swap_to_invalid_tid_is_fatal() {
        let (mut handlers, _tables) = handlers();

        assert!(handlers
            .on_sync(&prim::Sync {
                kind: SyncKind::Swap,
                id: 0,
            })
            .is_err());
    }

    #[test]
    fn create_records_spawner_and_address() {
        let (mut handlers, tables) = handlers();

        swap(&mut handlers, 1);
        handlers
            .on_sync(&prim::Sync {
                kind: SyncKind::Create,
                id: 0xa,
            })
            .unwrap();
        swap(&mut handlers, 3);
        handlers
            .on_sync(&prim::Sync {
                kind: SyncKind::Create,
                id: 0xc,
            })
            .unwrap();

        assert_eq!(
            tables.lock().unwrap().thread_spawns,
            vec![(1, 0xa), (3, 0xc)]
        );
    }

    #[test]
    fn barrier_participants_union_across_threads() {
        let (mut handlers, tables) = handlers();

        for tid in [1, 2] {
            swap(&mut handlers, tid);
            handlers
                .on_sync(&prim::Sync {
                    kind: SyncKind::Barrier,
                    id: 0xb1,
                })
                .unwrap();
        }

        let inner = tables.lock().unwrap();
        assert_eq!(inner.barriers.len(), 1);
        assert!(inner.barriers[0].1.iter().copied().eq([1, 2]));
    }

    #[test]
    fn semaphores_drop_silently() {
        let (mut handlers, tables) = handlers();

        swap(&mut handlers, 1);
        for kind in [SyncKind::SemInit, SyncKind::SemWait, SyncKind::SemPost] {
            handlers.on_sync(&prim::Sync { kind, id: 0x50 }).unwrap();
        }
        handlers.finish().unwrap();

        // no trace state was disturbed and nothing was recorded
        let inner = tables.lock().unwrap();
        assert!(inner.thread_spawns.is_empty());
        assert!(inner.barriers.is_empty());
    }

    #[test]
    fn finish_collects_stats_in_thread_order() {
        let (mut handlers, tables) = handlers();

        swap(&mut handlers, 2);
        handlers
            .on_comp(&prim::Comp {
                kind: CompKind::Iop,
            })
            .unwrap();
        swap(&mut handlers, 1);
        handlers
            .on_mem(&prim::Mem {
                kind: MemKind::Store,
                addr: 0x100,
                bytes: 8,
            })
            .unwrap();
        handlers.finish().unwrap();

        let inner = tables.lock().unwrap();
        let tids: Vec<u32> = inner.thread_stats.iter().map(|(tid, _)| *tid).collect();
        assert_eq!(tids, vec![2, 1]);
        assert_eq!(inner.thread_stats[0].1.iops, 1);
        assert_eq!(inner.thread_stats[1].1.writes, 1);
    }
}
