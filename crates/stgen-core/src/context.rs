use anyhow::{bail, Error};
use log::warn;

use crate::{
    event::{increment_eid, CommEvent, CompEvent},
    logger::Logger,
    shadow::{AddrOutOfRange, ShadowMemory, MAX_TIDS},
    stats::{BarrierStats, PerBarrierStats, Stats},
    types::{Addr, Eid, SyncType, Tid},
};

/// Instruction markers are emitted every `2^12` retired instructions.
const INSTR_MARKER_INTERVAL: u64 = 1 << 12;

/// Per-thread aggregation state machine.
///
/// Drives the Comp and Comm accumulators from one thread's primitive
/// stream and flushes them through the thread's logger. Shadow memory
/// is shared between contexts and passed in per call; the dispatcher
/// guarantees only the active context touches it.
///
/// Invariant: at most one of the Comp and Comm accumulators is active
/// at any time. Every entry point that may activate one flushes the
/// other first.
pub struct ThreadContext<L> {
    tid: Tid,
    prims_per_comp: u64,
    eid: Eid,
    comp: CompEvent,
    comm: CommEvent,
    logger: L,
    stats: Stats,
    barrier_stats: PerBarrierStats,
}

impl<L: Logger> ThreadContext<L> {
    /// Creates the context for `tid`.
    ///
    /// # Errors
    ///
    /// Fails if `tid` is outside the shadow memory's supported range or
    /// `prims_per_comp` is outside `1..=100`.
    pub fn new(tid: Tid, prims_per_comp: u64, logger: L) -> Result<Self, Error> {
        if tid < 1 || tid as usize > MAX_TIDS {
            bail!("thread id {tid} outside the supported range 1..={MAX_TIDS}");
        }
        if !(1..=100).contains(&prims_per_comp) {
            bail!("primitives per computation event must be in 1..=100, got {prims_per_comp}");
        }

        Ok(Self {
            tid,
            prims_per_comp,
            eid: 1,
            comp: CompEvent::new(),
            comm: CommEvent::new(),
            logger,
            stats: Stats::default(),
            barrier_stats: PerBarrierStats::new(),
        })
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn barrier_windows(&self) -> &[(Addr, BarrierStats)] {
        self.barrier_stats.windows()
    }

    pub fn on_iop(&mut self) -> Result<(), Error> {
        self.comm_flush_if_active()?;
        self.comp.inc_iop();

        self.stats.iops += 1;
        self.barrier_stats.inc_iops();

        Ok(())
    }

    pub fn on_flop(&mut self) -> Result<(), Error> {
        self.comm_flush_if_active()?;
        self.comp.inc_flop();

        self.stats.flops += 1;
        self.barrier_stats.inc_flops();

        Ok(())
    }

    /// Classifies a load against shadow memory.
    ///
    /// Each byte may have been produced by a different thread. A byte
    /// last written by another thread, not yet read by this one, forms
    /// a communication edge; one such byte classifies the whole access
    /// as communication (granularity loss acknowledged). A byte with no
    /// recorded writer counts as local computation.
    pub fn on_read(
        &mut self,
        shadow: &mut ShadowMemory,
        start: Addr,
        bytes: Addr,
    ) -> Result<(), Error> {
        let mut is_comm_edge = false;

        for i in 0..bytes {
            let addr = start.saturating_add(i);
            match self.read_byte(shadow, addr) {
                Ok(true) => is_comm_edge = true,
                Ok(false) => {}
                Err(err) => {
                    // recoverable: degrade to a local compute byte
                    warn!("thread {}: {err}; treating load as local", self.tid);
                    self.comp.update_reads(addr, 1);
                }
            }
        }

        if is_comm_edge {
            self.comp_flush_if_active()?;
        } else {
            self.comm_flush_if_active()?;
            self.comp.inc_reads();
        }

        self.check_comp_flush_limit()?;
        self.stats.reads += 1;
        self.barrier_stats.inc_mem_accesses();

        Ok(())
    }

    fn read_byte(
        &mut self,
        shadow: &mut ShadowMemory,
        addr: Addr,
    ) -> Result<bool, AddrOutOfRange> {
        let writer = shadow.writer_tid(addr)?;
        let is_reader = shadow.is_reader_tid(addr, self.tid)?;

        if !is_reader {
            shadow.update_reader(addr, 1, self.tid)?;
        }

        match writer {
            // an address with no recorded writer reads as local compute
            Some(producer) if !is_reader && producer != self.tid => {
                let producer_eid = shadow.writer_eid(addr)?;
                self.comm.add_edge(producer, producer_eid, addr);
                Ok(true)
            }
            _ => {
                self.comp.update_reads(addr, 1);
                Ok(false)
            }
        }
    }

    pub fn on_write(
        &mut self,
        shadow: &mut ShadowMemory,
        start: Addr,
        bytes: Addr,
    ) -> Result<(), Error> {
        self.comp.inc_writes();
        self.comp.update_writes(start, bytes);

        if let Err(err) = shadow.update_writer(start, bytes, self.tid, self.eid) {
            warn!("thread {}: {err}; store not shadowed", self.tid);
        }

        self.check_comp_flush_limit()?;
        self.stats.writes += 1;
        self.barrier_stats.inc_mem_accesses();

        Ok(())
    }

    /// Flushes both accumulators (Comp first) and emits the sync
    /// record. Sync emission consumes an event id.
    pub fn on_sync(&mut self, ty: SyncType, addr: Addr) -> Result<(), Error> {
        self.comp_flush_if_active()?;
        self.comm_flush_if_active()?;

        match ty {
            SyncType::Lock => self.barrier_stats.inc_locks(),
            SyncType::Barrier => self.barrier_stats.barrier(addr),
            _ => {}
        }

        self.logger.flush_sync(ty, addr, self.eid, self.tid)?;
        increment_eid(&mut self.eid, self.tid)
    }

    pub fn on_instr(&mut self) -> Result<(), Error> {
        self.stats.instrs += 1;
        self.barrier_stats.inc_instrs();

        if self.stats.instrs & (INSTR_MARKER_INTERVAL - 1) == 0 {
            self.logger.instr_marker(INSTR_MARKER_INTERVAL as u32)?;
        }

        Ok(())
    }

    /// Flushes the Comp accumulator once a counter reaches the
    /// compression bound, so no emitted Comp ever exceeds it.
    fn check_comp_flush_limit(&mut self) -> Result<(), Error> {
        if self.comp.writes >= self.prims_per_comp || self.comp.reads >= self.prims_per_comp {
            self.comp_flush_if_active()?;
        }

        debug_assert!(
            !self.comp.is_active()
                || (self.comp.writes < self.prims_per_comp
                    && self.comp.reads < self.prims_per_comp)
        );

        Ok(())
    }

    pub fn comp_flush_if_active(&mut self) -> Result<(), Error> {
        self.comp.flush(&mut self.logger, &mut self.eid, self.tid)
    }

    pub fn comm_flush_if_active(&mut self) -> Result<(), Error> {
        self.comm.flush(&mut self.logger, &mut self.eid, self.tid)
    }

    /// Final flush (Comp then Comm) and sink teardown. Must be called
    /// exactly once, at end of stream.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.comp_flush_if_active()?;
        self.comm_flush_if_active()?;
        self.logger.finish()
    }

    #[cfg(test)]
    pub(crate) fn accumulators_exclusive(&self) -> bool {
        !(self.comp.is_active() && self.comm.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadContext;
    use crate::{
        shadow::ShadowMemory,
        test_util::{Record, RecordingLogger},
        types::SyncType,
    };

    fn context(tid: u32, prims: u64) -> ThreadContext<RecordingLogger> {
        ThreadContext::new(tid, prims, RecordingLogger::default()).unwrap()
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(ThreadContext::new(0, 100, RecordingLogger::default()).is_err());
        assert!(ThreadContext::new(129, 100, RecordingLogger::default()).is_err());
        assert!(ThreadContext::new(1, 0, RecordingLogger::default()).is_err());
        assert!(ThreadContext::new(1, 101, RecordingLogger::default()).is_err());
    }

    #[test]
    fn local_stream_aggregates_into_one_comp() {
        let mut shadow = ShadowMemory::new();
        let mut ctx = context(1, 100);

        for _ in 0..3 {
            ctx.on_iop().unwrap();
        }
        for _ in 0..2 {
            ctx.on_flop().unwrap();
        }
        ctx.on_write(&mut shadow, 0x1000, 8).unwrap();
        ctx.on_read(&mut shadow, 0x2000, 4).unwrap();
        ctx.finish().unwrap();

        match &ctx.logger.records[..] {
            [Record::Comp {
                eid: 1,
                tid: 1,
                iops: 3,
                flops: 2,
                reads: 1,
                writes: 1,
                write_ranges,
                read_ranges,
            }] => {
                assert_eq!(write_ranges[..], [(0x1000, 0x1007)]);
                assert_eq!(read_ranges[..], [(0x2000, 0x2003)]);
            }
            other => panic!("unexpected records {other:?}"),
        }
        assert!(ctx.logger.finished);
    }

    #[test]
    fn cross_thread_read_becomes_comm_edge() {
        let mut shadow = ShadowMemory::new();
        let mut producer = context(1, 100);
        let mut consumer = context(2, 100);

        producer.on_write(&mut shadow, 0x4000, 4).unwrap();
        producer.finish().unwrap();

        consumer.on_read(&mut shadow, 0x4000, 4).unwrap();
        consumer.finish().unwrap();

        match &consumer.logger.records[..] {
            [Record::Comm { eid: 1, tid: 2, edges }] => {
                assert_eq!(edges[..], [(1, 1, vec![(0x4000, 0x4003)])]);
            }
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn rereading_own_data_stays_local() {
        let mut shadow = ShadowMemory::new();
        let mut ctx = context(1, 100);

        ctx.on_write(&mut shadow, 0x100, 4).unwrap();
        ctx.on_read(&mut shadow, 0x100, 4).unwrap();
        ctx.finish().unwrap();

        assert_eq!(ctx.logger.records.len(), 1);
        assert!(matches!(
            ctx.logger.records[0],
            Record::Comp {
                reads: 1,
                writes: 1,
                ..
            }
        ));
    }

    #[test]
    fn repeated_cross_read_is_one_edge() {
        let mut shadow = ShadowMemory::new();
        let mut producer = context(1, 100);
        let mut consumer = context(2, 100);

        producer.on_write(&mut shadow, 0x4000, 4).unwrap();
        producer.finish().unwrap();

        consumer.on_read(&mut shadow, 0x4000, 4).unwrap();
        // second read: consumer is now a recorded reader, so local
        consumer.on_read(&mut shadow, 0x4000, 4).unwrap();
        consumer.finish().unwrap();

        match &consumer.logger.records[..] {
            [Record::Comm { .. }, Record::Comp { reads: 1, .. }] => {}
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn mixed_access_classifies_as_comm() {
        let mut shadow = ShadowMemory::new();
        let mut t1 = context(1, 100);
        let mut t2 = context(2, 100);

        t1.on_write(&mut shadow, 0x5000, 8).unwrap();
        t1.finish().unwrap();

        t2.on_write(&mut shadow, 0x5004, 4).unwrap();
        t2.on_read(&mut shadow, 0x5000, 8).unwrap();
        t2.finish().unwrap();

        // the write's Comp flushes when the comm edge appears; the read
        // itself contributes no Comp counters
        match &t2.logger.records[..] {
            [Record::Comp {
                eid: 1,
                reads: 0,
                writes: 1,
                ..
            }, Record::Comm { eid: 2, edges, .. }] => {
                assert_eq!(edges[..], [(1, 1, vec![(0x5000, 0x5003)])]);
            }
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn comp_and_comm_are_never_both_active() {
        let mut shadow = ShadowMemory::new();
        let mut t1 = context(1, 100);
        let mut t2 = context(2, 100);

        t1.on_write(&mut shadow, 0x6000, 16).unwrap();
        t1.finish().unwrap();

        t2.on_iop().unwrap();
        assert!(t2.accumulators_exclusive());
        t2.on_read(&mut shadow, 0x6000, 4).unwrap();
        assert!(t2.accumulators_exclusive());
        t2.on_read(&mut shadow, 0x6004, 4).unwrap();
        assert!(t2.accumulators_exclusive());
        t2.on_flop().unwrap();
        assert!(t2.accumulators_exclusive());
        t2.on_sync(SyncType::Lock, 0xaa).unwrap();
        assert!(t2.accumulators_exclusive());
        t2.finish().unwrap();
    }

    #[test]
    fn eids_increase_by_one_per_record() {
        let mut shadow = ShadowMemory::new();
        let mut t1 = context(1, 100);
        let mut t2 = context(2, 100);

        t1.on_write(&mut shadow, 0x7000, 64).unwrap();
        t1.finish().unwrap();

        t2.on_iop().unwrap();
        t2.on_read(&mut shadow, 0x7000, 4).unwrap(); // flushes comp, opens comm
        t2.on_sync(SyncType::Barrier, 0xb0).unwrap(); // flushes comm, then sync
        t2.on_flop().unwrap();
        t2.finish().unwrap();

        let eids: Vec<u64> = t2
            .logger
            .records
            .iter()
            .map(|record| match record {
                Record::Comp { eid, .. }
                | Record::Comm { eid, .. }
                | Record::Sync { eid, .. } => *eid,
                Record::Marker { .. } => panic!("no markers expected"),
            })
            .collect();

        assert_eq!(eids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn comp_flushes_at_compression_bound() {
        let mut shadow = ShadowMemory::new();
        let mut ctx = context(1, 100);

        for i in 0..101u64 {
            ctx.on_write(&mut shadow, 0x8000 + 8 * i, 8).unwrap();
        }
        ctx.finish().unwrap();

        match &ctx.logger.records[..] {
            [Record::Comp {
                eid: 1,
                writes: 100,
                write_ranges: first,
                ..
            }, Record::Comp {
                eid: 2,
                writes: 1,
                write_ranges: second,
                ..
            }] => {
                assert_eq!(first[..], [(0x8000, 0x831f)]);
                assert_eq!(second[..], [(0x8320, 0x8327)]);
            }
            other => panic!("unexpected records {other:?}"),
        }
    }

    #[test]
    fn small_compression_bound_applies_to_reads() {
        let mut shadow = ShadowMemory::new();
        let mut ctx = context(1, 2);

        for i in 0..4u64 {
            ctx.on_read(&mut shadow, 0x100 + 4 * i, 4).unwrap();
        }
        ctx.finish().unwrap();

        assert_eq!(ctx.logger.records.len(), 2);
        for record in &ctx.logger.records {
            match record {
                Record::Comp { reads, .. } => assert_eq!(*reads, 2),
                other => panic!("unexpected record {other:?}"),
            }
        }
    }

    #[test]
    fn instr_markers_at_power_of_two_milestones() {
        let mut ctx = context(1, 100);

        for _ in 0..(1 << 13) {
            ctx.on_instr().unwrap();
        }
        ctx.finish().unwrap();

        assert_eq!(
            ctx.logger.records,
            vec![
                Record::Marker { count: 1 << 12 },
                Record::Marker { count: 1 << 12 }
            ]
        );
        assert_eq!(ctx.stats().instrs, 1 << 13);
    }

    #[test]
    fn sync_updates_barrier_windows() {
        let mut ctx = context(1, 100);

        ctx.on_iop().unwrap();
        ctx.on_sync(SyncType::Lock, 0x10).unwrap();
        ctx.on_sync(SyncType::Barrier, 0xb1).unwrap();
        ctx.on_flop().unwrap();
        ctx.on_sync(SyncType::Barrier, 0xb2).unwrap();
        ctx.finish().unwrap();

        let windows = ctx.barrier_windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].0, 0xb1);
        assert_eq!(windows[0].1.iops, 1);
        assert_eq!(windows[0].1.locks, 1);
        assert_eq!(windows[1].0, 0xb2);
        assert_eq!(windows[1].1.flops, 1);
    }

    #[test]
    fn out_of_range_load_degrades_to_local() {
        let mut shadow = ShadowMemory::new();
        let mut ctx = context(1, 100);

        // far beyond the 36-bit shadowed range
        ctx.on_read(&mut shadow, 1 << 40, 4).unwrap();
        ctx.finish().unwrap();

        match &ctx.logger.records[..] {
            [Record::Comp {
                reads: 1,
                read_ranges,
                ..
            }] => assert_eq!(read_ranges[..], [(1 << 40, (1 << 40) + 3)]),
            other => panic!("unexpected records {other:?}"),
        }
    }
}
