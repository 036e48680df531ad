use anyhow::{anyhow, Error};

use crate::{
    addrset::AddrSet,
    logger::Logger,
    types::{Addr, Eid, Tid},
};

/// Advances a per-thread event id by one. Overflow is fatal.
pub(crate) fn increment_eid(eid: &mut Eid, tid: Tid) -> Result<(), Error> {
    *eid = eid
        .checked_add(1)
        .ok_or_else(|| anyhow!("event id overflow in thread {tid}"))?;

    Ok(())
}

/// Accumulator for one computation trace event.
///
/// Collects local arithmetic and memory traffic until flushed. State is
/// reused across trillions of trace events, so a flush resets in place
/// rather than reallocating.
#[derive(Debug, Default)]
pub struct CompEvent {
    pub iops: u64,
    pub flops: u64,
    pub reads: u64,
    pub writes: u64,
    pub unique_writes: AddrSet,
    pub unique_reads: AddrSet,
    active: bool,
}

impl CompEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.iops = 0;
        self.flops = 0;
        self.reads = 0;
        self.writes = 0;
        self.unique_writes.clear();
        self.unique_reads.clear();
        self.active = false;
    }

    pub fn inc_iop(&mut self) {
        self.active = true;
        self.iops += 1;
    }

    pub fn inc_flop(&mut self) {
        self.active = true;
        self.flops += 1;
    }

    pub fn inc_reads(&mut self) {
        self.active = true;
        self.reads += 1;
    }

    pub fn inc_writes(&mut self) {
        self.active = true;
        self.writes += 1;
    }

    pub fn update_reads(&mut self, start: Addr, bytes: Addr) {
        debug_assert!(bytes >= 1);
        self.unique_reads.insert((start, start + bytes - 1));
    }

    pub fn update_writes(&mut self, start: Addr, bytes: Addr) {
        debug_assert!(bytes >= 1);
        self.unique_writes.insert((start, start + bytes - 1));
    }

    /// Emits one Comp record and resets, advancing `eid`; no-op while
    /// inactive.
    pub fn flush<L: Logger>(
        &mut self,
        logger: &mut L,
        eid: &mut Eid,
        tid: Tid,
    ) -> Result<(), Error> {
        if !self.active {
            return Ok(());
        }

        logger.flush_comp(self, *eid, tid)?;
        self.reset();
        increment_eid(eid, tid)
    }
}

/// One read-after-write dependency on another thread's event.
#[derive(Debug, PartialEq, Eq)]
pub struct CommEdge {
    pub producer_tid: Tid,
    pub producer_eid: Eid,
    pub addrs: AddrSet,
}

/// Accumulator for one communication trace event: the ordered set of
/// producer edges the consuming thread read from since the last flush.
#[derive(Debug, Default)]
pub struct CommEvent {
    edges: Vec<CommEdge>,
}

impl CommEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.edges.is_empty()
    }

    pub fn edges(&self) -> &[CommEdge] {
        &self.edges
    }

    pub fn reset(&mut self) {
        self.edges.clear();
    }

    /// Records that `addr` was produced by `(producer_tid,
    /// producer_eid)`. A repeated producer key extends the existing
    /// edge's address set; edge order is first-sight.
    pub fn add_edge(&mut self, producer_tid: Tid, producer_eid: Eid, addr: Addr) {
        for edge in &mut self.edges {
            if edge.producer_tid == producer_tid && edge.producer_eid == producer_eid {
                edge.addrs.insert((addr, addr));
                return;
            }
        }

        let mut addrs = AddrSet::new();
        addrs.insert((addr, addr));
        self.edges.push(CommEdge {
            producer_tid,
            producer_eid,
            addrs,
        });
    }

    /// Emits one Comm record and resets, advancing `eid`; no-op while
    /// inactive.
    pub fn flush<L: Logger>(
        &mut self,
        logger: &mut L,
        eid: &mut Eid,
        tid: Tid,
    ) -> Result<(), Error> {
        if !self.edges.is_empty() {
            logger.flush_comm(self, *eid, tid)?;
            self.reset();
            increment_eid(eid, tid)?;
        }

        Ok(())
    }
}
