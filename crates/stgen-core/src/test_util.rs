//! Test doubles shared by the unit tests.

use anyhow::Error;

use crate::{
    addrset::AddrRange,
    event::{CommEvent, CompEvent},
    logger::Logger,
    types::{Addr, Eid, SyncType, Tid},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Comp {
        eid: Eid,
        tid: Tid,
        iops: u64,
        flops: u64,
        reads: u64,
        writes: u64,
        write_ranges: Vec<AddrRange>,
        read_ranges: Vec<AddrRange>,
    },
    Comm {
        eid: Eid,
        tid: Tid,
        edges: Vec<(Tid, Eid, Vec<AddrRange>)>,
    },
    Sync {
        eid: Eid,
        tid: Tid,
        ty: SyncType,
        addr: Addr,
    },
    Marker {
        count: u32,
    },
}

/// Captures flushed records in memory for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingLogger {
    pub records: Vec<Record>,
    pub finished: bool,
}

impl Logger for RecordingLogger {
    fn flush_comp(&mut self, ev: &CompEvent, eid: Eid, tid: Tid) -> Result<(), Error> {
        self.records.push(Record::Comp {
            eid,
            tid,
            iops: ev.iops,
            flops: ev.flops,
            reads: ev.reads,
            writes: ev.writes,
            write_ranges: ev.unique_writes.iter().copied().collect(),
            read_ranges: ev.unique_reads.iter().copied().collect(),
        });

        Ok(())
    }

    fn flush_comm(&mut self, ev: &CommEvent, eid: Eid, tid: Tid) -> Result<(), Error> {
        self.records.push(Record::Comm {
            eid,
            tid,
            edges: ev
                .edges()
                .iter()
                .map(|edge| {
                    (
                        edge.producer_tid,
                        edge.producer_eid,
                        edge.addrs.iter().copied().collect(),
                    )
                })
                .collect(),
        });

        Ok(())
    }

    fn flush_sync(&mut self, ty: SyncType, addr: Addr, eid: Eid, tid: Tid) -> Result<(), Error> {
        self.records.push(Record::Sync { eid, tid, ty, addr });

        Ok(())
    }

    fn instr_marker(&mut self, count: u32) -> Result<(), Error> {
        self.records.push(Record::Marker { count });

        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.finished = true;

        Ok(())
    }
}
