use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Error;

use crate::{
    addrset::AddrSet,
    event::{CommEvent, CompEvent},
    logger::{open_gz_sink, GzSink, Logger, LoggerFactory, Sink, EVENT_FILE_BASE},
    types::{Addr, Eid, SyncType, Tid},
};

/// Events per framed message in the packed stream.
pub const EVENTS_PER_MESSAGE: u32 = 100_000;

const TAG_COMP: u8 = 1;
const TAG_COMM: u8 = 2;
const TAG_SYNC: u8 = 3;
const TAG_MARKER: u8 = 4;

/// Binary trace serializer, gzip-compressed on disk.
///
/// Records accumulate into an in-memory message; every
/// [`EVENTS_PER_MESSAGE`] records the message is framed with its event
/// count and appended to the sink. All integers are big-endian and
/// every list is length-prefixed:
///
/// ```text
/// message  := n_events:u32  record*
/// record   := tag:u8 payload
///   Comp   := iops:u64 flops:u64 reads:u64 writes:u64
///             n_writes:u32 range*  n_reads:u32 range*
///   Comm   := n_edges:u32 (producer_tid:u32 producer_eid:u64
///             n_addrs:u32 range*)*
///   Sync   := type:u8 id:u64
///   Marker := count:u32
/// range    := start:u64 end:u64
/// ```
pub struct PackedLogger<W> {
    out: W,
    message: Vec<u8>,
    events: u32,
    events_per_message: u32,
}

impl PackedLogger<GzSink> {
    pub fn create(tid: Tid, out_dir: &Path) -> Result<Self, Error> {
        let sink = open_gz_sink(out_dir, &format!("{EVENT_FILE_BASE}{tid}.capn.bin.gz"))?;

        Ok(Self::with_sink(sink))
    }
}

impl<W: Sink> PackedLogger<W> {
    pub fn with_sink(out: W) -> Self {
        Self {
            out,
            message: Vec::new(),
            events: 0,
            events_per_message: EVENTS_PER_MESSAGE,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn put_u32(&mut self, value: u32) {
        self.message.extend_from_slice(&value.to_be_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.message.extend_from_slice(&value.to_be_bytes());
    }

    fn put_len(&mut self, len: usize) -> Result<(), Error> {
        self.put_u32(u32::try_from(len)?);

        Ok(())
    }

    fn put_ranges(&mut self, addrs: &AddrSet) -> Result<(), Error> {
        self.put_len(addrs.len())?;
        for &(lo, hi) in addrs {
            self.put_u64(lo);
            self.put_u64(hi);
        }

        Ok(())
    }

    fn record_done(&mut self) -> Result<(), Error> {
        self.events += 1;
        if self.events == self.events_per_message {
            self.write_message()?;
        }

        Ok(())
    }

    fn write_message(&mut self) -> Result<(), Error> {
        self.out.write_all(&self.events.to_be_bytes())?;
        self.out.write_all(&self.message)?;
        self.message.clear();
        self.events = 0;

        Ok(())
    }
}

impl<W: Sink> Logger for PackedLogger<W> {
    fn flush_comp(&mut self, ev: &CompEvent, _eid: Eid, _tid: Tid) -> Result<(), Error> {
        self.message.push(TAG_COMP);
        self.put_u64(ev.iops);
        self.put_u64(ev.flops);
        self.put_u64(ev.reads);
        self.put_u64(ev.writes);
        self.put_ranges(&ev.unique_writes)?;
        self.put_ranges(&ev.unique_reads)?;

        self.record_done()
    }

    fn flush_comm(&mut self, ev: &CommEvent, _eid: Eid, _tid: Tid) -> Result<(), Error> {
        self.message.push(TAG_COMM);
        self.put_len(ev.edges().len())?;
        for edge in ev.edges() {
            self.put_u32(edge.producer_tid);
            self.put_u64(edge.producer_eid);
            self.put_ranges(&edge.addrs)?;
        }

        self.record_done()
    }

    fn flush_sync(&mut self, ty: SyncType, addr: Addr, _eid: Eid, _tid: Tid) -> Result<(), Error> {
        self.message.push(TAG_SYNC);
        self.message.push(ty.code());
        self.put_u64(addr);

        self.record_done()
    }

    fn instr_marker(&mut self, count: u32) -> Result<(), Error> {
        self.message.push(TAG_MARKER);
        self.put_u32(count);

        self.record_done()
    }

    fn finish(&mut self) -> Result<(), Error> {
        if self.events > 0 {
            self.write_message()?;
        }
        self.out.flush()?;
        self.out.finish_sink()
    }
}

pub struct PackedLoggerFactory {
    out_dir: PathBuf,
}

impl PackedLoggerFactory {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl LoggerFactory for PackedLoggerFactory {
    type Logger = PackedLogger<GzSink>;

    fn create(&self, tid: Tid) -> Result<Self::Logger, Error> {
        PackedLogger::create(tid, &self.out_dir)
    }
}
