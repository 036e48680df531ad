use std::{
    fmt::Write as _,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Error;

use crate::{
    event::{CommEvent, CompEvent},
    logger::{open_gz_sink, GzSink, Logger, LoggerFactory, Sink, EVENT_FILE_BASE},
    types::{Addr, Eid, SyncType, Tid},
};

/// Line-oriented trace serializer, gzip-compressed on disk.
///
/// One line per trace event:
///
/// ```text
/// <eid>,<tid>,<iops>,<flops>,<reads>,<writes> $ <lo> <hi> ... * <lo> <hi> ...
/// <eid>,<tid> # <producer_tid> <producer_eid> <lo> <hi> ...
/// <eid>,<tid>,pth_ty:<type>^<addr>
/// ```
///
/// Instruction markers batch into a pending `! <hex> ` line emitted
/// ahead of the next event line.
pub struct TextLogger<W> {
    out: W,
    markers: String,
}

impl TextLogger<GzSink> {
    pub fn create(tid: Tid, out_dir: &Path) -> Result<Self, Error> {
        let sink = open_gz_sink(out_dir, &format!("{EVENT_FILE_BASE}{tid}.gz"))?;

        Ok(Self::with_sink(sink))
    }
}

impl<W: Sink> TextLogger<W> {
    pub fn with_sink(out: W) -> Self {
        Self {
            out,
            markers: String::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn drain_markers(&mut self) -> Result<(), Error> {
        if !self.markers.is_empty() {
            writeln!(self.out, "{}", self.markers)?;
            self.markers.clear();
        }

        Ok(())
    }
}

impl<W: Sink> Logger for TextLogger<W> {
    fn flush_comp(&mut self, ev: &CompEvent, eid: Eid, tid: Tid) -> Result<(), Error> {
        self.drain_markers()?;

        let mut line = format!(
            "{eid},{tid},{},{},{},{}",
            ev.iops, ev.flops, ev.reads, ev.writes
        );
        for &(lo, hi) in &ev.unique_writes {
            write!(line, " $ {lo:#x} {hi:#x}")?;
        }
        for &(lo, hi) in &ev.unique_reads {
            write!(line, " * {lo:#x} {hi:#x}")?;
        }
        writeln!(self.out, "{line}")?;

        Ok(())
    }

    fn flush_comm(&mut self, ev: &CommEvent, eid: Eid, tid: Tid) -> Result<(), Error> {
        self.drain_markers()?;

        let mut line = format!("{eid},{tid}");
        for edge in ev.edges() {
            for &(lo, hi) in &edge.addrs {
                write!(
                    line,
                    " # {} {} {lo:#x} {hi:#x}",
                    edge.producer_tid, edge.producer_eid
                )?;
            }
        }
        writeln!(self.out, "{line}")?;

        Ok(())
    }

    fn flush_sync(&mut self, ty: SyncType, addr: Addr, eid: Eid, tid: Tid) -> Result<(), Error> {
        self.drain_markers()?;

        writeln!(self.out, "{eid},{tid},pth_ty:{}^{addr:#x}", ty.code())?;

        Ok(())
    }

    fn instr_marker(&mut self, count: u32) -> Result<(), Error> {
        write!(self.markers, "! {count:#x} ")?;

        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.drain_markers()?;
        self.out.flush()?;
        self.out.finish_sink()
    }
}

pub struct TextLoggerFactory {
    out_dir: PathBuf,
}

impl TextLoggerFactory {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl LoggerFactory for TextLoggerFactory {
    type Logger = TextLogger<GzSink>;

    fn create(&self, tid: Tid) -> Result<Self::Logger, Error> {
        TextLogger::create(tid, &self.out_dir)
    }
}
