use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Error};
use flate2::{write::GzEncoder, Compression};

use crate::{
    event::{CommEvent, CompEvent},
    types::{Addr, Eid, SyncType, Tid},
};

mod null;
mod packed;
mod text;

pub use null::{NullLogger, NullLoggerFactory};
pub use packed::{PackedLogger, PackedLoggerFactory, EVENTS_PER_MESSAGE};
pub use text::{TextLogger, TextLoggerFactory};

/// Per-thread trace file stem shared by every backend; the downstream
/// trace consumer globs on it.
pub const EVENT_FILE_BASE: &str = "sigil.events.out-";

/// One trace-event serialization strategy bound to one thread's sink.
///
/// Every flush emits exactly one trace record; an instruction marker is
/// a pseudo-record that does not consume an event id. `finish` drains
/// any batched state and finalizes the sink framing; the logger must
/// not be used afterwards.
pub trait Logger {
    fn flush_comp(&mut self, ev: &CompEvent, eid: Eid, tid: Tid) -> Result<(), Error>;

    fn flush_comm(&mut self, ev: &CommEvent, eid: Eid, tid: Tid) -> Result<(), Error>;

    fn flush_sync(&mut self, ty: SyncType, addr: Addr, eid: Eid, tid: Tid) -> Result<(), Error>;

    fn instr_marker(&mut self, count: u32) -> Result<(), Error>;

    fn finish(&mut self) -> Result<(), Error>;
}

/// A byte sink that can finalize its own framing, e.g. write the gzip
/// trailer. In-memory sinks used by tests finalize trivially.
pub trait Sink: Write {
    fn finish_sink(&mut self) -> Result<(), Error>;
}

/// The production sink: gzip over a buffered file.
pub type GzSink = GzEncoder<BufWriter<File>>;

impl Sink for GzSink {
    fn finish_sink(&mut self) -> Result<(), Error> {
        self.try_finish()?;
        self.get_mut().flush().map_err(Error::from)
    }
}

impl Sink for Vec<u8> {
    fn finish_sink(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

pub(crate) fn open_gz_sink(dir: &Path, file_name: &str) -> Result<GzSink, Error> {
    let path = dir.join(file_name);
    let file = File::create(&path)
        .with_context(|| format!("opening trace sink {}", path.display()))?;

    Ok(GzEncoder::new(BufWriter::new(file), Compression::default()))
}

/// Creates one logger per thread context; which concrete strategy is
/// produced is decided once, at CLI parse, keeping every downstream
/// path monomorphic.
pub trait LoggerFactory {
    type Logger: Logger;

    fn create(&self, tid: Tid) -> Result<Self::Logger, Error>;
}
