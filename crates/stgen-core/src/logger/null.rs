use anyhow::Error;

use crate::{
    event::{CommEvent, CompEvent},
    logger::{Logger, LoggerFactory},
    types::{Addr, Eid, SyncType, Tid},
};

/// Discards every record; used to measure generation overhead without
/// serialization or I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn flush_comp(&mut self, _ev: &CompEvent, _eid: Eid, _tid: Tid) -> Result<(), Error> {
        Ok(())
    }

    fn flush_comm(&mut self, _ev: &CommEvent, _eid: Eid, _tid: Tid) -> Result<(), Error> {
        Ok(())
    }

    fn flush_sync(&mut self, _ty: SyncType, _addr: Addr, _eid: Eid, _tid: Tid) -> Result<(), Error> {
        Ok(())
    }

    fn instr_marker(&mut self, _count: u32) -> Result<(), Error> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullLoggerFactory;

impl LoggerFactory for NullLoggerFactory {
    type Logger = NullLogger;

    fn create(&self, _tid: Tid) -> Result<Self::Logger, Error> {
        Ok(NullLogger)
    }
}
