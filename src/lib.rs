//! SynchroTrace event-trace generator.
//!
//! Consumes a primitive-event stream (memory accesses, arithmetic
//! operations, synchronization, instruction markers) and emits
//! per-thread compressed SynchroTrace event files plus trace-wide
//! thread and statistics metadata, ready for multi-threaded
//! architectural simulators.
//!
//! [`generate`] wires the pieces together: the [`frontend`] parses
//! primitives, the [`manager`] dispatcher buffers and routes them to
//! the [`handlers`] backend, and [`finalize`] dumps the shared
//! [`tables`] once the stream ends.

use std::{io::BufRead, path::Path, sync::Arc};

use anyhow::Error;

use stgen_core::logger::LoggerFactory;

/// Trace-wide metadata dumps written at exit.
pub mod finalize;

/// The primitive-stream front-end adapter.
pub mod frontend;

/// The SynchroTraceGen backend.
pub mod handlers;

/// The buffering primitive dispatcher.
pub mod manager;

/// Mutex-guarded trace-wide tables.
pub mod tables;

pub use handlers::EventHandlers;
pub use manager::{Backend, EventManager};
pub use tables::SyncTables;

/// Runs one trace-generation session over `input`, writing trace files
/// and metadata under `out_dir`.
///
/// The logger factory fixes the serialization backend for every
/// thread; `prims_per_comp` bounds the loads and stores folded into
/// one computation event.
pub fn generate<F, R>(
    input: R,
    factory: F,
    prims_per_comp: u64,
    out_dir: &Path,
) -> Result<(), Error>
where
    F: LoggerFactory,
    R: BufRead,
{
    let tables = Arc::new(SyncTables::new());

    let mut manager = EventManager::new();
    manager.add_backend(EventHandlers::new(
        factory,
        prims_per_comp,
        Arc::clone(&tables),
    ));

    for prim in frontend::parse_stream(input) {
        manager.buffer_event(prim?)?;
    }
    manager.finish()?;

    finalize::write_outputs(&tables, out_dir)
}
