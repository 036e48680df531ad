use anyhow::Error;

use stgen_core::types::prim::{self, Primitive};

/// Default number of primitives buffered before a forced fan-out.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// A consumer of routed primitive events.
///
/// One hook per primitive kind, plus a cleanup hook invoked once when
/// the stream ends. Hooks run on the single consumer thread, in the
/// arrival order of the buffered primitives.
pub trait Backend {
    fn on_mem(&mut self, ev: &prim::Mem) -> Result<(), Error>;

    fn on_comp(&mut self, ev: &prim::Comp) -> Result<(), Error>;

    fn on_sync(&mut self, ev: &prim::Sync) -> Result<(), Error>;

    fn on_cxt(&mut self, ev: &prim::Cxt) -> Result<(), Error>;

    fn finish(&mut self) -> Result<(), Error>;
}

/// Buffers heterogeneous primitive events and fans them out to the
/// registered backends in insertion order.
///
/// The buffer has a fixed capacity; filling it triggers a flush, and
/// [`EventManager::finish`] drains any remainder before running each
/// backend's cleanup hook.
pub struct EventManager<B> {
    buffer: Vec<Primitive>,
    capacity: usize,
    backends: Vec<B>,
}

impl<B: Backend> EventManager<B> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0);

        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            backends: Vec::new(),
        }
    }

    pub fn add_backend(&mut self, backend: B) {
        self.backends.push(backend);
    }

    /// Appends one primitive, flushing first if the buffer is full.
    pub fn buffer_event(&mut self, ev: Primitive) -> Result<(), Error> {
        if self.buffer.len() == self.capacity {
            self.flush_events()?;
        }
        self.buffer.push(ev);

        Ok(())
    }

    /// Routes every buffered primitive to every backend, in arrival
    /// order, then resets the buffer.
    pub fn flush_events(&mut self) -> Result<(), Error> {
        let mut buffer = std::mem::take(&mut self.buffer);

        for ev in &buffer {
            for backend in &mut self.backends {
                match ev {
                    Primitive::Mem(mem) => backend.on_mem(mem)?,
                    Primitive::Comp(comp) => backend.on_comp(comp)?,
                    Primitive::Sync(sync) => backend.on_sync(sync)?,
                    Primitive::Cxt(cxt) => backend.on_cxt(cxt)?,
                }
            }
        }

        buffer.clear();
        self.buffer = buffer;

        Ok(())
    }

    /// Drains the buffer and runs every backend's cleanup hook.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.flush_events()?;
        for backend in &mut self.backends {
            backend.finish()?;
        }

        Ok(())
    }
}

impl<B: Backend> Default for EventManager<B> {
    fn default() -> Self {
        Self::new()
    }
}
