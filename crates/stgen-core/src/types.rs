//! Scalar types and the primitive-event model shared by the front-end
//! and the trace-generation core.

/// Thread identifier as reported by the instrumentation front-end.
///
/// Valid thread ids start at 1; 0 never appears in a primitive stream.
pub type Tid = u32;

/// Per-thread trace-event id. Strictly increases by 1 per emitted
/// trace event; overflow is a fatal condition.
pub type Eid = u64;

/// A byte address in the traced program's address space.
pub type Addr = u64;

/// Primitive events as delivered by the instrumentation front-end.
///
/// These are the *input* of the trace generator. The aggregated trace
/// events it emits live in [`crate::event`].
pub mod prim {
    use super::Addr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MemKind {
        Load,
        Store,
    }

    /// A memory access of `bytes` consecutive bytes starting at `addr`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mem {
        pub kind: MemKind,
        pub addr: Addr,
        pub bytes: Addr,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CompKind {
        Iop,
        Flop,
    }

    /// A single retired arithmetic operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Comp {
        pub kind: CompKind,
    }

    /// Synchronization primitives, including the pseudo-sync `Swap`
    /// that redirects the stream to another thread context and the
    /// semaphore family that the translator drops.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SyncKind {
        Swap,
        Lock,
        Unlock,
        Create,
        Join,
        Barrier,
        CondWait,
        CondSignal,
        CondBroadcast,
        SpinLock,
        SpinUnlock,
        SemInit,
        SemWait,
        SemPost,
        SemGetValue,
        SemDestroy,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sync {
        pub kind: SyncKind,
        /// Kind-dependent payload: the new thread id for `Swap`, the
        /// spawnee address for `Create`, the sync object address
        /// otherwise.
        pub id: Addr,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CxtKind {
        Instr,
    }

    /// An execution-context marker; currently only instruction-retired.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Cxt {
        pub kind: CxtKind,
        pub id: Addr,
    }

    /// The tagged union buffered and routed by the dispatcher.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Primitive {
        Mem(Mem),
        Comp(Comp),
        Sync(Sync),
        Cxt(Cxt),
    }
}

/// Synchronization event types in the emitted trace.
///
/// The numeric values are an external contract with the downstream
/// trace consumer and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncType {
    Lock = 1,
    Unlock = 2,
    Create = 3,
    Join = 4,
    Barrier = 5,
    CondWait = 6,
    CondSignal = 7,
    CondBroadcast = 8,
    SpinLock = 9,
    SpinUnlock = 10,
}

impl SyncType {
    /// Returns the numeric code used in both the text and packed formats.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Translates a front-end sync primitive into the emitted type.
    ///
    /// `Swap` never reaches the translator (the dispatcher consumes it),
    /// and the semaphore family is not representable in the output
    /// trace; both map to `None` and are dropped without warning.
    pub fn from_prim(kind: prim::SyncKind) -> Option<Self> {
        use prim::SyncKind;

        match kind {
            SyncKind::Lock => Some(SyncType::Lock),
            SyncKind::Unlock => Some(SyncType::Unlock),
            SyncKind::Create => Some(SyncType::Create),
            SyncKind::Join => Some(SyncType::Join),
            SyncKind::Barrier => Some(SyncType::Barrier),
            SyncKind::CondWait => Some(SyncType::CondWait),
            SyncKind::CondSignal => Some(SyncType::CondSignal),
            SyncKind::CondBroadcast => Some(SyncType::CondBroadcast),
            SyncKind::SpinLock => Some(SyncType::SpinLock),
            SyncKind::SpinUnlock => Some(SyncType::SpinUnlock),
            SyncKind::Swap
            | SyncKind::SemInit
            | SyncKind::SemWait
            | SyncKind::SemPost
            | SyncKind::SemGetValue
            | SyncKind::SemDestroy => None,
        }
    }
}
