//! Core of the SynchroTrace event-trace generator.
//!
//! Consumes the primitive-event stream of an instrumentation front-end
//! and aggregates it into computation, communication, and
//! synchronization trace events for multi-threaded architectural
//! simulators. The pieces compose bottom-up: [`addrset`] compresses
//! touched addresses, [`shadow`] tracks per-byte ownership across
//! threads, [`event`] accumulates trace events, [`context`] drives one
//! thread's aggregation state machine, and [`logger`] serializes
//! flushed events to per-thread gzip sinks.

/// Compressed sets of disjoint address ranges.
pub mod addrset;

/// Per-thread aggregation state machines.
pub mod context;

/// Trace-event accumulators.
pub mod event;

/// Trace-event serialization strategies.
pub mod logger;

/// Byte-granular last-writer/readers metadata.
pub mod shadow;

/// Per-thread and per-barrier statistics.
pub mod stats;

/// Scalar types and the primitive-event model.
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;
