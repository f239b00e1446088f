//! Executor lifecycle events and the sinks that receive them.
//!
//! The executor emits one event when a run starts, around every step, and
//! when the run completes, fails or is cancelled. Sinks are injected per
//! executor; there is no process-wide sink.

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
