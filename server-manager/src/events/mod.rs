//! Stage lifecycle events.
//!
//! The orchestrator reports every stage transition to an [`EventSink`];
//! the binary uses [`LoggingEventSink`].

mod sink;

pub use sink::{
    CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RUN_COMPLETED,
    STAGE_COMPLETED, STAGE_FAILED, STAGE_SKIPPED, STAGE_STARTED,
};
