//! Canned extensions and policies for testing.
//!
//! Available behind the `test-utils` feature flag.

mod event_log;
mod fixed_reply;
mod recording_fault;

pub use event_log::{EventLog, RecordingExtension};
pub use fixed_reply::FixedReply;
pub use recording_fault::{FaultRecord, RecordingFaultPolicy};
