// src/pipeline/mod.rs
//
// Per-frame flow for one camera session:
//
//   FrameSource → MonitoringSession::process_frame → FrameContext
//               → EventEmitter → StorageSink / ImageWriter / AlertSink

pub mod emitter;
pub mod frame_context;
pub mod metrics;
pub mod runner;
pub mod session;
pub mod sinks;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use emitter::{EmittedRecords, EventEmitter};
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use runner::{run_calibration, RunReport, SessionRunner};
pub use session::{FrameOutcome, MonitoringSession, MonitoringState};
pub use sinks::{
    AlertKind, AlertNotification, AlertSink, CaptureRequest, FaceSightingRecord, ImageWriter,
    JpegImageWriter, JsonlStorage, LogAlertSink, PersistedEvent, PostureRecord, StorageSink,
};
pub use source::{FrameSource, ReplayFrameSource};
