//! Screen recording functionality
//!
//! This module assembles a GStreamer graph that records the screen (or one
//! window) and optionally the microphone to an MP4 file.

pub mod encoder;
mod error;
mod pipeline;
mod state;
mod window;

pub use error::{PickError, RecordError};
pub use pipeline::GstFactory;
pub use state::{
    CancelToken, CapturePlan, CaptureSession, Phase, Recorder, SessionFactory, StopOutcome,
};
pub use window::{WindowId, WindowPicker, Xwininfo};
