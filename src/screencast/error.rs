//! Errors surfaced to the UI when a recording cannot be started

use std::path::PathBuf;
use thiserror::Error;

/// Why the window picker did not produce a window
#[derive(Debug, Error)]
pub enum PickError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },

    #[error("Window ID not found")]
    NotFound,

    #[error("Invalid window ID: {0}")]
    InvalidId(String),
}

/// A failed start attempt. Each one leaves the recorder idle.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("No window selected: {0}")]
    WindowSelection(#[from] PickError),

    #[error("Failed to initialize GStreamer: {0}")]
    Init(String),

    #[error("Failed to create {element} element")]
    ElementCreation { element: String },

    #[error("Failed to link {from} to {to}: {reason}")]
    Link {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Failed to get {kind} pad from muxer")]
    MuxPad { kind: &'static str },

    #[error("Unable to set the pipeline to the playing state")]
    StateChange,

    #[error("Output path is not valid UTF-8: {}", .0.display())]
    OutputPath(PathBuf),
}
