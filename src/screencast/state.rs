//! Recorder state machine
//!
//! The recorder is either idle or owns exactly one capture session. Start and
//! stop are safe to call in any state: a second start is rejected, a stop while
//! idle does nothing.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::CaptureMode;
use super::error::RecordError;
use super::window::{WindowId, WindowPicker};

/// What a single recording captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    pub mode: CaptureMode,
    /// Only set for `CaptureMode::SpecificWindow`
    pub window: Option<WindowId>,
    pub audio: bool,
}

/// How the end-of-stream wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The muxer finalized the file
    Eos,
    /// The pipeline reported an error while draining
    Error {
        source: String,
        message: String,
        debug: Option<String>,
    },
    /// No EOS before the deadline
    TimedOut,
    /// The wait was interrupted through a [`CancelToken`]
    Cancelled,
}

/// Shared flag that interrupts a pending stop from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A built capture graph
pub trait CaptureSession {
    /// Transition to the running state
    fn play(&mut self) -> Result<(), RecordError>;

    /// Drain, wait for EOS (bounded by `timeout`) and tear down
    fn finish(self, timeout: Duration, cancel: &CancelToken) -> StopOutcome;

    fn output_path(&self) -> &Path;
}

/// Builds capture graphs for a plan
pub trait SessionFactory {
    type Session: CaptureSession;

    fn build(&self, plan: &CapturePlan) -> Result<Self::Session, RecordError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Recording,
}

enum RecorderState<S> {
    Idle,
    Recording {
        session: S,
        plan: CapturePlan,
        started_at: Instant,
    },
}

pub struct Recorder<F: SessionFactory, W: WindowPicker> {
    factory: F,
    picker: W,
    stop_timeout: Duration,
    state: RecorderState<F::Session>,
}

impl<F: SessionFactory, W: WindowPicker> Recorder<F, W> {
    pub fn new(factory: F, picker: W, stop_timeout: Duration) -> Self {
        Self {
            factory,
            picker,
            stop_timeout,
            state: RecorderState::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            RecorderState::Idle => Phase::Idle,
            RecorderState::Recording { .. } => Phase::Recording,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.phase() == Phase::Recording
    }

    /// Plan of the active recording
    pub fn plan(&self) -> Option<&CapturePlan> {
        match &self.state {
            RecorderState::Idle => None,
            RecorderState::Recording { plan, .. } => Some(plan),
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        match &self.state {
            RecorderState::Idle => None,
            RecorderState::Recording { session, .. } => Some(session.output_path()),
        }
    }

    /// Build and start a pipeline for the given choices
    ///
    /// Any failure leaves the recorder idle with nothing running.
    pub fn start(&mut self, mode: CaptureMode, audio: bool) -> Result<(), RecordError> {
        if self.is_recording() {
            log::warn!("Start requested while already recording, ignoring");
            return Err(RecordError::AlreadyRecording);
        }

        let window = match mode {
            CaptureMode::EntireScreen => None,
            CaptureMode::SpecificWindow => Some(self.picker.pick()?),
        };
        let plan = CapturePlan {
            mode,
            window,
            audio,
        };

        log::info!(
            "Starting recording: mode={:?}, window={:?}, audio={}",
            plan.mode,
            plan.window.map(|w| w.to_string()),
            plan.audio
        );

        let mut session = self.factory.build(&plan)?;
        // Dropping the session on failure tears the graph down
        session.play()?;

        log::info!("Recording started: {}", session.output_path().display());
        self.state = RecorderState::Recording {
            session,
            plan,
            started_at: Instant::now(),
        };
        Ok(())
    }

    /// Finalize the active recording
    ///
    /// Returns `None` when nothing was recording. The recorder is idle
    /// afterwards whatever the outcome.
    pub fn stop(&mut self, cancel: &CancelToken) -> Option<StopOutcome> {
        let RecorderState::Recording {
            session,
            started_at,
            ..
        } = std::mem::replace(&mut self.state, RecorderState::Idle)
        else {
            log::debug!("Stop requested while idle");
            return None;
        };

        log::info!(
            "Stopping recording after {:.1}s",
            started_at.elapsed().as_secs_f64()
        );
        let outcome = session.finish(self.stop_timeout, cancel);
        match &outcome {
            StopOutcome::Eos => log::info!("Recording finished"),
            other => log::warn!("Recording stopped without clean EOS: {:?}", other),
        }
        Some(outcome)
    }
}
