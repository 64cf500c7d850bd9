//! Application loop
//!
//! Owns the recorder on the main thread and applies actions coming from the
//! tray, then mirrors the resulting state back into the tray menu.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::XcastConfig;
use crate::screencast::{
    CancelToken, GstFactory, Recorder, SessionFactory, StopOutcome, WindowPicker, Xwininfo,
};
use crate::tray::{self, RecorderTray, TrayAction, TrayHandle};

/// Global flag for graceful shutdown on SIGTERM/SIGINT
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Set while a stop is waiting for end-of-stream
static STOP_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

/// Token the signal handler cancels to break a pending stop wait
static SIGNAL_CANCEL: OnceLock<CancelToken> = OnceLock::new();

/// How often the loop checks the signal flag while idle
const SIGNAL_POLL: Duration = Duration::from_millis(200);

struct App {
    recorder: Recorder<GstFactory, Xwininfo>,
    tray: TrayHandle,
    cancel: CancelToken,
}

impl App {
    /// Apply one tray action; returns false when the app should exit
    fn handle(&mut self, action: TrayAction) -> bool {
        let mut error = None;
        let keep_running = match action {
            TrayAction::StartRecording { mode, audio } => {
                self.cancel.reset();
                match self.recorder.start(mode, audio) {
                    Ok(()) => {
                        if let Some(plan) = self.recorder.plan() {
                            log::info!("Recording {:?}", plan);
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to start recording: {}", e);
                        error = Some(e.to_string());
                    }
                }
                true
            }
            TrayAction::StopRecording => {
                error = self.stop();
                true
            }
            TrayAction::Quit => false,
        };
        self.sync_tray(error);
        keep_running
    }

    fn stop(&mut self) -> Option<String> {
        stop_recording(&mut self.recorder, &self.cancel)
    }

    fn sync_tray(&self, error: Option<String>) {
        let phase = self.recorder.phase();
        let output = self
            .recorder
            .output_path()
            .map(|p| p.display().to_string());
        self.tray.update(move |tray| tray.set_phase(phase, output, error));
    }

    /// Finalize an active recording before exiting
    fn shutdown(&mut self) {
        if self.recorder.is_recording() {
            log::info!("Finishing active recording before exit...");
            // The Quit click that ended the loop cancelled the token
            self.cancel.reset();
            self.stop();
        }
    }
}

/// Stop and describe anything other than a clean finish
///
/// The token is honoured as found and cleared only once the wait is over, so a
/// Quit clicked before this runs still abandons the wait.
fn stop_recording<F: SessionFactory, W: WindowPicker>(
    recorder: &mut Recorder<F, W>,
    cancel: &CancelToken,
) -> Option<String> {
    STOP_IN_PROGRESS.store(true, Ordering::SeqCst);
    let outcome = recorder.stop(cancel);
    STOP_IN_PROGRESS.store(false, Ordering::SeqCst);
    cancel.reset();

    match outcome? {
        StopOutcome::Eos => None,
        StopOutcome::Error {
            source, message, ..
        } => Some(format!("{}: {}", source, message)),
        other => Some(format!("Recording stopped early ({:?})", other)),
    }
}

/// Run the tray UI until the user quits or a stop signal arrives
pub fn run(config: XcastConfig) -> Result<()> {
    let cancel = SIGNAL_CANCEL.get_or_init(CancelToken::default).clone();
    setup_signal_handler();

    let (tx, rx) = crossbeam_channel::unbounded::<TrayAction>();

    let tray = tray::create_tray(RecorderTray::new(
        config.capture_mode,
        config.audio_enabled,
        tx,
        cancel.clone(),
    ))?;

    let recorder = Recorder::new(
        GstFactory::new(config.clone()),
        Xwininfo::new(&config.window_picker),
        config.stop_timeout(),
    );

    let mut app = App {
        recorder,
        tray,
        cancel,
    };

    log::info!("xcast ready, output goes to {}", config.output_path.display());
    event_loop(&mut app, &rx);
    app.shutdown();
    Ok(())
}

fn event_loop(app: &mut App, rx: &Receiver<TrayAction>) {
    loop {
        if STOP_REQUESTED.load(Ordering::Relaxed) {
            log::info!("Received stop signal");
            return;
        }

        match rx.recv_timeout(SIGNAL_POLL) {
            Ok(action) => {
                if !app.handle(action) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("Tray channel closed, exiting");
                return;
            }
        }
    }
}

/// Set up signal handler for SIGTERM and SIGINT
fn setup_signal_handler() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| unsafe {
        let handler = stop_signal_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    });
}

/// Request shutdown; a signal during a stop also abandons the EOS wait
extern "C" fn stop_signal_handler(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::Relaxed);
    if STOP_IN_PROGRESS.load(Ordering::SeqCst) {
        if let Some(cancel) = SIGNAL_CANCEL.get() {
            cancel.cancel();
        }
    }
}
