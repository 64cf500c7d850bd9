//! Tray icon and menu using StatusNotifierItem (ksni)
//!
//! The menu is the whole user interface: capture mode, microphone toggle and
//! the start/stop controls.

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use ksni::{
    Icon, MenuItem, Tray,
    blocking::TrayMethods,
    menu::{CheckmarkItem, RadioGroup, RadioItem, StandardItem},
};

use crate::config::CaptureMode;
use crate::fl;
use crate::screencast::{CancelToken, Phase};

/// Actions that can be triggered from the tray menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayAction {
    StartRecording { mode: CaptureMode, audio: bool },
    StopRecording,
    Quit,
}

/// Which menu entries are clickable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    /// Mode and microphone selectors
    pub options: bool,
}

impl Controls {
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Idle => Self {
                start: true,
                stop: false,
                options: true,
            },
            Phase::Recording => Self {
                start: false,
                stop: true,
                options: false,
            },
        }
    }

    /// Everything disabled while a request is in flight
    pub fn busy() -> Self {
        Self {
            start: false,
            stop: false,
            options: false,
        }
    }
}

pub struct RecorderTray {
    mode: CaptureMode,
    audio: bool,
    phase: Phase,
    controls: Controls,
    output: Option<String>,
    last_error: Option<String>,
    tx: Sender<TrayAction>,
    cancel: CancelToken,
    idle_icon: Vec<Icon>,
    recording_icon: Vec<Icon>,
}

impl RecorderTray {
    pub fn new(mode: CaptureMode, audio: bool, tx: Sender<TrayAction>, cancel: CancelToken) -> Self {
        Self {
            mode,
            audio,
            phase: Phase::Idle,
            controls: Controls::for_phase(Phase::Idle),
            output: None,
            last_error: None,
            tx,
            cancel,
            idle_icon: dot_icons([128, 128, 128]),
            recording_icon: dot_icons([220, 50, 50]),
        }
    }

    /// Mirror the recorder after it handled an action
    pub fn set_phase(&mut self, phase: Phase, output: Option<String>, error: Option<String>) {
        self.phase = phase;
        self.controls = Controls::for_phase(phase);
        self.output = output;
        self.last_error = error;
    }

    fn send(&mut self, action: TrayAction) {
        log::info!("Tray: {:?}", action);
        self.controls = Controls::busy();
        if let Err(e) = self.tx.send(action) {
            log::error!("Failed to send tray action: {}", e);
        }
    }

    fn request_start(&mut self) {
        if self.controls.start {
            let action = TrayAction::StartRecording {
                mode: self.mode,
                audio: self.audio,
            };
            self.send(action);
        }
    }

    fn request_stop(&mut self) {
        if self.controls.stop {
            self.send(TrayAction::StopRecording);
        }
    }

    fn request_quit(&mut self) {
        // Interrupts a stop that is already waiting for EOS
        self.cancel.cancel();
        self.send(TrayAction::Quit);
    }
}

/// Filled circle icons at multiple sizes for proper DPI scaling
fn dot_icons(rgb: [u8; 3]) -> Vec<Icon> {
    [16, 22, 24, 32, 48, 64]
        .into_iter()
        .map(|size| dot_icon(size, rgb))
        .collect()
}

fn dot_icon(size: i32, [r, g, b]: [u8; 3]) -> Icon {
    let center = size as f32 / 2.0;
    let radius = center - 1.0;
    let mut data = Vec::with_capacity((size * size * 4) as usize);

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center + 0.5;
            let dy = y as f32 - center + 0.5;
            let dist = (dx * dx + dy * dy).sqrt();
            // Anti-aliased one pixel edge
            let alpha = ((radius + 1.0 - dist).clamp(0.0, 1.0) * 255.0) as u8;
            // ARGB, network byte order
            data.extend_from_slice(&[alpha, r, g, b]);
        }
    }

    Icon {
        width: size,
        height: size,
        data,
    }
}

impl Tray for RecorderTray {
    fn id(&self) -> String {
        "io.github.xcast".to_string()
    }

    fn title(&self) -> String {
        fl!("app-title")
    }

    fn icon_pixmap(&self) -> Vec<Icon> {
        match self.phase {
            Phase::Idle => self.idle_icon.clone(),
            Phase::Recording => self.recording_icon.clone(),
        }
    }

    fn activate(&mut self, _x: i32, _y: i32) {
        match self.phase {
            Phase::Idle => self.request_start(),
            Phase::Recording => self.request_stop(),
        }
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        let description = match (&self.last_error, self.phase) {
            (Some(error), _) => error.clone(),
            (None, Phase::Idle) => fl!("tooltip-idle"),
            (None, Phase::Recording) => fl!("tooltip-recording"),
        };
        let status = match (self.phase, &self.output) {
            (Phase::Recording, Some(path)) => fl!("status-recording", path = path.as_str()),
            _ => fl!("status-idle"),
        };

        ksni::ToolTip {
            title: format!("{} - {}", fl!("app-title"), status),
            description,
            icon_name: String::new(),
            icon_pixmap: Vec::new(),
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let controls = self.controls;

        vec![
            MenuItem::RadioGroup(RadioGroup {
                selected: self.mode.index(),
                select: Box::new(|tray: &mut Self, index: usize| {
                    tray.mode = CaptureMode::from_index(index);
                    log::debug!("Capture mode: {:?}", tray.mode);
                }),
                options: CaptureMode::ALL
                    .into_iter()
                    .map(|mode| RadioItem {
                        label: mode.label(),
                        enabled: controls.options,
                        ..Default::default()
                    })
                    .collect(),
            }),
            MenuItem::Checkmark(CheckmarkItem {
                label: fl!("enable-microphone"),
                checked: self.audio,
                enabled: controls.options,
                activate: Box::new(|tray: &mut Self| {
                    tray.audio = !tray.audio;
                    log::debug!("Microphone input: {}", tray.audio);
                }),
                ..Default::default()
            }),
            MenuItem::Separator,
            MenuItem::Standard(StandardItem {
                label: fl!("start-recording"),
                enabled: controls.start,
                activate: Box::new(|tray: &mut Self| tray.request_start()),
                ..Default::default()
            }),
            MenuItem::Standard(StandardItem {
                label: fl!("stop-recording"),
                enabled: controls.stop,
                activate: Box::new(|tray: &mut Self| tray.request_stop()),
                ..Default::default()
            }),
            MenuItem::Separator,
            MenuItem::Standard(StandardItem {
                label: fl!("quit"),
                activate: Box::new(|tray: &mut Self| tray.request_quit()),
                ..Default::default()
            }),
        ]
    }
}

/// Handle type for the tray
pub type TrayHandle = ksni::blocking::Handle<RecorderTray>;

/// Create the tray icon and return a handle for controlling it
pub fn create_tray(tray: RecorderTray) -> Result<TrayHandle> {
    tray.spawn()
        .context("Failed to spawn tray icon. Is a StatusNotifier host running?")
}
