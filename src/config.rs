//! Configuration persistence for xcast settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fl;

/// What part of the display gets recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureMode {
    #[default]
    EntireScreen,
    SpecificWindow,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 2] = [CaptureMode::EntireScreen, CaptureMode::SpecificWindow];

    /// Position of this mode in the tray radio group
    pub fn index(self) -> usize {
        match self {
            CaptureMode::EntireScreen => 0,
            CaptureMode::SpecificWindow => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL.get(index).copied().unwrap_or_default()
    }

    pub fn label(self) -> String {
        match self {
            CaptureMode::EntireScreen => fl!("entire-screen"),
            CaptureMode::SpecificWindow => fl!("specific-window"),
        }
    }
}

/// Application configuration persisted between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XcastConfig {
    /// Where the recording is written (overwritten on every run)
    pub output_path: PathBuf,
    /// Recording framerate
    pub framerate: u32,
    /// Mode preselected in the tray menu
    pub capture_mode: CaptureMode,
    /// Whether the microphone toggle starts checked
    pub audio_enabled: bool,
    /// Whether to draw the cursor into the recording
    pub show_pointer: bool,
    /// Prefer a hardware H.264 encoder when one is installed
    pub prefer_hardware: bool,
    /// Video encoder element (None = auto-detect)
    pub video_encoder: Option<String>,
    /// Audio encoder element (None = auto-detect)
    pub audio_encoder: Option<String>,
    /// Screen source element
    pub video_source: String,
    /// Microphone source element
    pub audio_source: String,
    /// Device name passed to the audio source
    pub audio_device: Option<String>,
    /// Upper bound for waiting on end-of-stream when stopping
    pub stop_timeout_secs: u64,
    /// Interactive window picker program
    pub window_picker: PathBuf,
}

impl Default for XcastConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("output.mp4"),
            framerate: 30,
            capture_mode: CaptureMode::EntireScreen,
            audio_enabled: false,
            show_pointer: true,
            prefer_hardware: false,
            video_encoder: None,
            audio_encoder: None,
            video_source: "ximagesrc".to_string(),
            audio_source: "pulsesrc".to_string(),
            audio_device: None,
            stop_timeout_secs: 30,
            window_picker: PathBuf::from("xwininfo"),
        }
    }
}

impl XcastConfig {
    /// Directory name under the user's config dir
    pub const ID: &'static str = "xcast";

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(Self::ID).join("config.json"))
    }

    /// Load configuration from disk, or return defaults if unavailable
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            log::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(Some(config)) => config,
            Ok(None) => {
                // First run: write the defaults so they can be edited
                let config = Self::default();
                if let Err(err) = config.save_to(&path) {
                    log::warn!("Could not write default config: {:?}", err);
                }
                config
            }
            Err(err) => {
                log::warn!("Error loading config, using defaults: {:?}", err);
                Self::default()
            }
        }
    }

    /// Read a config file; `None` when the file does not exist
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(Some(config.normalized()))
    }

    /// Write the config file, creating its directory if needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Highest framerate handed to the capture caps
    pub const MAX_FRAMERATE: u32 = 240;

    /// Longest end-of-stream wait, one day
    pub const MAX_STOP_TIMEOUT_SECS: u64 = 24 * 60 * 60;

    /// Framerate within `1..=MAX_FRAMERATE`
    pub fn framerate(&self) -> i32 {
        self.framerate.clamp(1, Self::MAX_FRAMERATE) as i32
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs.min(Self::MAX_STOP_TIMEOUT_SECS))
    }

    /// Pull out-of-range values back into bounds, warning about each one
    fn normalized(mut self) -> Self {
        let framerate = self.framerate() as u32;
        if framerate != self.framerate {
            log::warn!(
                "framerate {} out of range, using {}",
                self.framerate,
                framerate
            );
            self.framerate = framerate;
        }

        let timeout = self.stop_timeout().as_secs();
        if timeout != self.stop_timeout_secs {
            log::warn!(
                "stop_timeout_secs {} too large, using {}",
                self.stop_timeout_secs,
                timeout
            );
            self.stop_timeout_secs = timeout;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_recorder_behaviour() {
        let config = XcastConfig::default();
        assert_eq!(config.output_path, PathBuf::from("output.mp4"));
        assert_eq!(config.capture_mode, CaptureMode::EntireScreen);
        assert!(!config.audio_enabled);
        assert_eq!(config.framerate, 30);
        assert_eq!(config.video_source, "ximagesrc");
        assert_eq!(config.stop_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = XcastConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "framerate": 60, "capture_mode": "SpecificWindow" }"#).unwrap();

        let config = XcastConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(config.framerate, 60);
        assert_eq!(config.capture_mode, CaptureMode::SpecificWindow);
        assert_eq!(config.output_path, PathBuf::from("output.mp4"));
        assert_eq!(config.audio_source, "pulsesrc");
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = XcastConfig {
            audio_enabled: true,
            audio_device: Some("alsa_input.usb".to_string()),
            ..XcastConfig::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(XcastConfig::load_from(&path).unwrap(), Some(config));
    }

    #[test]
    fn test_garbage_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(XcastConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_out_of_range_values_are_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            format!(r#"{{ "framerate": 0, "stop_timeout_secs": {} }}"#, u64::MAX),
        )
        .unwrap();

        let config = XcastConfig::load_from(&path).unwrap().unwrap();
        assert_eq!(config.framerate, 1);
        assert_eq!(config.stop_timeout_secs, XcastConfig::MAX_STOP_TIMEOUT_SECS);
    }

    #[test]
    fn test_accessors_stay_in_bounds() {
        let config = XcastConfig {
            framerate: u32::MAX,
            stop_timeout_secs: u64::MAX,
            ..XcastConfig::default()
        };
        assert_eq!(config.framerate(), XcastConfig::MAX_FRAMERATE as i32);
        assert_eq!(
            config.stop_timeout(),
            Duration::from_secs(XcastConfig::MAX_STOP_TIMEOUT_SECS)
        );

        let config = XcastConfig {
            framerate: 0,
            ..XcastConfig::default()
        };
        assert_eq!(config.framerate(), 1);
        assert_eq!(XcastConfig::default().framerate(), 30);
    }

    #[test]
    fn test_capture_mode_index() {
        for mode in CaptureMode::ALL {
            assert_eq!(CaptureMode::from_index(mode.index()), mode);
        }
        assert_eq!(CaptureMode::from_index(7), CaptureMode::EntireScreen);
    }
}
