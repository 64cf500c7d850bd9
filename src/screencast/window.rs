//! Interactive window selection via `xwininfo`

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::error::PickError;

/// X11 window identifier handed to the screen source as `xid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    pub fn new(xid: u64) -> Self {
        Self(xid)
    }

    /// Parse a decimal (`xwininfo -int`) or `0x`-prefixed hex identifier
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let xid = match token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16).ok()?,
            None => token.parse().ok()?,
        };
        Some(Self::new(xid))
    }

    pub fn xid(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Something that lets the user choose a window to record
pub trait WindowPicker {
    fn pick(&self) -> Result<WindowId, PickError>;
}

/// Runs `xwininfo` and waits for the user to click a window
#[derive(Debug, Clone)]
pub struct Xwininfo {
    program: PathBuf,
    args: Vec<String>,
}

impl Xwininfo {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: vec!["-int".to_string()],
        }
    }

    #[cfg(test)]
    fn with_args(program: &str, args: &[&str]) -> Self {
        Self {
            program: PathBuf::from(program),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for Xwininfo {
    fn default() -> Self {
        Self::new("xwininfo")
    }
}

impl WindowPicker for Xwininfo {
    fn pick(&self) -> Result<WindowId, PickError> {
        let program = self.program.display().to_string();
        log::info!("Waiting for window selection via {}...", program);

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| PickError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PickError::Exit {
                program,
                status: output.status,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let token = find_window_id(&stdout).ok_or(PickError::NotFound)?;
        let id = WindowId::parse(token).ok_or_else(|| PickError::InvalidId(token.to_string()))?;

        log::info!("Selected window ID: {}", token);
        Ok(id)
    }
}

/// Extract the identifier token following `Window id:` in xwininfo output
pub fn find_window_id(output: &str) -> Option<&str> {
    output
        .lines()
        .find_map(|line| line.split_once("Window id:"))
        .and_then(|(_, rest)| rest.split_whitespace().next())
}
