//! Encoder detection and selection
//!
//! Queries GStreamer for installed H.264 and AAC encoders. The software x264
//! encoder is the default; hardware encoders are used only when asked for.

use gstreamer as gst;

/// Media kind an encoder produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Aac,
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "H.264",
            Codec::Aac => "AAC",
        }
    }
}

/// A known encoder element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    /// Human-readable name (e.g., "VA-API H.264")
    pub name: &'static str,
    /// GStreamer element name (e.g., "vaapih264enc")
    pub gst_element: &'static str,
    pub codec: Codec,
    /// Whether this is hardware-accelerated
    pub hardware: bool,
    /// Priority (lower = better)
    pub priority: u8,
}

impl EncoderInfo {
    const fn new(name: &'static str, gst_element: &'static str, codec: Codec, hardware: bool, priority: u8) -> Self {
        Self {
            name,
            gst_element,
            codec,
            hardware,
            priority,
        }
    }

    /// Display name with hardware/software indicator
    pub fn display_name(&self) -> String {
        let hw_indicator = if self.hardware {
            " (Hardware)"
        } else {
            " (Software)"
        };
        format!("{}{}", self.name, hw_indicator)
    }

    /// Whether the encoder wants planar I420 input
    pub fn wants_i420(&self) -> bool {
        matches!(self.gst_element, "x264enc" | "openh264enc")
    }
}

const KNOWN_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo::new("x264 H.264", "x264enc", Codec::H264, false, 10),
    EncoderInfo::new("OpenH264", "openh264enc", Codec::H264, false, 11),
    EncoderInfo::new("VA-API H.264", "vaapih264enc", Codec::H264, true, 20),
    EncoderInfo::new("VA H.264", "vah264enc", Codec::H264, true, 21),
    EncoderInfo::new("NVENC H.264", "nvh264enc", Codec::H264, true, 22),
    EncoderInfo::new("VisualOn AAC", "voaacenc", Codec::Aac, false, 10),
    EncoderInfo::new("FFmpeg AAC", "avenc_aac", Codec::Aac, false, 11),
    EncoderInfo::new("FDK AAC", "fdkaacenc", Codec::Aac, false, 12),
];

/// Look up a known encoder by element name
pub fn known_encoder(gst_element: &str) -> Option<&'static EncoderInfo> {
    KNOWN_ENCODERS.iter().find(|e| e.gst_element == gst_element)
}

/// Installed encoders for a codec, sorted by priority
///
/// GStreamer must already be initialized.
pub fn detect_encoders(codec: Codec) -> Vec<&'static EncoderInfo> {
    let mut encoders: Vec<_> = KNOWN_ENCODERS
        .iter()
        .filter(|e| e.codec == codec && encoder_available(e.gst_element))
        .collect();
    encoders.sort_by_key(|e| e.priority);
    encoders
}

/// Check if a GStreamer element is available
fn encoder_available(element_name: &str) -> bool {
    gst::ElementFactory::find(element_name).is_some()
}

/// Choose among installed encoders
pub fn choose<'a>(installed: &[&'a EncoderInfo], prefer_hardware: bool) -> Option<&'a EncoderInfo> {
    if prefer_hardware {
        if let Some(&hw) = installed.iter().find(|e| e.hardware) {
            return Some(hw);
        }
    }
    installed.iter().find(|e| !e.hardware).or(installed.first()).copied()
}

/// Element name of the video encoder to use
///
/// Falls back to the default element name when nothing is installed so the
/// pipeline reports a normal element creation failure.
pub fn video_encoder(override_element: Option<&str>, prefer_hardware: bool) -> String {
    if let Some(element) = override_element {
        return element.to_string();
    }
    resolve(Codec::H264, prefer_hardware, "x264enc")
}

/// Element name of the audio encoder to use
pub fn audio_encoder(override_element: Option<&str>) -> String {
    if let Some(element) = override_element {
        return element.to_string();
    }
    resolve(Codec::Aac, false, "voaacenc")
}

fn resolve(codec: Codec, prefer_hardware: bool, fallback: &str) -> String {
    let installed = detect_encoders(codec);
    match choose(&installed, prefer_hardware) {
        Some(encoder) => {
            log::info!("Using {} encoder: {}", codec.name(), encoder.display_name());
            encoder.gst_element.to_string()
        }
        None => {
            log::warn!("No {} encoder detected, trying {}", codec.name(), fallback);
            fallback.to_string()
        }
    }
}
