//! GStreamer pipeline construction and management
//!
//! Topology:
//!
//! ```text
//! source ! videoscale ! videoconvert ! h264 encoder ! queue ! mp4mux ! filesink
//! audio source ! audioconvert ! aac encoder ! queue ! mp4mux
//! ```

use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::XcastConfig;
use super::encoder;
use super::error::RecordError;
use super::state::{CancelToken, CapturePlan, CaptureSession, SessionFactory, StopOutcome};

/// Granularity of the end-of-stream wait; bounds cancellation latency
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Builds [`Pipeline`]s from the user's configuration
pub struct GstFactory {
    config: XcastConfig,
}

impl GstFactory {
    pub fn new(config: XcastConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for GstFactory {
    type Session = Pipeline;

    fn build(&self, plan: &CapturePlan) -> Result<Pipeline, RecordError> {
        Pipeline::new(&self.config, plan)
    }
}

/// GStreamer pipeline recording the screen to an MP4 file
pub struct Pipeline {
    pipeline: gst::Pipeline,
    output_path: PathBuf,
}

impl Pipeline {
    /// Create and link the recording graph. The graph is left in the Null state.
    pub fn new(config: &XcastConfig, plan: &CapturePlan) -> Result<Self, RecordError> {
        gst::init().map_err(|e| RecordError::Init(e.to_string()))?;

        let location = config
            .output_path
            .to_str()
            .ok_or_else(|| RecordError::OutputPath(config.output_path.clone()))?;

        let pipeline = gst::Pipeline::with_name("screen-audio-recording");

        // Video branch
        let source = make(&config.video_source, "video-source")?;
        set_if_supported(&source, "use-damage", true);
        set_if_supported(&source, "show-pointer", config.show_pointer);
        set_if_supported(&source, "is-live", true);
        if let Some(window) = plan.window {
            if !set_if_supported(&source, "xid", window.xid()) {
                log::warn!(
                    "{} cannot target a window, recording the whole screen",
                    config.video_source
                );
            }
        }

        let videoscale = make("videoscale", "videoscale")?;
        videoscale.set_property_from_str("method", "nearest-neighbour");
        let videoconvert = make("videoconvert", "videoconvert")?;

        let video_encoder_name =
            encoder::video_encoder(config.video_encoder.as_deref(), config.prefer_hardware);
        let video_encoder = make(&video_encoder_name, "video-encoder")?;
        if video_encoder_name == "x264enc" {
            video_encoder.set_property_from_str("tune", "zerolatency");
        }
        let video_queue = make("queue", "video-queue")?;

        // Audio branch
        let audio = if plan.audio {
            let audio_source = make(&config.audio_source, "audio-source")?;
            set_if_supported(&audio_source, "is-live", true);
            if let Some(device) = &config.audio_device {
                set_if_supported(&audio_source, "device", device.as_str());
            }
            let audioconvert = make("audioconvert", "audioconvert")?;
            let audio_encoder_name = encoder::audio_encoder(config.audio_encoder.as_deref());
            let audio_encoder = make(&audio_encoder_name, "audio-encoder")?;
            let audio_queue = make("queue", "audio-queue")?;
            Some([audio_source, audioconvert, audio_encoder, audio_queue])
        } else {
            None
        };

        let muxer = make("mp4mux", "muxer")?;
        let filesink = make("filesink", "filesink")?;
        filesink.set_property("location", location);

        // Add elements to pipeline
        add(&pipeline, &[&source, &videoscale, &videoconvert, &video_encoder, &video_queue])?;
        if let Some(branch) = &audio {
            add(&pipeline, &branch.each_ref())?;
        }
        add(&pipeline, &[&muxer, &filesink])?;

        // Link video elements with caps
        let framerate_caps = gst::Caps::builder("video/x-raw")
            .field("framerate", gst::Fraction::new(config.framerate(), 1))
            .build();
        let raw_caps = gst::Caps::builder("video/x-raw").build();
        let encoder_caps = if encoder::known_encoder(&video_encoder_name)
            .is_none_or(|e| e.wants_i420())
        {
            gst::Caps::builder("video/x-raw")
                .field("format", gst_video::VideoFormat::I420.to_str().as_str())
                .build()
        } else {
            raw_caps.clone()
        };

        link_filtered(&source, &videoscale, &framerate_caps)?;
        link_filtered(&videoscale, &videoconvert, &raw_caps)?;
        link_filtered(&videoconvert, &video_encoder, &encoder_caps)?;
        link(&video_encoder, &video_queue)?;
        link_to_mux(&video_queue, &muxer, "video_%u", "video")?;

        // Link audio elements
        if let Some([audio_source, audioconvert, audio_encoder, audio_queue]) = &audio {
            link(audio_source, audioconvert)?;
            link(audioconvert, audio_encoder)?;
            link(audio_encoder, audio_queue)?;
            link_to_mux(audio_queue, &muxer, "audio_%u", "audio")?;
        }

        link(&muxer, &filesink)?;

        log::info!(
            "Pipeline built: {} -> {} ({})",
            config.video_source,
            config.output_path.display(),
            if plan.audio { "with audio" } else { "video only" }
        );

        Ok(Self {
            pipeline,
            output_path: config.output_path.clone(),
        })
    }

    /// Verify that the output file exists and has data
    fn verify_output(&self) -> Result<u64> {
        let metadata = std::fs::metadata(&self.output_path).with_context(|| {
            format!("Output file was not created: {}", self.output_path.display())
        })?;

        if metadata.len() == 0 {
            return Err(anyhow::anyhow!(
                "Output file is empty: {}",
                self.output_path.display()
            ));
        }

        Ok(metadata.len())
    }
}

impl CaptureSession for Pipeline {
    fn play(&mut self) -> Result<(), RecordError> {
        self.pipeline.set_state(gst::State::Playing).map_err(|_| {
            log::error!("Unable to set the pipeline to the playing state");
            RecordError::StateChange
        })?;
        Ok(())
    }

    fn finish(self, timeout: Duration, cancel: &CancelToken) -> StopOutcome {
        log::info!("Sending EOS signal to pipeline...");
        if !self.pipeline.send_event(gst::event::Eos::new()) {
            log::warn!("Pipeline did not accept EOS");
        }

        log::info!("Waiting for pipeline to finish (up to {}s)...", timeout.as_secs());
        let outcome = match self.pipeline.bus() {
            Some(bus) => wait_for_eos(&bus, timeout, cancel),
            None => StopOutcome::Error {
                source: self.pipeline.name().to_string(),
                message: "pipeline has no bus".to_string(),
                debug: None,
            },
        };

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            log::error!("Failed to stop pipeline: {}", e);
        }

        match self.verify_output() {
            Ok(size) => log::info!(
                "Output file verified: {} ({} bytes)",
                self.output_path.display(),
                size
            ),
            Err(e) => log::warn!("{:#}", e),
        }

        outcome
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Wait for EOS or an error on the bus until `timeout` passes or `cancel` fires
fn wait_for_eos(bus: &gst::Bus, timeout: Duration, cancel: &CancelToken) -> StopOutcome {
    // None when the timeout is past what Instant can represent: wait until cancelled
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if cancel.is_cancelled() {
            log::warn!("EOS wait cancelled, forcing pipeline shutdown");
            return StopOutcome::Cancelled;
        }

        let remaining = deadline.map_or(POLL_INTERVAL, |d| {
            d.saturating_duration_since(Instant::now())
        });
        if remaining.is_zero() {
            log::warn!("EOS timeout reached, forcing pipeline shutdown");
            return StopOutcome::TimedOut;
        }

        let slice = gst::ClockTime::from_mseconds(remaining.min(POLL_INTERVAL).as_millis() as u64);
        let Some(msg) =
            bus.timed_pop_filtered(slice, &[gst::MessageType::Eos, gst::MessageType::Error])
        else {
            continue;
        };

        use gst::MessageView;
        match msg.view() {
            MessageView::Eos(..) => {
                log::info!("End-Of-Stream reached");
                return StopOutcome::Eos;
            }
            MessageView::Error(err) => {
                let source = err
                    .src()
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let message = err.error().to_string();
                let debug = err.debug().map(|d| d.to_string());
                log::error!("Error received from element {}: {}", source, message);
                log::error!("Debugging information: {}", debug.as_deref().unwrap_or("None"));
                return StopOutcome::Error {
                    source,
                    message,
                    debug,
                };
            }
            _ => {}
        }
    }
}

fn make(factory: &str, name: &str) -> Result<gst::Element, RecordError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|e| {
            log::error!("Failed to create {} element: {}", factory, e);
            RecordError::ElementCreation {
                element: factory.to_string(),
            }
        })
}

/// Set a property only if the element has it; returns whether it was set
fn set_if_supported(element: &gst::Element, property: &str, value: impl Into<gst::glib::Value>) -> bool {
    if element.find_property(property).is_none() {
        return false;
    }
    element.set_property(property, value);
    true
}

fn add(pipeline: &gst::Pipeline, elements: &[&gst::Element]) -> Result<(), RecordError> {
    pipeline
        .add_many(elements.iter().copied())
        .map_err(|e| RecordError::Link {
            from: elements
                .iter()
                .map(|el| el.name().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            to: pipeline.name().to_string(),
            reason: e.to_string(),
        })
}

fn link_error(from: &gst::Element, to: &gst::Element, reason: impl ToString) -> RecordError {
    let err = RecordError::Link {
        from: from.name().to_string(),
        to: to.name().to_string(),
        reason: reason.to_string(),
    };
    log::error!("{}", err);
    err
}

fn link(from: &gst::Element, to: &gst::Element) -> Result<(), RecordError> {
    from.link(to).map_err(|e| link_error(from, to, e))
}

fn link_filtered(from: &gst::Element, to: &gst::Element, caps: &gst::Caps) -> Result<(), RecordError> {
    from.link_filtered(to, caps)
        .map_err(|e| link_error(from, to, format!("{} (caps {})", e, caps)))
}

/// Link a queue's src pad to a freshly requested muxer pad
fn link_to_mux(
    queue: &gst::Element,
    muxer: &gst::Element,
    template: &str,
    kind: &'static str,
) -> Result<(), RecordError> {
    let sink_pad = muxer.request_pad_simple(template).ok_or_else(|| {
        log::error!("Failed to get {} pad from {}", kind, muxer.name());
        RecordError::MuxPad { kind }
    })?;

    let src_pad = queue
        .static_pad("src")
        .ok_or_else(|| link_error(queue, muxer, "queue has no src pad"))?;

    src_pad
        .link(&sink_pad)
        .map_err(|e| link_error(queue, muxer, format!("{:?}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureMode;
    use crate::screencast::state::Recorder;
    use crate::screencast::window::{WindowId, Xwininfo};
    use gstreamer_pbutils as gst_pbutils;
    use gstreamer_pbutils::prelude::*;

    fn plugins_available(names: &[&str]) -> bool {
        if gst::init().is_err() {
            return false;
        }
        let missing: Vec<_> = names
            .iter()
            .filter(|n| gst::ElementFactory::find(n).is_none())
            .collect();
        if !missing.is_empty() {
            eprintln!("skipping, missing GStreamer elements: {:?}", missing);
        }
        missing.is_empty()
    }

    const VIDEO_ELEMENTS: &[&str] = &[
        "videotestsrc",
        "videoscale",
        "videoconvert",
        "x264enc",
        "queue",
        "mp4mux",
        "filesink",
        "qtdemux",
    ];

    fn test_config(dir: &Path) -> XcastConfig {
        XcastConfig {
            output_path: dir.join("output.mp4"),
            video_source: "videotestsrc".to_string(),
            video_encoder: Some("x264enc".to_string()),
            audio_source: "audiotestsrc".to_string(),
            stop_timeout_secs: 10,
            ..XcastConfig::default()
        }
    }

    fn screen_plan(audio: bool) -> CapturePlan {
        CapturePlan {
            mode: CaptureMode::EntireScreen,
            window: None,
            audio,
        }
    }

    /// Record ~1s and return (video streams, audio streams) of the result
    fn record_and_discover(config: XcastConfig, audio: bool) -> (usize, usize) {
        let output = config.output_path.clone();
        let timeout = config.stop_timeout();
        let mut recorder = Recorder::new(GstFactory::new(config), Xwininfo::default(), timeout);

        recorder.start(CaptureMode::EntireScreen, audio).unwrap();
        assert!(recorder.is_recording());
        std::thread::sleep(Duration::from_secs(1));

        assert_eq!(recorder.stop(&CancelToken::default()), Some(StopOutcome::Eos));
        assert!(!recorder.is_recording());

        let size = std::fs::metadata(&output).unwrap().len();
        assert!(size > 0);

        let discoverer = gst_pbutils::Discoverer::new(gst::ClockTime::from_seconds(10)).unwrap();
        let uri = gst::glib::filename_to_uri(&output, None).unwrap();
        let info = discoverer.discover_uri(uri.as_str()).unwrap();
        (info.video_streams().len(), info.audio_streams().len())
    }

    #[test]
    fn test_record_screen_without_audio() {
        if !plugins_available(VIDEO_ELEMENTS) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(record_and_discover(test_config(dir.path()), false), (1, 0));
    }

    #[test]
    fn test_record_screen_with_audio() {
        if !plugins_available(VIDEO_ELEMENTS)
            || !plugins_available(&["audiotestsrc", "audioconvert", "voaacenc"])
        {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let config = XcastConfig {
            audio_encoder: Some("voaacenc".to_string()),
            ..test_config(dir.path())
        };
        assert_eq!(record_and_discover(config, true), (1, 1));
    }

    #[test]
    fn test_existing_output_is_overwritten() {
        if !plugins_available(VIDEO_ELEMENTS) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.output_path, b"stale").unwrap();

        assert_eq!(record_and_discover(config, false), (1, 0));
    }

    #[test]
    fn test_missing_source_element() {
        if gst::init().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let config = XcastConfig {
            video_source: "no-such-screen-src".to_string(),
            ..test_config(dir.path())
        };

        let err = Pipeline::new(&config, &screen_plan(false)).err().unwrap();
        assert!(matches!(
            err,
            RecordError::ElementCreation { ref element } if element == "no-such-screen-src"
        ));
    }

    #[test]
    fn test_missing_audio_encoder() {
        if !plugins_available(VIDEO_ELEMENTS) || !plugins_available(&["audiotestsrc", "audioconvert"]) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let config = XcastConfig {
            audio_encoder: Some("no-such-aacenc".to_string()),
            ..test_config(dir.path())
        };

        let err = Pipeline::new(&config, &screen_plan(true)).err().unwrap();
        assert!(matches!(err, RecordError::ElementCreation { .. }));
    }

    #[test]
    fn test_window_plan_on_source_without_xid() {
        if !plugins_available(VIDEO_ELEMENTS) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let plan = CapturePlan {
            mode: CaptureMode::SpecificWindow,
            window: Some(WindowId::new(0x400001)),
            audio: false,
        };
        assert!(Pipeline::new(&test_config(dir.path()), &plan).is_ok());
    }

    #[test]
    fn test_cancelled_wait_still_tears_down() {
        if !plugins_available(VIDEO_ELEMENTS) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(&test_config(dir.path()), &screen_plan(false)).unwrap();
        pipeline.play().unwrap();

        let cancel = CancelToken::default();
        cancel.cancel();
        let gst_pipeline = pipeline.pipeline.clone();
        assert_eq!(pipeline.finish(Duration::from_secs(10), &cancel), StopOutcome::Cancelled);
        assert_eq!(gst_pipeline.current_state(), gst::State::Null);
    }

    fn bare_bus() -> Option<gst::Bus> {
        gst::init().ok()?;
        Some(gst::Bus::new())
    }

    #[test]
    fn test_wait_on_silent_bus_times_out() {
        let Some(bus) = bare_bus() else {
            return;
        };
        let started = Instant::now();
        let outcome = wait_for_eos(&bus, Duration::from_millis(200), &CancelToken::default());
        assert_eq!(outcome, StopOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_wait_reports_bus_error_with_source() {
        let Some(bus) = bare_bus() else {
            return;
        };
        let muxer = gst::Bin::builder().name("mp4-muxer").build();
        bus.post(
            gst::message::Error::builder(gst::CoreError::Failed, "Could not write header")
                .src(&muxer)
                .debug("qtmux.c: header write failed")
                .build(),
        )
        .unwrap();

        match wait_for_eos(&bus, Duration::from_secs(5), &CancelToken::default()) {
            StopOutcome::Error {
                source,
                message,
                debug,
            } => {
                assert_eq!(source, "mp4-muxer");
                assert_eq!(message, "Could not write header");
                assert_eq!(debug.as_deref(), Some("qtmux.c: header write failed"));
            }
            other => panic!("expected an error outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_wait_returns_on_eos() {
        let Some(bus) = bare_bus() else {
            return;
        };
        bus.post(gst::message::Eos::new()).unwrap();
        assert_eq!(
            wait_for_eos(&bus, Duration::from_secs(5), &CancelToken::default()),
            StopOutcome::Eos
        );
    }

    #[test]
    fn test_unrepresentable_timeout_waits_until_cancelled() {
        let Some(bus) = bare_bus() else {
            return;
        };
        let cancel = CancelToken::default();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(250));
            trigger.cancel();
        });

        assert_eq!(wait_for_eos(&bus, Duration::MAX, &cancel), StopOutcome::Cancelled);
        canceller.join().unwrap();
    }
}
