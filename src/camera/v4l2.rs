use super::{ConstraintSet, DeviceError, MediaDevices, MediaStream, PermissionState, StreamFeed};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{PixelFormat, VideoFrame};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageType, MessageView, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const START_TIMEOUT: Duration = Duration::from_secs(5);
const BUS_POLL: Duration = Duration::from_millis(200);

/// Video4Linux capture devices read through a GStreamer pipeline.
///
/// V4L2 has no notion of which way a camera faces, so
/// `ConstraintSet::facing_mode` is ignored here: the configured device node
/// is opened whatever facing mode is requested, and a constraint set is never
/// rejected because of it. Pick the front or rear camera with `camera.device`.
pub struct V4l2MediaDevices {
    device: String,
}

impl V4l2MediaDevices {
    pub fn new(config: &CameraConfig) -> Result<Self, CameraError> {
        gstreamer::init()
            .map_err(|e| CameraError::Unknown(format!("Failed to initialize GStreamer: {}", e)))?;

        info!("Using V4L2 camera device {}", config.device);
        Ok(Self {
            device: config.device.clone(),
        })
    }
}

#[async_trait]
impl MediaDevices for V4l2MediaDevices {
    /// Derived from whether the device node can be opened read-write
    async fn query_permission(&self) -> Result<PermissionState, DeviceError> {
        match tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .await
        {
            Ok(_) => Ok(PermissionState::Granted),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(PermissionState::Denied),
            // Missing node is reported by the media request itself
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(PermissionState::Prompt),
            Err(e) => Err(DeviceError::Other(e.to_string())),
        }
    }

    async fn get_user_media(
        &self,
        constraints: &ConstraintSet,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        if !tokio::fs::try_exists(&self.device).await.unwrap_or(false) {
            return Err(DeviceError::NotFound);
        }

        let description = pipeline_description(&self.device, constraints);
        let device = self.device.clone();

        let stream = tokio::task::spawn_blocking(move || V4l2Stream::open(device, &description))
            .await
            .map_err(|e| DeviceError::Other(format!("camera start task failed: {}", e)))??;

        Ok(Box::new(stream))
    }
}

/// Source caps carry the resolution constraint so an unsupported range
/// fails negotiation instead of being scaled away. Facing mode is not
/// expressible in caps and is dropped.
fn pipeline_description(device: &str, constraints: &ConstraintSet) -> String {
    let mut source_caps = Vec::new();
    if let Some(width) = constraints.width {
        source_caps.push(format!("width=[{},{}]", width.min, width.max));
    }
    if let Some(height) = constraints.height {
        source_caps.push(format!("height=[{},{}]", height.min, height.max));
    }

    let source_filter = if source_caps.is_empty() {
        String::new()
    } else {
        format!("video/x-raw,{} ! ", source_caps.join(","))
    };

    format!(
        "v4l2src device={} do-timestamp=true ! {}\
         videoconvert ! videoscale ! video/x-raw,format=RGB ! \
         queue max-size-buffers=2 leaky=downstream ! \
         appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
        device, source_filter
    )
}

struct V4l2Stream {
    id: String,
    label: String,
    pipeline: Pipeline,
    feed: Arc<watch::Sender<StreamFeed>>,
    stopped: Arc<AtomicBool>,
}

impl V4l2Stream {
    /// Build and start the pipeline. Blocks until it is playing or fails.
    fn open(device: String, description: &str) -> Result<Self, DeviceError> {
        debug!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(description)
            .map_err(|e| DeviceError::Other(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| DeviceError::Other("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| DeviceError::Other("pipeline has no appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| DeviceError::Other("Failed to downcast to AppSink".to_string()))?;

        let (feed, _) = watch::channel(StreamFeed::Starting);
        let feed = Arc::new(feed);
        let frame_counter = Arc::new(AtomicU64::new(0));

        let sink_feed = Arc::clone(&feed);
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
                    match frame_from_sample(&sample, frame_id) {
                        Ok(frame) => {
                            trace!("Captured frame {} ({}x{})", frame_id, frame.width, frame.height);
                            sink_feed.send_replace(StreamFeed::Frame(frame));
                        }
                        Err(e) => debug!("Dropping sample {}: {}", frame_id, e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = pipeline
            .bus()
            .ok_or_else(|| DeviceError::Other("pipeline has no bus".to_string()))?;

        let started = pipeline.set_state(gstreamer::State::Playing).is_ok()
            && pipeline
                .state(ClockTime::from_mseconds(START_TIMEOUT.as_millis() as u64))
                .0
                .is_ok();

        if let Some(message) = bus.pop_filtered(&[MessageType::Error]) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            if let MessageView::Error(err) = message.view() {
                return Err(classify_error(err.error(), err.debug().map(|d| d.to_string())));
            }
        }
        if !started {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(DeviceError::Other(format!("{} did not start", device)));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        Self::watch_bus(bus, Arc::clone(&feed), Arc::clone(&stopped))?;

        info!("GStreamer pipeline for {} started", device);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            label: device,
            pipeline,
            feed,
            stopped,
        })
    }

    /// Forward runtime errors and end-of-stream from the bus to the feed
    fn watch_bus(
        bus: gstreamer::Bus,
        feed: Arc<watch::Sender<StreamFeed>>,
        stopped: Arc<AtomicBool>,
    ) -> Result<(), DeviceError> {
        std::thread::Builder::new()
            .name("v4l2-bus".to_string())
            .spawn(move || {
                let poll = ClockTime::from_mseconds(BUS_POLL.as_millis() as u64);
                while !stopped.load(Ordering::SeqCst) {
                    let Some(message) =
                        bus.timed_pop_filtered(poll, &[MessageType::Error, MessageType::Eos])
                    else {
                        continue;
                    };
                    match message.view() {
                        MessageView::Error(err) => {
                            error!("Camera pipeline error: {}", err.error());
                            feed.send_replace(StreamFeed::Failed(err.error().to_string()));
                            break;
                        }
                        MessageView::Eos(_) => {
                            warn!("Camera pipeline reached end of stream");
                            feed.send_replace(StreamFeed::Ended);
                            break;
                        }
                        _ => {}
                    }
                }
            })
            .map(|_| ())
            .map_err(|e| DeviceError::Other(format!("failed to spawn bus watcher: {}", e)))
    }
}

impl MediaStream for V4l2Stream {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn subscribe(&self) -> watch::Receiver<StreamFeed> {
        self.feed.subscribe()
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop camera pipeline for {}: {}", self.label, e);
        }
        self.feed.send_replace(StreamFeed::Ended);
        info!("Camera stream {} on {} stopped", self.id, self.label);
    }

    fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn classify_error(error: gstreamer::glib::Error, debug: Option<String>) -> DeviceError {
    let details = match debug {
        Some(debug) => format!("{} ({})", error, debug),
        None => error.to_string(),
    };
    let lower = details.to_lowercase();

    if error.matches(gstreamer::CoreError::Negotiation) || lower.contains("not-negotiated") {
        DeviceError::OverConstrained {
            constraint: "resolution".to_string(),
        }
    } else if error.matches(gstreamer::ResourceError::Busy) || lower.contains("busy") {
        DeviceError::NotReadable(details)
    } else if error.matches(gstreamer::ResourceError::NotAuthorized)
        || lower.contains("permission denied")
    {
        DeviceError::NotAllowed
    } else if error.matches(gstreamer::ResourceError::NotFound) {
        DeviceError::NotFound
    } else {
        DeviceError::Other(details)
    }
}

/// Copy an RGB sample into a tightly packed frame, honouring row stride
fn frame_from_sample(sample: &gstreamer::Sample, frame_id: u64) -> Result<VideoFrame, String> {
    let buffer = sample.buffer().ok_or("no buffer in sample")?;
    let caps = sample.caps().ok_or("no caps in sample")?;
    let info = VideoInfo::from_caps(caps).map_err(|e| format!("Failed to get video info: {}", e))?;
    let map = buffer
        .map_readable()
        .map_err(|e| format!("Failed to map buffer: {}", e))?;

    let width = info.width();
    let height = info.height();
    let stride = info.stride()[0] as usize;
    let row = width as usize * PixelFormat::Rgb24.bytes_per_pixel();
    let bytes = map.as_slice();

    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let line = bytes
            .get(start..start + row)
            .ok_or_else(|| format!("buffer too short for row {}", y))?;
        data.extend_from_slice(line);
    }

    Ok(VideoFrame::new(
        frame_id,
        SystemTime::now(),
        data,
        width,
        height,
        PixelFormat::Rgb24,
    ))
}
