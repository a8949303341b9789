use super::{ConstraintSet, DeviceError, MediaDevices, MediaStream, PermissionState, StreamFeed};
use crate::config::FacingMode;
use crate::frame::{PixelFormat, VideoFrame};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// How a mock stream delivers frames once opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFrameMode {
    /// One frame is available as soon as the stream opens
    Immediate,
    /// Frames are produced continuously at the given interval
    Interval(Duration),
    /// The stream opens but never produces a frame
    Never,
    /// The stream opens and immediately reports a playback fault
    Fail(String),
}

struct MockState {
    permission: Mutex<PermissionState>,
    permission_query_fails: AtomicBool,
    camera_present: AtomicBool,
    busy: AtomicBool,
    facing: Mutex<FacingMode>,
    resolution: (u32, u32),
    frame_mode: Mutex<MockFrameMode>,
    acquire_delay: Mutex<Duration>,
    scripted_errors: Mutex<VecDeque<DeviceError>>,
    requests: Mutex<Vec<ConstraintSet>>,
    opened: AtomicUsize,
    active: AtomicUsize,
    stop_calls: AtomicUsize,
}

/// In-process media devices producing synthetic RGB frames.
///
/// Used by the `mock` backend and by tests to script permission states,
/// device errors and frame delivery.
#[derive(Clone)]
pub struct MockMediaDevices {
    state: Arc<MockState>,
}

impl MockMediaDevices {
    /// A granted, user-facing camera with the given native resolution
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(MockState {
                permission: Mutex::new(PermissionState::Granted),
                permission_query_fails: AtomicBool::new(false),
                camera_present: AtomicBool::new(true),
                busy: AtomicBool::new(false),
                facing: Mutex::new(FacingMode::User),
                resolution: (width, height),
                frame_mode: Mutex::new(MockFrameMode::Immediate),
                acquire_delay: Mutex::new(Duration::ZERO),
                scripted_errors: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                stop_calls: AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_permission(self, permission: PermissionState) -> Self {
        self.set_permission(permission);
        self
    }

    pub fn with_facing(self, facing: FacingMode) -> Self {
        *self.state.facing.lock() = facing;
        self
    }

    pub fn with_frame_mode(self, mode: MockFrameMode) -> Self {
        self.set_frame_mode(mode);
        self
    }

    pub fn with_acquire_delay(self, delay: Duration) -> Self {
        *self.state.acquire_delay.lock() = delay;
        self
    }

    pub fn without_camera(self) -> Self {
        self.state.camera_present.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_failing_permission_query(self) -> Self {
        self.state.permission_query_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_permission(&self, permission: PermissionState) {
        *self.state.permission.lock() = permission;
    }

    pub fn set_frame_mode(&self, mode: MockFrameMode) {
        *self.state.frame_mode.lock() = mode;
    }

    pub fn set_busy(&self, busy: bool) {
        self.state.busy.store(busy, Ordering::SeqCst);
    }

    /// Make the next media request fail with `error`
    pub fn push_error(&self, error: DeviceError) {
        self.state.scripted_errors.lock().push_back(error);
    }

    /// Constraint sets passed to every media request so far
    pub fn requests(&self) -> Vec<ConstraintSet> {
        self.state.requests.lock().clone()
    }

    pub fn opened_streams(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Streams whose tracks are still running
    pub fn active_streams(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.state.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn query_permission(&self) -> Result<PermissionState, DeviceError> {
        if self.state.permission_query_fails.load(Ordering::SeqCst) {
            return Err(DeviceError::Other("permissions API unavailable".to_string()));
        }
        Ok(*self.state.permission.lock())
    }

    async fn get_user_media(
        &self,
        constraints: &ConstraintSet,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        self.state.requests.lock().push(constraints.clone());

        let delay = *self.state.acquire_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if *self.state.permission.lock() == PermissionState::Denied {
            return Err(DeviceError::NotAllowed);
        }
        if let Some(error) = self.state.scripted_errors.lock().pop_front() {
            debug!("Mock camera returning scripted error: {}", error);
            return Err(error);
        }
        if !self.state.camera_present.load(Ordering::SeqCst) {
            return Err(DeviceError::NotFound);
        }
        if self.state.busy.load(Ordering::SeqCst) {
            return Err(DeviceError::NotReadable("device or resource busy".to_string()));
        }

        let (width, height) = self.state.resolution;
        let facing = *self.state.facing.lock();
        if let Some(constraint) = constraints.violation(facing, width, height) {
            return Err(DeviceError::OverConstrained {
                constraint: constraint.to_string(),
            });
        }

        let mode = self.state.frame_mode.lock().clone();
        let stream = MockStream::open(Arc::clone(&self.state), mode);
        Ok(Box::new(stream))
    }
}

struct MockStream {
    id: String,
    feed: Arc<watch::Sender<StreamFeed>>,
    stopped: Arc<AtomicBool>,
    producer: Mutex<Option<JoinHandle<()>>>,
    state: Arc<MockState>,
}

impl MockStream {
    fn open(state: Arc<MockState>, mode: MockFrameMode) -> Self {
        let (feed, _) = watch::channel(StreamFeed::Starting);
        let feed = Arc::new(feed);
        let stopped = Arc::new(AtomicBool::new(false));
        let (width, height) = state.resolution;

        state.opened.fetch_add(1, Ordering::SeqCst);
        state.active.fetch_add(1, Ordering::SeqCst);

        let producer = match mode {
            MockFrameMode::Immediate => {
                feed.send_replace(StreamFeed::Frame(synthetic_frame(0, width, height)));
                None
            }
            MockFrameMode::Never => None,
            MockFrameMode::Fail(details) => {
                feed.send_replace(StreamFeed::Failed(details));
                None
            }
            MockFrameMode::Interval(interval) => {
                let feed = Arc::clone(&feed);
                let stopped = Arc::clone(&stopped);
                Some(tokio::spawn(async move {
                    let mut frame_id = 0u64;
                    let mut timer = tokio::time::interval(interval);
                    info!("Mock camera capture loop started");

                    while !stopped.load(Ordering::SeqCst) {
                        timer.tick().await;
                        if stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        trace!("Generated mock frame {} ({}x{})", frame_id, width, height);
                        feed.send_replace(StreamFeed::Frame(synthetic_frame(
                            frame_id, width, height,
                        )));
                        frame_id += 1;
                    }

                    info!("Mock camera capture loop stopped");
                }))
            }
        };

        Self {
            id: Uuid::new_v4().to_string(),
            feed,
            stopped,
            producer: Mutex::new(producer),
            state,
        }
    }

    fn halt(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.producer.lock().take() {
            task.abort();
        }
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.feed.send_replace(StreamFeed::Ended);
        debug!("Mock camera stream {} stopped", self.id);
    }
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> &str {
        "Mock Camera"
    }

    fn subscribe(&self) -> watch::Receiver<StreamFeed> {
        self.feed.subscribe()
    }

    fn stop(&self) {
        self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.halt();
    }

    fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Gradient test pattern that shifts with the frame number
fn synthetic_frame(frame_id: u64, width: u32, height: u32) -> VideoFrame {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    let shift = (frame_id * 8 % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width.max(1)) as u8);
            data.push((y * 255 / height.max(1)) as u8);
            data.push(shift);
        }
    }
    VideoFrame::new(frame_id, SystemTime::now(), data, width, height, PixelFormat::Rgb24)
}
