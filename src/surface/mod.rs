//! Display surfaces that present a camera stream and expose its latest
//! decoded frame for capture.

mod binding;

pub use binding::{bind_stream, wait_until_ready};

use crate::camera::{MediaStream, StreamFeed};
use crate::error::CameraError;
use crate::frame::VideoFrame;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Playback readiness of a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// Nothing attached, or attached and waiting for a decodable frame
    Pending,
    /// A decodable frame can be read synchronously
    Ready,
    PlaybackError(String),
}

pub trait DisplaySurface: Send + Sync {
    /// Bind `stream` to the surface and begin playback. Any previous
    /// binding is dropped first.
    fn attach(&self, stream: &dyn MediaStream) -> Result<watch::Receiver<SurfaceSignal>, CameraError>;

    /// Unbind the current stream. Safe to call when nothing is attached.
    fn detach(&self);

    /// Latest decoded frame, only once the surface has signalled ready
    fn current_frame(&self) -> Option<VideoFrame>;

    /// Native size of the video being displayed, `(0, 0)` when not live
    fn dimensions(&self) -> (u32, u32);
}

struct Binding {
    stream_id: String,
    task: JoinHandle<()>,
}

/// Surface that follows a stream's feed and keeps its newest decodable frame
pub struct VideoSurface {
    signal: Arc<watch::Sender<SurfaceSignal>>,
    generation: Arc<AtomicU64>,
    latest: Arc<Mutex<Option<VideoFrame>>>,
    binding: Mutex<Option<Binding>>,
}

impl VideoSurface {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(SurfaceSignal::Pending);
        Self {
            signal: Arc::new(signal),
            generation: Arc::new(AtomicU64::new(0)),
            latest: Arc::new(Mutex::new(None)),
            binding: Mutex::new(None),
        }
    }

    pub fn signal(&self) -> SurfaceSignal {
        self.signal.borrow().clone()
    }

    pub fn is_attached(&self) -> bool {
        self.binding.lock().is_some()
    }
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for VideoSurface {
    fn attach(&self, stream: &dyn MediaStream) -> Result<watch::Receiver<SurfaceSignal>, CameraError> {
        if !stream.is_active() {
            return Err(CameraError::playback_failed("stream tracks already stopped"));
        }

        self.detach();

        let mut feed = stream.subscribe();
        let signal = Arc::clone(&self.signal);
        let latest = Arc::clone(&self.latest);
        let generation = Arc::clone(&self.generation);
        let bound_generation = generation.load(Ordering::SeqCst);
        let stream_id = stream.id().to_string();
        let task_stream_id = stream_id.clone();

        let task = tokio::spawn(async move {
            loop {
                let update = feed.borrow_and_update().clone();
                // A newer attach or a detach owns the surface now
                if generation.load(Ordering::SeqCst) != bound_generation {
                    break;
                }
                match update {
                    StreamFeed::Starting => {}
                    StreamFeed::Frame(frame) if frame.is_decodable() => {
                        trace!(
                            "Surface received frame {} ({}x{})",
                            frame.id,
                            frame.width,
                            frame.height
                        );
                        *latest.lock() = Some(frame);
                        signal.send_if_modified(|current| {
                            if *current == SurfaceSignal::Ready {
                                false
                            } else {
                                *current = SurfaceSignal::Ready;
                                true
                            }
                        });
                    }
                    StreamFeed::Frame(frame) => {
                        debug!(
                            "Skipping undecodable frame {} ({}x{}, {} bytes)",
                            frame.id,
                            frame.width,
                            frame.height,
                            frame.data.len()
                        );
                    }
                    StreamFeed::Failed(details) => {
                        warn!("Stream {} playback failed: {}", task_stream_id, details);
                        *latest.lock() = None;
                        signal.send_replace(SurfaceSignal::PlaybackError(details));
                        break;
                    }
                    StreamFeed::Ended => {
                        debug!("Stream {} ended", task_stream_id);
                        *latest.lock() = None;
                        signal.send_replace(SurfaceSignal::PlaybackError(
                            "stream ended".to_string(),
                        ));
                        break;
                    }
                }

                if feed.changed().await.is_err() {
                    break;
                }
            }
        });

        let receiver = self.signal.subscribe();
        *self.binding.lock() = Some(Binding { stream_id, task });
        Ok(receiver)
    }

    fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(binding) = self.binding.lock().take() {
            binding.task.abort();
            debug!("Surface detached from stream {}", binding.stream_id);
        }
        *self.latest.lock() = None;
        self.signal.send_replace(SurfaceSignal::Pending);
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        if *self.signal.borrow() != SurfaceSignal::Ready {
            return None;
        }
        self.latest.lock().clone()
    }

    fn dimensions(&self) -> (u32, u32) {
        match self.current_frame() {
            Some(frame) => (frame.width, frame.height),
            None => (0, 0),
        }
    }
}

impl Drop for VideoSurface {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(binding) = self.binding.get_mut().take() {
            binding.task.abort();
        }
    }
}
