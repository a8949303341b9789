use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events published while a capture attempt runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// The workflow moved between states
    StateChanged {
        from: String,
        to: String,
        timestamp: SystemTime,
    },
    /// A camera session reached Live
    SessionOpened {
        session_id: Uuid,
        profile: String,
        timestamp: SystemTime,
    },
    /// A camera session stopped its tracks
    SessionReleased { session_id: Uuid },
    /// A still was taken from the live camera
    FrameCaptured {
        frame_id: Uuid,
        width: u32,
        height: u32,
        bytes: usize,
    },
    /// A camera phase failed
    CameraFailed { error: String },
    /// The submission endpoint answered (or could not be reached)
    SubmissionFinished { member_id: String, outcome: String },
}

impl WorkflowEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            WorkflowEvent::StateChanged { from, to, .. } => {
                format!("State {} -> {}", from, to)
            }
            WorkflowEvent::SessionOpened {
                session_id,
                profile,
                ..
            } => format!("Camera session {} live ({} constraints)", session_id, profile),
            WorkflowEvent::SessionReleased { session_id } => {
                format!("Camera session {} released", session_id)
            }
            WorkflowEvent::FrameCaptured {
                width,
                height,
                bytes,
                ..
            } => format!("Captured {}x{} frame ({} bytes)", width, height, bytes),
            WorkflowEvent::CameraFailed { error } => format!("Camera failed: {}", error),
            WorkflowEvent::SubmissionFinished { member_id, outcome } => {
                format!("Submission for member {}: {}", member_id, outcome)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::StateChanged { .. } => "state_changed",
            WorkflowEvent::SessionOpened { .. } => "session_opened",
            WorkflowEvent::SessionReleased { .. } => "session_released",
            WorkflowEvent::FrameCaptured { .. } => "frame_captured",
            WorkflowEvent::CameraFailed { .. } => "camera_failed",
            WorkflowEvent::SubmissionFinished { .. } => "submission_finished",
        }
    }
}

/// Broadcast bus for workflow observers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing never blocks, so it is safe to call while holding the
    /// workflow lock. Having no subscribers is not an error.
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        match &event {
            WorkflowEvent::SessionOpened { .. } | WorkflowEvent::SubmissionFinished { .. } => {
                info!("{}", event.description());
            }
            WorkflowEvent::CameraFailed { error } => {
                warn!("Camera failed: {}", error);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &WorkflowEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<WorkflowEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(bus: &EventBus, filter: EventFilter, name: impl Into<String>) -> Self {
        Self {
            receiver: bus.subscribe(),
            filter,
            name: name.into(),
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<WorkflowEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { missed: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Drain every event already queued that passes the filter
    pub fn drain(&mut self) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        events.push(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(_) => return events,
            }
        }
    }
}
