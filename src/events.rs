use crate::camera::CameraStatus;
use crate::error::EventBusError;
use crate::identity::ModuleIdentity;
use crate::messages::{
    CalibrateCameraDirective, InitializeCameraDirective, PictureSendingActivation,
};
use crate::system::SessionSummary;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events published by the coordinator towards the transport and observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    /// A module announced itself and received an id
    ModuleRegistered { identity: ModuleIdentity },
    /// A module announced itself with an unknown type
    AnnouncementRejected { module_type: i32 },
    /// Tell a camera which quadcopters are in the tracking volume
    InitializeCamera(InitializeCameraDirective),
    /// Ask a camera to take calibration pictures
    CalibrateCamera(CalibrateCameraDirective),
    /// Switch live picture streaming of a camera on or off
    PictureSendingActivation(PictureSendingActivation),
    /// Calibration status of a camera changed
    CameraStatus { camera_id: u32, status: CameraStatus },
    /// Every target camera of a session was settled
    SessionCompleted(SessionSummary),
    /// System shutdown requested
    ShutdownRequested { reason: String },
}

impl FleetEvent {
    /// Camera the event is about, if any
    pub fn camera_id(&self) -> Option<u32> {
        match self {
            FleetEvent::ModuleRegistered { identity } => Some(identity.id),
            FleetEvent::InitializeCamera(directive) => Some(directive.camera_id),
            FleetEvent::CalibrateCamera(directive) => Some(directive.camera_id),
            FleetEvent::PictureSendingActivation(message) => Some(message.camera_id),
            FleetEvent::CameraStatus { camera_id, .. } => Some(*camera_id),
            FleetEvent::AnnouncementRejected { .. }
            | FleetEvent::SessionCompleted(_)
            | FleetEvent::ShutdownRequested { .. } => None,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            FleetEvent::ModuleRegistered { identity } => format!(
                "Module {} registered as {}",
                identity.id,
                identity.module_type.name()
            ),
            FleetEvent::AnnouncementRejected { module_type } => {
                format!("Announcement with type {} rejected", module_type)
            }
            FleetEvent::InitializeCamera(directive) => format!(
                "Initialize camera {} with {} quadcopters",
                directive.camera_id,
                directive.quadcopters.len()
            ),
            FleetEvent::CalibrateCamera(directive) => format!(
                "Calibrate camera {} with {} pictures",
                directive.camera_id, directive.image_amount
            ),
            FleetEvent::PictureSendingActivation(message) => format!(
                "Picture sending of camera {} {}",
                message.camera_id,
                if message.active { "enabled" } else { "disabled" }
            ),
            FleetEvent::CameraStatus { camera_id, status } => {
                format!("Camera {}: {}", camera_id, status)
            }
            FleetEvent::SessionCompleted(summary) => format!(
                "Calibration session {} completed ({} calibrated, {} failed, {} aborted)",
                summary.id,
                summary.calibrated.len(),
                summary.failed.len(),
                summary.aborted.len()
            ),
            FleetEvent::ShutdownRequested { reason } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            FleetEvent::ModuleRegistered { .. } => "module_registered",
            FleetEvent::AnnouncementRejected { .. } => "announcement_rejected",
            FleetEvent::InitializeCamera(_) => "initialize_camera",
            FleetEvent::CalibrateCamera(_) => "calibrate_camera",
            FleetEvent::PictureSendingActivation(_) => "picture_sending_activation",
            FleetEvent::CameraStatus { .. } => "camera_status",
            FleetEvent::SessionCompleted(_) => "session_completed",
            FleetEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for coordinator output using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<FleetEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: FleetEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            FleetEvent::AnnouncementRejected { module_type } => {
                warn!("Rejected announcement with module type {}", module_type);
            }
            FleetEvent::SessionCompleted(_) | FleetEvent::ShutdownRequested { .. } => {
                info!("{}", event.description());
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events about specific cameras
    Cameras(Vec<u32>),
    /// Custom filter function
    Custom(fn(&FleetEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &FleetEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Cameras(cameras) => event
                .camera_id()
                .map(|id| cameras.contains(&id))
                .unwrap_or(false),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering capabilities
pub struct EventReceiver {
    receiver: broadcast::Receiver<FleetEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    /// Create a new event receiver with a filter
    pub fn new(receiver: broadcast::Receiver<FleetEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<FleetEvent, EventBusError> {
        loop {
            let received = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Lagged(skipped) => EventBusError::Lagged { skipped },
                broadcast::error::RecvError::Closed => EventBusError::ChannelClosed,
            });
            if let Some(result) = self.accept(received) {
                return result;
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<FleetEvent>, EventBusError> {
        loop {
            let received = match self.receiver.try_recv() {
                Ok(event) => Ok(event),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    Err(EventBusError::Lagged { skipped })
                }
                Err(broadcast::error::TryRecvError::Closed) => Err(EventBusError::ChannelClosed),
            };
            if let Some(result) = self.accept(received) {
                return result.map(Some);
            }
        }
    }

    /// `None` when the event does not pass the filter
    fn accept(
        &self,
        received: Result<FleetEvent, EventBusError>,
    ) -> Option<Result<FleetEvent, EventBusError>> {
        match received {
            Ok(event) if self.filter.matches(&event) => {
                debug!("Receiver '{}' received event: {}", self.name, event.description());
                Some(Ok(event))
            }
            Ok(_) => None,
            Err(EventBusError::Lagged { skipped }) => {
                warn!("Receiver '{}' lagged behind by {} events", self.name, skipped);
                Some(Err(EventBusError::Lagged { skipped }))
            }
            Err(e) => {
                debug!("Event bus closed for receiver '{}'", self.name);
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ModuleType;
    use tokio::time::{timeout, Duration};

    fn registered(id: u32) -> FleetEvent {
        FleetEvent::ModuleRegistered {
            identity: ModuleIdentity {
                id,
                module_type: ModuleType::Camera,
                hardware_id: None,
            },
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus.publish(registered(4)).unwrap();
        assert_eq!(subscriber_count, 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.camera_id(), Some(4));
        assert_eq!(received.event_type(), "module_registered");
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(matches!(
            event_bus.publish(registered(0)),
            Err(EventBusError::PublishFailed { .. })
        ));
    }

    #[test]
    fn test_event_filter() {
        let types = EventFilter::EventTypes(vec!["camera_status"]);
        let cameras = EventFilter::Cameras(vec![1, 2]);
        let status = FleetEvent::CameraStatus {
            camera_id: 2,
            status: CameraStatus::Calibrated,
        };
        let shutdown = FleetEvent::ShutdownRequested {
            reason: "test".to_string(),
        };

        assert!(types.matches(&status));
        assert!(!types.matches(&registered(2)));
        assert!(cameras.matches(&status));
        assert!(cameras.matches(&registered(1)));
        assert!(!cameras.matches(&registered(3)));
        assert!(!cameras.matches(&shutdown));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered =
            EventReceiver::new(event_bus.subscribe(), EventFilter::Cameras(vec![7]), "test".to_string());

        event_bus.publish(registered(6)).unwrap();
        event_bus.publish(registered(7)).unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.camera_id(), Some(7));
        assert_eq!(filtered.try_recv().unwrap(), None);
    }

    #[test]
    fn test_lagging_receiver_reports_skipped_events() {
        let event_bus = EventBus::new(2);
        let mut filtered =
            EventReceiver::new(event_bus.subscribe(), EventFilter::Cameras(vec![3]), "test".to_string());

        for id in 0..4 {
            event_bus.publish(registered(id)).unwrap();
        }

        assert_eq!(filtered.try_recv(), Err(EventBusError::Lagged { skipped: 2 }));
        assert_eq!(filtered.try_recv().unwrap().and_then(|e| e.camera_id()), Some(3));
        assert_eq!(filtered.try_recv().unwrap(), None);

        drop(event_bus);
        assert_eq!(filtered.try_recv(), Err(EventBusError::ChannelClosed));
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_value(FleetEvent::PictureSendingActivation(
            PictureSendingActivation {
                camera_id: 1,
                active: true,
            },
        ))
        .unwrap();

        assert_eq!(json["event"], "picture_sending_activation");
        assert_eq!(json["camera_id"], 1);
        assert_eq!(json["active"], true);
    }
}
