//! Listener registration for camera pictures and status changes.
//!
//! Listeners are registered on a camera and receive a [`SubscriptionId`]
//! back; removal goes through that token and is a no-op for tokens that
//! are no longer registered.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::camera::CameraStatus;
use crate::events::{EventBus, FleetEvent};
use crate::picture::Picture;

/// Opaque token identifying one listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives every calibration picture a camera accepts
pub trait ImageListener: Send + Sync {
    fn on_image(&self, camera_id: u32, picture: &Picture);
}

/// Receives calibration status changes of a camera
pub trait CameraListener: Send + Sync {
    fn on_status(&self, camera_id: u32, status: &CameraStatus);
}

/// Listeners of one kind, notified in registration order
pub struct ListenerSet<L: ?Sized> {
    entries: Vec<(SubscriptionId, Arc<L>)>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, listener: Arc<L>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.entries.push((id, listener));
        trace!("Added listener {}", id);
        id
    }

    /// Returns whether the token was registered
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        before != self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<L>> {
        self.entries.iter().map(|(_, listener)| listener)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerSet<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// One entry of a [`StatusLog`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub camera_id: u32,
    pub status: CameraStatus,
    pub at: DateTime<Utc>,
}

/// Status listener keeping a bounded history of status changes
pub struct StatusLog {
    history: Mutex<VecDeque<StatusRecord>>,
    max_history: usize,
}

impl StatusLog {
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(max_history)),
            max_history,
        }
    }

    pub fn records(&self) -> Vec<StatusRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Most recent status recorded for a camera
    pub fn latest(&self, camera_id: u32) -> Option<CameraStatus> {
        self.history
            .lock()
            .iter()
            .rev()
            .find(|record| record.camera_id == camera_id)
            .map(|record| record.status.clone())
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

impl CameraListener for StatusLog {
    fn on_status(&self, camera_id: u32, status: &CameraStatus) {
        let mut history = self.history.lock();
        history.push_back(StatusRecord {
            camera_id,
            status: status.clone(),
            at: Utc::now(),
        });
        while history.len() > self.max_history {
            history.pop_front();
        }
    }
}

/// Status listener that republishes every status change on the event bus
pub struct BusForwarder {
    bus: EventBus,
}

impl BusForwarder {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl CameraListener for BusForwarder {
    fn on_status(&self, camera_id: u32, status: &CameraStatus) {
        let event = FleetEvent::CameraStatus {
            camera_id,
            status: status.clone(),
        };
        if let Err(e) = self.bus.publish(event) {
            debug!("Status of camera {} not forwarded: {}", camera_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[test]
    fn test_listener_set_keeps_registration_order() {
        let mut set: ListenerSet<Named> = ListenerSet::new();
        set.add(Arc::new(Named("first")));
        let middle = set.add(Arc::new(Named("middle")));
        set.add(Arc::new(Named("last")));

        assert!(set.remove(middle));
        let names: Vec<&str> = set.iter().map(|listener| listener.0).collect();
        assert_eq!(names, vec!["first", "last"]);
    }

    #[test]
    fn test_remove_unknown_token_is_noop() {
        let mut set: ListenerSet<Named> = ListenerSet::new();
        let id = set.add(Arc::new(Named("only")));

        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert!(set.is_empty());
    }

    #[test]
    fn test_status_log_is_bounded() {
        let log = StatusLog::new(2);
        log.on_status(0, &CameraStatus::CalibrationStarted);
        log.on_status(1, &CameraStatus::CalibrationStarted);
        log.on_status(0, &CameraStatus::Calibrated);

        assert_eq!(log.len(), 2);
        assert_eq!(log.latest(0), Some(CameraStatus::Calibrated));
        assert_eq!(log.latest(1), Some(CameraStatus::CalibrationStarted));
        assert_eq!(log.latest(5), None);
    }

    #[tokio::test]
    async fn test_bus_forwarder_publishes_status() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let forwarder = BusForwarder::new(bus.clone());

        forwarder.on_status(3, &CameraStatus::Reset);

        match receiver.recv().await.unwrap() {
            FleetEvent::CameraStatus { camera_id, status } => {
                assert_eq!(camera_id, 3);
                assert_eq!(status, CameraStatus::Reset);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
