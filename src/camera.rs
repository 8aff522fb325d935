//! Per-camera calibration state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::calibration::{CalibrationData, CalibrationFailure};
use crate::listener::{CameraListener, ImageListener, ListenerSet, SubscriptionId};
use crate::messages::PictureSendingActivation;
use crate::picture::Picture;

/// Calibration lifecycle of a single camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationState {
    Uncalibrated,
    AwaitingImages,
    Calibrated,
}

/// Status change delivered to camera listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CameraStatus {
    CalibrationStarted,
    Calibrated,
    CalibrationFailed { failure: CalibrationFailure },
    Reset,
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::CalibrationStarted => write!(f, "calibration started"),
            CameraStatus::Calibrated => write!(f, "calibrated"),
            CameraStatus::CalibrationFailed { failure } => {
                write!(f, "calibration failed: {}", failure)
            }
            CameraStatus::Reset => write!(f, "calibration reset"),
        }
    }
}

/// A registered camera module.
///
/// Calibration data is present exactly when the state is `Calibrated`.
#[derive(Debug)]
pub struct Camera {
    id: u32,
    hardware_id: Option<i64>,
    state: CalibrationState,
    calibration: Option<CalibrationData>,
    pending_images: Vec<Picture>,
    picture_sending: bool,
    image_listeners: ListenerSet<dyn ImageListener>,
    status_listeners: ListenerSet<dyn CameraListener>,
}

impl Camera {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            hardware_id: None,
            state: CalibrationState::Uncalibrated,
            calibration: None,
            pending_images: Vec::new(),
            picture_sending: false,
            image_listeners: ListenerSet::new(),
            status_listeners: ListenerSet::new(),
        }
    }

    pub fn with_hardware_id(id: u32, hardware_id: Option<i64>) -> Self {
        Self {
            hardware_id,
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn hardware_id(&self) -> Option<i64> {
        self.hardware_id
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn is_calibrated(&self) -> bool {
        self.state == CalibrationState::Calibrated
    }

    pub fn calibration_data(&self) -> Option<&CalibrationData> {
        self.calibration.as_ref()
    }

    pub fn pending_images(&self) -> &[Picture] {
        &self.pending_images
    }

    pub fn pending_image_count(&self) -> usize {
        self.pending_images.len()
    }

    pub fn is_sending_pictures(&self) -> bool {
        self.picture_sending
    }

    /// Enter a fresh calibration attempt, dropping anything buffered before
    pub fn begin_calibration(&mut self) {
        let dropped = self.pending_images.len();
        self.pending_images.clear();
        self.calibration = None;
        self.state = CalibrationState::AwaitingImages;

        debug!(
            "Camera {} awaiting calibration images (dropped {} buffered)",
            self.id, dropped
        );
        self.notify_status(CameraStatus::CalibrationStarted);
    }

    /// Buffer a picture if it is a calibration picture and one is expected.
    ///
    /// Returns whether the picture was kept. Anything else is the live video
    /// path and is dropped silently.
    pub fn handle_picture(&mut self, picture: Picture, is_calibration_image: bool) -> bool {
        if !is_calibration_image || self.state != CalibrationState::AwaitingImages {
            trace!(
                "Camera {} dropped picture (calibration: {}, state: {:?})",
                self.id,
                is_calibration_image,
                self.state
            );
            return false;
        }

        for listener in self.image_listeners.iter() {
            listener.on_image(self.id, &picture);
        }
        self.pending_images.push(picture);
        trace!(
            "Camera {} buffered calibration picture {}",
            self.id,
            self.pending_images.len()
        );
        true
    }

    /// Install parameters computed for this camera and mark it calibrated
    pub fn set_calibration_data(&mut self, data: CalibrationData) {
        self.calibration = Some(data);
        self.state = CalibrationState::Calibrated;
        self.pending_images.clear();

        info!("Camera {} calibrated", self.id);
        self.notify_status(CameraStatus::Calibrated);
    }

    /// Record a failed computation; buffered pictures stay for inspection
    pub fn fail_calibration(&mut self, failure: CalibrationFailure) {
        warn!("Calibration of camera {} failed: {}", self.id, failure);
        self.notify_status(CameraStatus::CalibrationFailed { failure });
    }

    /// Forget the calibration. Returns whether the state changed.
    pub fn delete_calibration(&mut self) -> bool {
        if self.state == CalibrationState::Uncalibrated {
            return false;
        }

        self.state = CalibrationState::Uncalibrated;
        self.calibration = None;
        self.pending_images.clear();

        info!("Calibration of camera {} deleted", self.id);
        self.notify_status(CameraStatus::Reset);
        true
    }

    pub fn picture_sending_activation(&mut self, active: bool) -> PictureSendingActivation {
        self.picture_sending = active;
        PictureSendingActivation {
            camera_id: self.id,
            active,
        }
    }

    pub fn add_image_listener(&mut self, listener: Arc<dyn ImageListener>) -> SubscriptionId {
        self.image_listeners.add(listener)
    }

    pub fn add_camera_listener(&mut self, listener: Arc<dyn CameraListener>) -> SubscriptionId {
        self.status_listeners.add(listener)
    }

    pub fn remove_image_listener(&mut self, id: SubscriptionId) -> bool {
        self.image_listeners.remove(id)
    }

    pub fn remove_camera_listener(&mut self, id: SubscriptionId) -> bool {
        self.status_listeners.remove(id)
    }

    fn notify_status(&self, status: CameraStatus) {
        for listener in self.status_listeners.iter() {
            listener.on_status(self.id, &status);
        }
    }
}
