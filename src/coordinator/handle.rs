use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::command::Command;
use crate::calibration::{CalibrationBoard, CalibrationData};
use crate::camera::{CalibrationState, Camera};
use crate::config::CalibrationConfig;
use crate::error::{FleetError, Result};
use crate::listener::{CameraListener, ImageListener, SubscriptionId};
use crate::messages::{Announce, AnnounceResponse, PictureMessage, QuadcopterDescriptor};
use crate::system::CameraOutcome;

/// Point-in-time view of one camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub id: u32,
    pub hardware_id: Option<i64>,
    pub state: CalibrationState,
    pub pending_images: usize,
    pub sending_pictures: bool,
    pub calibration: Option<CalibrationData>,
}

impl From<&Camera> for CameraSnapshot {
    fn from(camera: &Camera) -> Self {
        Self {
            id: camera.id(),
            hardware_id: camera.hardware_id(),
            state: camera.state(),
            pending_images: camera.pending_image_count(),
            sending_pictures: camera.is_sending_pictures(),
            calibration: camera.calibration_data().cloned(),
        }
    }
}

/// Consistent view of the whole system, taken between two commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cameras: Vec<CameraSnapshot>,
    pub session_id: Option<Uuid>,
    /// Session targets that have not settled yet
    pub pending_targets: Vec<u32>,
    /// Pictures a camera needs before its calibration can be computed
    pub required_images: usize,
    pub next_module_id: u32,
}

impl SystemSnapshot {
    pub fn calibrated_cameras(&self) -> Vec<u32> {
        self.cameras
            .iter()
            .filter(|camera| camera.state == CalibrationState::Calibrated)
            .map(|camera| camera.id)
            .collect()
    }

    pub fn uncalibrated_cameras(&self) -> Vec<u32> {
        self.cameras
            .iter()
            .filter(|camera| camera.state != CalibrationState::Calibrated)
            .map(|camera| camera.id)
            .collect()
    }

    pub fn is_calibrated(&self) -> bool {
        self.cameras
            .iter()
            .all(|camera| camera.state == CalibrationState::Calibrated)
    }

    /// Pending targets that still lack pictures
    pub fn waiting_targets(&self) -> Vec<u32> {
        self.pending_targets
            .iter()
            .copied()
            .filter(|id| {
                self.cameras
                    .iter()
                    .find(|camera| camera.id == *id)
                    .map_or(true, |camera| camera.pending_images < self.required_images)
            })
            .collect()
    }

    pub fn is_session_active(&self) -> bool {
        self.session_id.is_some()
    }
}

/// Cloneable access to a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    cancellation_token: CancellationToken,
    pub(super) calibration: CalibrationConfig,
}

impl CoordinatorHandle {
    pub(super) fn new(
        commands: mpsc::Sender<Command>,
        cancellation_token: CancellationToken,
        calibration: CalibrationConfig,
    ) -> Self {
        Self {
            commands,
            cancellation_token,
            calibration,
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FleetError::component("coordinator", "command channel closed"))
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response
            .await
            .map_err(|_| FleetError::component("coordinator", "coordinator dropped the request"))
    }

    /// Register a module; rejected announcements answer with id -1
    pub async fn announce(&self, announce: Announce) -> Result<AnnounceResponse> {
        self.request(|reply| Command::Announce { announce, reply }).await
    }

    /// Hand a picture to the coordinator without waiting for it to be processed
    pub async fn deliver_picture(&self, message: PictureMessage) -> Result<()> {
        self.send(Command::DeliverPicture {
            message,
            reply: None,
        })
        .await
    }

    /// Hand a picture to the coordinator and report whether it was buffered
    pub async fn deliver_picture_acked(&self, message: PictureMessage) -> Result<bool> {
        self.request(|reply| Command::DeliverPicture {
            message,
            reply: Some(reply),
        })
        .await
    }

    /// Returns the number of directives sent
    pub async fn initialize_cameras(
        &self,
        quadcopters: BTreeMap<u32, QuadcopterDescriptor>,
    ) -> Result<usize> {
        self.request(|reply| Command::InitializeCameras { quadcopters, reply })
            .await
    }

    pub async fn set_picture_sending(&self, camera_id: u32, active: bool) -> Result<()> {
        self.request(|reply| Command::SetPictureSending {
            camera_id,
            active,
            reply,
        })
        .await?
    }

    /// Start a session; returns the target camera ids
    pub async fn start_calibration(&self, board: CalibrationBoard) -> Result<Vec<u32>> {
        self.request(|reply| Command::StartCalibration { board, reply })
            .await?
    }

    pub async fn take_calibration_pictures(&self) -> Result<BTreeMap<u32, bool>> {
        self.request(|reply| Command::TakeCalibrationPictures { reply })
            .await
    }

    pub async fn calculate_calibration(&self) -> Result<BTreeMap<u32, CameraOutcome>> {
        self.request(|reply| Command::CalculateCalibration { reply })
            .await
    }

    pub async fn delete_calibration(&self, camera_id: u32) -> Result<()> {
        self.request(|reply| Command::DeleteCalibration { camera_id, reply })
            .await?
    }

    pub async fn add_image_listener(
        &self,
        camera_id: u32,
        listener: Arc<dyn ImageListener>,
    ) -> Result<SubscriptionId> {
        self.request(|reply| Command::AddImageListener {
            camera_id,
            listener,
            reply,
        })
        .await?
    }

    pub async fn add_camera_listener(
        &self,
        camera_id: u32,
        listener: Arc<dyn CameraListener>,
    ) -> Result<SubscriptionId> {
        self.request(|reply| Command::AddCameraListener {
            camera_id,
            listener,
            reply,
        })
        .await?
    }

    pub async fn remove_image_listener(
        &self,
        camera_id: u32,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        self.request(|reply| Command::RemoveImageListener {
            camera_id,
            subscription,
            reply,
        })
        .await?
    }

    pub async fn remove_camera_listener(
        &self,
        camera_id: u32,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        self.request(|reply| Command::RemoveCameraListener {
            camera_id,
            subscription,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<SystemSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn calibrated_cameras(&self) -> Result<Vec<u32>> {
        Ok(self.snapshot().await?.calibrated_cameras())
    }

    pub async fn uncalibrated_cameras(&self) -> Result<Vec<u32>> {
        Ok(self.snapshot().await?.uncalibrated_cameras())
    }

    pub async fn is_calibrated(&self) -> Result<bool> {
        Ok(self.snapshot().await?.is_calibrated())
    }

    /// Ask the coordinator to stop after the commands already queued
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Stop the coordinator without draining queued commands
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
