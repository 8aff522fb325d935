use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::handle::SystemSnapshot;
use crate::calibration::CalibrationBoard;
use crate::error::Result;
use crate::listener::{CameraListener, ImageListener, SubscriptionId};
use crate::messages::{Announce, AnnounceResponse, PictureMessage, QuadcopterDescriptor};
use crate::system::CameraOutcome;

/// Requests processed one at a time by the coordinator task
pub(super) enum Command {
    Announce {
        announce: Announce,
        reply: oneshot::Sender<AnnounceResponse>,
    },
    DeliverPicture {
        message: PictureMessage,
        reply: Option<oneshot::Sender<bool>>,
    },
    InitializeCameras {
        quadcopters: BTreeMap<u32, QuadcopterDescriptor>,
        reply: oneshot::Sender<usize>,
    },
    SetPictureSending {
        camera_id: u32,
        active: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    StartCalibration {
        board: CalibrationBoard,
        reply: oneshot::Sender<Result<Vec<u32>>>,
    },
    TakeCalibrationPictures {
        reply: oneshot::Sender<BTreeMap<u32, bool>>,
    },
    CalculateCalibration {
        reply: oneshot::Sender<BTreeMap<u32, CameraOutcome>>,
    },
    DeleteCalibration {
        camera_id: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    AddImageListener {
        camera_id: u32,
        listener: Arc<dyn ImageListener>,
        reply: oneshot::Sender<Result<SubscriptionId>>,
    },
    AddCameraListener {
        camera_id: u32,
        listener: Arc<dyn CameraListener>,
        reply: oneshot::Sender<Result<SubscriptionId>>,
    },
    RemoveImageListener {
        camera_id: u32,
        subscription: SubscriptionId,
        reply: oneshot::Sender<Result<bool>>,
    },
    RemoveCameraListener {
        camera_id: u32,
        subscription: SubscriptionId,
        reply: oneshot::Sender<Result<bool>>,
    },
    Snapshot {
        reply: oneshot::Sender<SystemSnapshot>,
    },
    Shutdown,
}

impl Command {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Command::Announce { .. } => "announce",
            Command::DeliverPicture { .. } => "deliver_picture",
            Command::InitializeCameras { .. } => "initialize_cameras",
            Command::SetPictureSending { .. } => "set_picture_sending",
            Command::StartCalibration { .. } => "start_calibration",
            Command::TakeCalibrationPictures { .. } => "take_calibration_pictures",
            Command::CalculateCalibration { .. } => "calculate_calibration",
            Command::DeleteCalibration { .. } => "delete_calibration",
            Command::AddImageListener { .. } => "add_image_listener",
            Command::AddCameraListener { .. } => "add_camera_listener",
            Command::RemoveImageListener { .. } => "remove_image_listener",
            Command::RemoveCameraListener { .. } => "remove_camera_listener",
            Command::Snapshot { .. } => "snapshot",
            Command::Shutdown => "shutdown",
        }
    }
}
