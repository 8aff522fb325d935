//! The camera system: every known camera keyed by id plus the calibration
//! session currently in flight.
//!
//! All methods take `&self`/`&mut self`; the coordinator task is the single
//! owner that serializes access.

mod session;
#[cfg(test)]
mod tests;

pub use session::{CalibrationSession, CameraOutcome, SessionSummary, TargetOutcome};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationAlgorithm, CalibrationBoard, CalibrationSettings};
use crate::camera::{CalibrationState, Camera};
use crate::error::{FleetError, Result};
use crate::listener::{CameraListener, ImageListener, SubscriptionId};
use crate::messages::{
    CalibrateCameraDirective, InitializeCameraDirective, PictureMessage,
    PictureSendingActivation, QuadcopterDescriptor,
};
use crate::picture::PictureDecoder;

#[derive(Debug)]
pub struct CameraSystem {
    cameras: BTreeMap<u32, Camera>,
    settings: CalibrationSettings,
    session: Option<CalibrationSession>,
    completed: Option<SessionSummary>,
}

impl CameraSystem {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            cameras: BTreeMap::new(),
            settings,
            session: None,
            completed: None,
        }
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn add_camera(&mut self, camera: Camera) -> Result<()> {
        let id = camera.id();
        if self.cameras.contains_key(&id) {
            return Err(FleetError::DuplicateId { id });
        }

        self.cameras.insert(id, camera);
        info!("Camera {} added ({} known)", id, self.cameras.len());
        Ok(())
    }

    pub fn camera(&self, id: u32) -> Result<&Camera> {
        self.cameras.get(&id).ok_or(FleetError::NotFound { id })
    }

    pub fn camera_mut(&mut self, id: u32) -> Result<&mut Camera> {
        self.cameras.get_mut(&id).ok_or(FleetError::NotFound { id })
    }

    pub fn camera_amount(&self) -> usize {
        self.cameras.len()
    }

    pub fn cameras_as_map(&self) -> &BTreeMap<u32, Camera> {
        &self.cameras
    }

    pub fn cameras_as_vec(&self) -> Vec<&Camera> {
        self.cameras.values().collect()
    }

    pub fn calibrated_cameras(&self) -> Vec<&Camera> {
        self.cameras.values().filter(|c| c.is_calibrated()).collect()
    }

    pub fn uncalibrated_cameras(&self) -> Vec<&Camera> {
        self.cameras.values().filter(|c| !c.is_calibrated()).collect()
    }

    /// True when every camera is calibrated, vacuously so without cameras
    pub fn is_calibrated(&self) -> bool {
        self.cameras.values().all(Camera::is_calibrated)
    }

    /// Build one initialization directive per camera.
    ///
    /// Sending is fire-and-forget; cameras overwrite earlier initialization,
    /// so calling this again simply re-sends the current state.
    pub fn initialize_cameras(
        &self,
        quadcopters: &BTreeMap<u32, QuadcopterDescriptor>,
    ) -> Vec<InitializeCameraDirective> {
        debug!(
            "Initializing {} cameras with {} quadcopters",
            self.cameras.len(),
            quadcopters.len()
        );
        self.cameras
            .keys()
            .map(|id| Self::build_init_message(*id, quadcopters))
            .collect()
    }

    fn build_init_message(
        camera_id: u32,
        quadcopters: &BTreeMap<u32, QuadcopterDescriptor>,
    ) -> InitializeCameraDirective {
        InitializeCameraDirective {
            camera_id,
            quadcopters: quadcopters.values().cloned().collect(),
        }
    }

    pub fn picture_sending_activation(
        &mut self,
        id: u32,
        active: bool,
    ) -> Result<PictureSendingActivation> {
        Ok(self.camera_mut(id)?.picture_sending_activation(active))
    }

    pub fn session(&self) -> Option<&CalibrationSession> {
        self.session.as_ref()
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    /// Hand out the summary of the last session that completed, once
    pub fn take_completed_session(&mut self) -> Option<SessionSummary> {
        self.completed.take()
    }

    /// Start a session over every camera known right now
    pub fn start_calibration(
        &mut self,
        board: CalibrationBoard,
    ) -> Result<Vec<CalibrateCameraDirective>> {
        if self.cameras.is_empty() {
            return Err(FleetError::EmptyRegistry);
        }
        if let Some(session) = &self.session {
            warn!(
                "Calibration session {} still waits for cameras {:?}",
                session.id(),
                session.pending_targets()
            );
            return Err(FleetError::SessionAlreadyActive);
        }
        board.validate()?;

        let session = CalibrationSession::new(board, self.settings, self.cameras.keys().copied());
        info!(
            "Starting calibration session {} for {} cameras ({} pictures each)",
            session.id(),
            self.cameras.len(),
            self.settings.image_amount
        );

        let mut directives = Vec::with_capacity(self.cameras.len());
        for camera in self.cameras.values_mut() {
            camera.begin_calibration();
            directives.push(CalibrateCameraDirective::new(
                camera.id(),
                &self.settings,
                &board,
            ));
        }

        self.completed = None;
        self.session = Some(session);
        Ok(directives)
    }

    /// Route a picture message to its camera. Returns whether it was buffered.
    ///
    /// Pictures for unknown cameras, live pictures and pictures for cameras
    /// that are not collecting are dropped without error.
    pub fn deliver_picture(&mut self, message: PictureMessage, decoder: &dyn PictureDecoder) -> bool {
        let PictureMessage {
            camera_id,
            is_calibration_image,
            image,
        } = message;

        let Some(camera) = self.cameras.get_mut(&camera_id) else {
            debug!("Dropping picture for unknown camera {}", camera_id);
            return false;
        };
        if !is_calibration_image || camera.state() != CalibrationState::AwaitingImages {
            return false;
        }
        let collecting = self
            .session
            .as_ref()
            .map_or(false, |session| {
                session.is_target(camera_id) && session.outcome(camera_id).is_none()
            });
        if !collecting {
            debug!("Camera {} is settled for this session, dropping picture", camera_id);
            return false;
        }

        let picture = match decoder.decode(camera_id, image) {
            Ok(picture) => picture,
            Err(e) => {
                warn!("Dropping undecodable picture from camera {}: {}", camera_id, e);
                return false;
            }
        };

        let accepted = camera.handle_picture(picture, is_calibration_image);
        if accepted {
            if let Some(session) = self.session.as_mut() {
                session.record_image(camera_id);
            }
        }
        accepted
    }

    /// Pictures each camera needs, from the running session if there is one
    pub fn required_images(&self) -> usize {
        self.session
            .as_ref()
            .map(|session| session.settings().image_amount)
            .unwrap_or(self.settings.image_amount) as usize
    }

    /// Report for every camera whether it holds enough calibration pictures.
    ///
    /// Non-blocking; callers poll this until every target reports true or
    /// their own deadline passes.
    pub fn take_calibration_pictures(&self) -> BTreeMap<u32, bool> {
        let required = self.required_images();
        self.cameras
            .iter()
            .map(|(id, camera)| (*id, camera.pending_image_count() >= required))
            .collect()
    }

    /// Run the calibration math for every collecting camera with enough pictures
    pub fn calculate_calibration(
        &mut self,
        algorithm: &dyn CalibrationAlgorithm,
    ) -> BTreeMap<u32, CameraOutcome> {
        let mut outcomes = BTreeMap::new();
        let Some(session) = self.session.as_mut() else {
            debug!("No calibration session in flight, nothing to calculate");
            return outcomes;
        };

        let required = session.settings().image_amount as usize;
        let board = *session.board();
        for camera in self.cameras.values_mut() {
            let id = camera.id();
            // Settled targets wait for the next session
            if !session.is_target(id)
                || session.outcome(id).is_some()
                || camera.state() != CalibrationState::AwaitingImages
                || camera.pending_image_count() < required
            {
                continue;
            }

            match algorithm.calibrate(id, camera.pending_images(), &board) {
                Ok(data) => {
                    camera.set_calibration_data(data);
                    session.settle(id, TargetOutcome::Calibrated);
                    outcomes.insert(id, CameraOutcome::Calibrated);
                }
                Err(failure) => {
                    camera.fail_calibration(failure.clone());
                    session.settle(id, TargetOutcome::Failed);
                    outcomes.insert(id, CameraOutcome::Failed(failure));
                }
            }
        }

        self.finish_session_if_complete();
        outcomes
    }

    /// Forget one camera's calibration; aborts its part of a running session
    pub fn delete_calibration(&mut self, id: u32) -> Result<()> {
        let camera = self.cameras.get_mut(&id).ok_or(FleetError::NotFound { id })?;
        camera.delete_calibration();

        if let Some(session) = self.session.as_mut() {
            session.settle(id, TargetOutcome::Aborted);
        }
        self.finish_session_if_complete();
        Ok(())
    }

    fn finish_session_if_complete(&mut self) {
        if self.session.as_ref().map_or(false, CalibrationSession::is_complete) {
            if let Some(session) = self.session.take() {
                let summary = session.summary();
                info!(
                    "Calibration session {} completed after {:?}: calibrated {:?}, failed {:?}, aborted {:?}",
                    summary.id,
                    session.elapsed(),
                    summary.calibrated,
                    summary.failed,
                    summary.aborted
                );
                self.completed = Some(summary);
            }
        }
    }

    /// Buffered calibration pictures of every camera, in id order
    pub fn calibration_pictures(&self) -> Vec<Vec<crate::picture::Picture>> {
        self.cameras
            .values()
            .map(|camera| camera.pending_images().to_vec())
            .collect()
    }

    pub fn calibration_picture_count(&self) -> usize {
        self.cameras.values().map(Camera::pending_image_count).sum()
    }

    pub fn add_image_listener(
        &mut self,
        id: u32,
        listener: Arc<dyn ImageListener>,
    ) -> Result<SubscriptionId> {
        Ok(self.camera_mut(id)?.add_image_listener(listener))
    }

    pub fn add_camera_listener(
        &mut self,
        id: u32,
        listener: Arc<dyn CameraListener>,
    ) -> Result<SubscriptionId> {
        Ok(self.camera_mut(id)?.add_camera_listener(listener))
    }

    pub fn remove_image_listener(&mut self, id: u32, subscription: SubscriptionId) -> Result<bool> {
        Ok(self.camera_mut(id)?.remove_image_listener(subscription))
    }

    pub fn remove_camera_listener(
        &mut self,
        id: u32,
        subscription: SubscriptionId,
    ) -> Result<bool> {
        Ok(self.camera_mut(id)?.remove_camera_listener(subscription))
    }
}
