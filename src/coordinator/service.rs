use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::command::Command;
use super::handle::{CameraSnapshot, CoordinatorHandle, SystemSnapshot};
use crate::calibration::CalibrationAlgorithm;
use crate::camera::Camera;
use crate::config::FleetConfig;
use crate::events::{EventBus, FleetEvent};
use crate::identity::{IdentityRegistry, ModuleType};
use crate::listener::BusForwarder;
use crate::messages::{Announce, AnnounceResponse};
use crate::picture::PictureDecoder;
use crate::system::CameraSystem;

/// Single owner of the identity registry and the camera system.
///
/// Runs as one tokio task; every mutation and every read is a command on
/// its channel, so commands never interleave.
pub struct Coordinator {
    registry: IdentityRegistry,
    system: CameraSystem,
    decoder: Arc<dyn PictureDecoder>,
    algorithm: Arc<dyn CalibrationAlgorithm>,
    bus: EventBus,
    commands: mpsc::Receiver<Command>,
    cancellation_token: CancellationToken,
}

impl Coordinator {
    /// Start the coordinator task and return a handle to it
    pub fn spawn(
        config: &FleetConfig,
        decoder: Arc<dyn PictureDecoder>,
        algorithm: Arc<dyn CalibrationAlgorithm>,
        bus: EventBus,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (sender, commands) = mpsc::channel(config.coordinator.command_capacity);
        let cancellation_token = CancellationToken::new();

        let coordinator = Self {
            registry: IdentityRegistry::new(),
            system: CameraSystem::new(config.calibration.settings()),
            decoder,
            algorithm,
            bus,
            commands,
            cancellation_token: cancellation_token.clone(),
        };

        let task = tokio::spawn(coordinator.run());
        let handle = CoordinatorHandle::new(sender, cancellation_token, config.calibration.clone());
        (handle, task)
    }

    async fn run(mut self) {
        info!("Camera coordinator started");

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    debug!("Coordinator cancelled");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => {
                        trace!("Coordinator processing {}", command.name());
                        self.dispatch(command);
                    }
                }
            }
        }

        self.publish(FleetEvent::ShutdownRequested {
            reason: "coordinator stopped".to_string(),
        });
        info!(
            "Camera coordinator stopped ({} modules, {} cameras)",
            self.registry.len(),
            self.system.camera_amount()
        );
    }

    fn dispatch(&mut self, command: Command) {
        match command {
            Command::Announce { announce, reply } => {
                let _ = reply.send(self.announce(announce));
            }
            Command::DeliverPicture { message, reply } => {
                let accepted = self.system.deliver_picture(message, self.decoder.as_ref());
                if let Some(reply) = reply {
                    let _ = reply.send(accepted);
                }
            }
            Command::InitializeCameras { quadcopters, reply } => {
                let directives = self.system.initialize_cameras(&quadcopters);
                let count = directives.len();
                for directive in directives {
                    self.publish(FleetEvent::InitializeCamera(directive));
                }
                let _ = reply.send(count);
            }
            Command::SetPictureSending {
                camera_id,
                active,
                reply,
            } => {
                let result = self
                    .system
                    .picture_sending_activation(camera_id, active)
                    .map(|message| self.publish(FleetEvent::PictureSendingActivation(message)));
                let _ = reply.send(result);
            }
            Command::StartCalibration { board, reply } => {
                let result = self.system.start_calibration(board).map(|directives| {
                    directives
                        .into_iter()
                        .map(|directive| {
                            let camera_id = directive.camera_id;
                            self.publish(FleetEvent::CalibrateCamera(directive));
                            camera_id
                        })
                        .collect::<Vec<u32>>()
                });
                let _ = reply.send(result);
            }
            Command::TakeCalibrationPictures { reply } => {
                let _ = reply.send(self.system.take_calibration_pictures());
            }
            Command::CalculateCalibration { reply } => {
                let outcomes = self.system.calculate_calibration(self.algorithm.as_ref());
                self.publish_completed_session();
                let _ = reply.send(outcomes);
            }
            Command::DeleteCalibration { camera_id, reply } => {
                let result = self.system.delete_calibration(camera_id);
                self.publish_completed_session();
                let _ = reply.send(result);
            }
            Command::AddImageListener {
                camera_id,
                listener,
                reply,
            } => {
                let _ = reply.send(self.system.add_image_listener(camera_id, listener));
            }
            Command::AddCameraListener {
                camera_id,
                listener,
                reply,
            } => {
                let _ = reply.send(self.system.add_camera_listener(camera_id, listener));
            }
            Command::RemoveImageListener {
                camera_id,
                subscription,
                reply,
            } => {
                let _ = reply.send(self.system.remove_image_listener(camera_id, subscription));
            }
            Command::RemoveCameraListener {
                camera_id,
                subscription,
                reply,
            } => {
                let _ = reply.send(self.system.remove_camera_listener(camera_id, subscription));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn announce(&mut self, announce: Announce) -> AnnounceResponse {
        let identity = match self
            .registry
            .register(announce.module_type, announce.camera_hardware_id)
        {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Announcement rejected: {}", e);
                self.publish(FleetEvent::AnnouncementRejected {
                    module_type: announce.module_type,
                });
                return AnnounceResponse::REJECTED;
            }
        };

        if identity.module_type == ModuleType::Camera {
            let mut camera = Camera::with_hardware_id(identity.id, identity.hardware_id);
            camera.add_camera_listener(Arc::new(BusForwarder::new(self.bus.clone())));
            if let Err(e) = self.system.add_camera(camera) {
                error!("Registered camera {} could not be added: {}", identity.id, e);
            }
        }

        self.publish(FleetEvent::ModuleRegistered { identity });
        AnnounceResponse::accepted(identity.id)
    }

    fn publish_completed_session(&mut self) {
        if let Some(summary) = self.system.take_completed_session() {
            self.publish(FleetEvent::SessionCompleted(summary));
        }
    }

    fn publish(&self, event: FleetEvent) {
        if let Err(e) = self.bus.publish(event) {
            trace!("Event not delivered: {}", e);
        }
    }

    fn snapshot(&self) -> SystemSnapshot {
        let session = self.system.session();
        SystemSnapshot {
            cameras: self
                .system
                .cameras_as_vec()
                .into_iter()
                .map(CameraSnapshot::from)
                .collect(),
            session_id: session.map(|session| session.id()),
            pending_targets: session
                .map(|session| session.pending_targets())
                .unwrap_or_default(),
            required_images: self.system.required_images(),
            next_module_id: self.registry.next_id(),
        }
    }
}
