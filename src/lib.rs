pub mod calibration;
pub mod camera;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod identity;
pub mod listener;
pub mod messages;
pub mod picture;
pub mod system;

pub use calibration::{
    CalibrationAlgorithm, CalibrationBoard, CalibrationData, CalibrationFailure,
    CalibrationSettings, DetachedBackend,
};
pub use camera::{CalibrationState, Camera, CameraStatus};
pub use config::FleetConfig;
pub use coordinator::{CameraSnapshot, Coordinator, CoordinatorHandle, SystemSnapshot};
pub use error::{EventBusError, FleetError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, FleetEvent};
pub use identity::{IdentityRegistry, ModuleIdentity, ModuleType};
pub use listener::{
    BusForwarder, CameraListener, ImageListener, ListenerSet, StatusLog, StatusRecord,
    SubscriptionId,
};
pub use messages::{
    Announce, AnnounceResponse, CalibrateCameraDirective, InitializeCameraDirective,
    PictureMessage, PictureSendingActivation, QuadcopterDescriptor,
};
pub use picture::{DecodeError, Picture, PictureDecoder, RawFrameDecoder};
pub use system::{CalibrationSession, CameraOutcome, CameraSystem, SessionSummary, TargetOutcome};
