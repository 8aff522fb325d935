use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Malformed register attempt: unknown module type {module_type}")]
    InvalidModuleType { module_type: i32 },

    #[error("Camera {id} is already registered")]
    DuplicateId { id: u32 },

    #[error("No camera with id {id}")]
    NotFound { id: u32 },

    #[error("A calibration session is already in flight")]
    SessionAlreadyActive,

    #[error("No cameras are registered")]
    EmptyRegistry,

    #[error("Invalid calibration board: {reason}")]
    InvalidBoard { reason: String },

    #[error("Module ids exhausted")]
    IdsExhausted,

    #[error("Calibration timed out waiting for cameras {pending:?}")]
    CalibrationTimeout { pending: Vec<u32> },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FleetError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },
}

pub type Result<T> = std::result::Result<T, FleetError>;
