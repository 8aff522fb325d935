use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::calibration::{CalibrationBoard, CalibrationSettings};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FleetConfig {
    pub calibration: CalibrationConfig,
    pub picture: PictureConfig,
    pub bus: BusConfig,
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Pictures each camera takes per calibration session
    #[serde(default = "default_image_amount")]
    pub image_amount: u32,

    /// Delay between two calibration pictures in milliseconds
    #[serde(default = "default_image_delay_ms")]
    pub image_delay_ms: u64,

    /// How often the driver polls for collected pictures
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for one calibration run
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Board used when a session does not name its own
    #[serde(default = "default_board")]
    pub board: BoardConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BoardConfig {
    /// Inner corners per row
    #[serde(default = "default_board_width")]
    pub width: u32,

    /// Inner corners per column
    #[serde(default = "default_board_height")]
    pub height: u32,

    /// Physical rectangle width in millimetres
    #[serde(default = "default_rectangle_size")]
    pub rectangle_width: f64,

    /// Physical rectangle height in millimetres
    #[serde(default = "default_rectangle_size")]
    pub rectangle_height: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PictureConfig {
    /// Raw frame width in pixels
    #[serde(default = "default_picture_width")]
    pub width: u32,

    /// Raw frame height in pixels
    #[serde(default = "default_picture_height")]
    pub height: u32,

    /// Bytes per pixel
    #[serde(default = "default_picture_channels")]
    pub channels: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BusConfig {
    /// Event bus capacity
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,

    /// Log every published event at debug level
    #[serde(default)]
    pub debug_logging: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Pending commands before callers are back-pressured
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl From<&BoardConfig> for CalibrationBoard {
    fn from(board: &BoardConfig) -> Self {
        CalibrationBoard {
            width: board.width,
            height: board.height,
            rectangle_width: board.rectangle_width,
            rectangle_height: board.rectangle_height,
        }
    }
}

impl CalibrationConfig {
    pub fn settings(&self) -> CalibrationSettings {
        CalibrationSettings {
            image_amount: self.image_amount,
            image_delay: Duration::from_millis(self.image_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl FleetConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camfleet.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("calibration.image_amount", default_image_amount())?
            .set_default("calibration.image_delay_ms", default_image_delay_ms())?
            .set_default("calibration.poll_interval_ms", default_poll_interval_ms())?
            .set_default("calibration.timeout_seconds", default_timeout_seconds())?
            .set_default("calibration.board.width", default_board_width())?
            .set_default("calibration.board.height", default_board_height())?
            .set_default("calibration.board.rectangle_width", default_rectangle_size())?
            .set_default("calibration.board.rectangle_height", default_rectangle_size())?
            .set_default("picture.width", default_picture_width())?
            .set_default("picture.height", default_picture_height())?
            .set_default("picture.channels", default_picture_channels())?
            .set_default("bus.capacity", default_bus_capacity() as i64)?
            .set_default("bus.debug_logging", false)?
            .set_default(
                "coordinator.command_capacity",
                default_command_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // CAMFLEET_CALIBRATION__IMAGE_AMOUNT=10
            .add_source(Environment::with_prefix("CAMFLEET").separator("__"))
            .build()?;

        let config: FleetConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let calibration = &self.calibration;
        if calibration.image_amount == 0 {
            return Err(ConfigError::Message(
                "Calibration image_amount must be greater than 0".to_string(),
            ));
        }

        if calibration.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Calibration poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if calibration.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Calibration timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let board = &calibration.board;
        if board.width == 0 || board.height == 0 {
            return Err(ConfigError::Message(
                "Calibration board corner counts must be greater than 0".to_string(),
            ));
        }

        if board.rectangle_width <= 0.0 || board.rectangle_height <= 0.0 {
            return Err(ConfigError::Message(
                "Calibration board rectangle sizes must be positive".to_string(),
            ));
        }

        if self.picture.width == 0 || self.picture.height == 0 || self.picture.channels == 0 {
            return Err(ConfigError::Message(
                "Picture geometry must be greater than 0".to_string(),
            ));
        }

        if self.bus.capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.coordinator.command_capacity == 0 {
            return Err(ConfigError::Message(
                "Coordinator command_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            calibration: CalibrationConfig {
                image_amount: default_image_amount(),
                image_delay_ms: default_image_delay_ms(),
                poll_interval_ms: default_poll_interval_ms(),
                timeout_seconds: default_timeout_seconds(),
                board: default_board(),
            },
            picture: PictureConfig {
                width: default_picture_width(),
                height: default_picture_height(),
                channels: default_picture_channels(),
            },
            bus: BusConfig {
                capacity: default_bus_capacity(),
                debug_logging: false,
            },
            coordinator: CoordinatorConfig {
                command_capacity: default_command_capacity(),
            },
        }
    }
}

// Default value functions
fn default_image_amount() -> u32 {
    20
}
fn default_image_delay_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_timeout_seconds() -> u64 {
    120
}

fn default_board() -> BoardConfig {
    BoardConfig {
        width: default_board_width(),
        height: default_board_height(),
        rectangle_width: default_rectangle_size(),
        rectangle_height: default_rectangle_size(),
    }
}
fn default_board_width() -> u32 {
    9
}
fn default_board_height() -> u32 {
    6
}
fn default_rectangle_size() -> f64 {
    25.0
}

fn default_picture_width() -> u32 {
    640
}
fn default_picture_height() -> u32 {
    480
}
fn default_picture_channels() -> u32 {
    3
}

fn default_bus_capacity() -> usize {
    100
}
fn default_command_capacity() -> usize {
    64
}
