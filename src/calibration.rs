//! Calibration value types and the seam to the external calibration math.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::FleetError;
use crate::picture::Picture;

/// Physical checkerboard target shown to the cameras during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBoard {
    /// Inner corners per row
    pub width: u32,
    /// Inner corners per column
    pub height: u32,
    pub rectangle_width: f64,
    pub rectangle_height: f64,
}

impl CalibrationBoard {
    pub fn new(width: u32, height: u32, rectangle_width: f64, rectangle_height: f64) -> Self {
        Self {
            width,
            height,
            rectangle_width,
            rectangle_height,
        }
    }

    /// Number of inner corners the detector has to find per picture
    pub fn corner_count(&self) -> u32 {
        self.width * self.height
    }

    /// Corner counts must be positive, rectangle sizes positive and finite
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.width == 0 || self.height == 0 {
            return Err(FleetError::InvalidBoard {
                reason: format!("{}x{} inner corners", self.width, self.height),
            });
        }
        let positive = |length: f64| length.is_finite() && length > 0.0;
        if !positive(self.rectangle_width) || !positive(self.rectangle_height) {
            return Err(FleetError::InvalidBoard {
                reason: format!(
                    "rectangle size {}x{}",
                    self.rectangle_width, self.rectangle_height
                ),
            });
        }
        Ok(())
    }
}

/// How many pictures a session asks for and how far apart they are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSettings {
    pub image_amount: u32,
    pub image_delay: Duration,
}

/// Intrinsic parameters computed for one camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Row-major 3x3 camera matrix
    pub camera_matrix: [f64; 9],
    pub distortion_coefficients: Vec<f64>,
    /// RMS reprojection error in pixels
    pub reprojection_error: f64,
}

impl CalibrationData {
    pub fn focal_length(&self) -> (f64, f64) {
        (self.camera_matrix[0], self.camera_matrix[4])
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.camera_matrix[2], self.camera_matrix[5])
    }
}

/// Reasons the calibration math can give up on a picture set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalibrationFailure {
    /// The board was found in fewer pictures than the solver needs
    PatternNotFound { found: usize, required: usize },
    /// No calibration backend is attached to this process
    BackendUnavailable,
    Solver { message: String },
}

impl fmt::Display for CalibrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationFailure::PatternNotFound { found, required } => write!(
                f,
                "board pattern found in {} pictures, {} required",
                found, required
            ),
            CalibrationFailure::BackendUnavailable => write!(f, "no calibration backend attached"),
            CalibrationFailure::Solver { message } => write!(f, "solver failed: {}", message),
        }
    }
}

/// Computes camera parameters from a set of board pictures.
///
/// Implementations are called synchronously from the coordinator with
/// pictures that are already buffered, so they must not wait on devices.
pub trait CalibrationAlgorithm: Send + Sync {
    fn calibrate(
        &self,
        camera_id: u32,
        pictures: &[Picture],
        board: &CalibrationBoard,
    ) -> Result<CalibrationData, CalibrationFailure>;
}

impl<F> CalibrationAlgorithm for F
where
    F: Fn(u32, &[Picture], &CalibrationBoard) -> Result<CalibrationData, CalibrationFailure>
        + Send
        + Sync,
{
    fn calibrate(
        &self,
        camera_id: u32,
        pictures: &[Picture],
        board: &CalibrationBoard,
    ) -> Result<CalibrationData, CalibrationFailure> {
        self(camera_id, pictures, board)
    }
}

/// Backend used when the process runs without calibration math attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedBackend;

impl CalibrationAlgorithm for DetachedBackend {
    fn calibrate(
        &self,
        _camera_id: u32,
        _pictures: &[Picture],
        _board: &CalibrationBoard,
    ) -> Result<CalibrationData, CalibrationFailure> {
        Err(CalibrationFailure::BackendUnavailable)
    }
}
