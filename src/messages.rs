//! Wire messages exchanged with the camera modules over the transport.

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationBoard, CalibrationSettings};

/// Registration request a module sends on first contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announce {
    pub module_type: i32,
    #[serde(default)]
    pub camera_hardware_id: Option<i64>,
}

/// Reply to an announcement; `id` is -1 when the announcement was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnounceResponse {
    pub id: i64,
}

impl AnnounceResponse {
    pub const REJECTED: AnnounceResponse = AnnounceResponse { id: -1 };

    pub fn accepted(id: u32) -> Self {
        Self { id: i64::from(id) }
    }

    pub fn is_accepted(&self) -> bool {
        self.id >= 0
    }
}

/// Picture sent by a camera module, either a live frame or a calibration shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureMessage {
    pub camera_id: u32,
    pub is_calibration_image: bool,
    pub image: Vec<u8>,
}

/// What a camera needs to know about one tracked quadcopter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadcopterDescriptor {
    pub id: u32,
    /// Marker colour the tracker looks for
    #[serde(default)]
    pub marker_hue: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeCameraDirective {
    pub camera_id: u32,
    pub quadcopters: Vec<QuadcopterDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrateCameraDirective {
    pub camera_id: u32,
    pub image_amount: u32,
    /// Delay between two pictures in milliseconds
    pub image_delay: u64,
    pub board_width: u32,
    pub board_height: u32,
    pub board_rectangle_width: f64,
    pub board_rectangle_height: f64,
}

impl CalibrateCameraDirective {
    pub fn new(camera_id: u32, settings: &CalibrationSettings, board: &CalibrationBoard) -> Self {
        Self {
            camera_id,
            image_amount: settings.image_amount,
            image_delay: settings.image_delay.as_millis() as u64,
            board_width: board.width,
            board_height: board.height,
            board_rectangle_width: board.rectangle_width,
            board_rectangle_height: board.rectangle_height,
        }
    }
}

/// Toggles whether a camera streams live pictures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureSendingActivation {
    pub camera_id: u32,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_announce_without_hardware_id_parses() {
        let announce: Announce = serde_json::from_str(r#"{"module_type": 1}"#).unwrap();
        assert_eq!(announce.module_type, 1);
        assert_eq!(announce.camera_hardware_id, None);
    }

    #[test]
    fn test_rejected_response_serializes_minus_one() {
        let json = serde_json::to_string(&AnnounceResponse::REJECTED).unwrap();
        assert_eq!(json, r#"{"id":-1}"#);
        assert!(!AnnounceResponse::REJECTED.is_accepted());
        assert!(AnnounceResponse::accepted(0).is_accepted());
    }

    #[test]
    fn test_calibrate_directive_carries_board_and_settings() {
        let settings = CalibrationSettings {
            image_amount: 5,
            image_delay: Duration::from_millis(300),
        };
        let board = CalibrationBoard::new(8, 5, 30.0, 28.5);
        let directive = CalibrateCameraDirective::new(2, &settings, &board);

        assert_eq!(directive.camera_id, 2);
        assert_eq!(directive.image_amount, 5);
        assert_eq!(directive.image_delay, 300);
        assert_eq!((directive.board_width, directive.board_height), (8, 5));
        assert_eq!(directive.board_rectangle_height, 28.5);
    }
}
