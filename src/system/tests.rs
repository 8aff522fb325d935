use super::*;
use crate::calibration::{CalibrationData, CalibrationFailure};
use crate::camera::CameraStatus;
use crate::listener::StatusLog;
use crate::picture::{Picture, RawFrameDecoder};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const IMAGE_AMOUNT: u32 = 5;

fn create_test_system(camera_count: u32) -> CameraSystem {
    let mut system = CameraSystem::new(CalibrationSettings {
        image_amount: IMAGE_AMOUNT,
        image_delay: Duration::from_millis(100),
    });
    for id in 0..camera_count {
        system.add_camera(Camera::new(id)).unwrap();
    }
    system
}

fn test_board() -> CalibrationBoard {
    CalibrationBoard::new(9, 6, 25.0, 25.0)
}

fn test_decoder() -> RawFrameDecoder {
    RawFrameDecoder::new(4, 4, 3)
}

fn calibration_picture(camera_id: u32) -> PictureMessage {
    PictureMessage {
        camera_id,
        is_calibration_image: true,
        image: vec![128u8; 48],
    }
}

fn live_picture(camera_id: u32) -> PictureMessage {
    PictureMessage {
        is_calibration_image: false,
        ..calibration_picture(camera_id)
    }
}

fn feed(system: &mut CameraSystem, camera_id: u32, count: u32) {
    let decoder = test_decoder();
    for _ in 0..count {
        assert!(system.deliver_picture(calibration_picture(camera_id), &decoder));
    }
}

fn succeeding(_camera_id: u32, pictures: &[Picture], _board: &CalibrationBoard) -> std::result::Result<CalibrationData, CalibrationFailure> {
    Ok(CalibrationData {
        camera_matrix: [520.0, 0.0, 320.0, 0.0, 520.0, 240.0, 0.0, 0.0, 1.0],
        distortion_coefficients: vec![0.0; 5],
        reprojection_error: 1.0 / pictures.len() as f64,
    })
}

fn failing_for_two(camera_id: u32, pictures: &[Picture], board: &CalibrationBoard) -> std::result::Result<CalibrationData, CalibrationFailure> {
    if camera_id == 2 {
        Err(CalibrationFailure::PatternNotFound {
            found: 1,
            required: pictures.len(),
        })
    } else {
        succeeding(camera_id, pictures, board)
    }
}

fn ids(cameras: Vec<&Camera>) -> BTreeSet<u32> {
    cameras.into_iter().map(Camera::id).collect()
}

#[test]
fn test_add_camera_rejects_duplicate_id() {
    let mut system = create_test_system(2);
    match system.add_camera(Camera::new(1)) {
        Err(FleetError::DuplicateId { id }) => assert_eq!(id, 1),
        other => panic!("Expected DuplicateId, got {:?}", other),
    }
    assert_eq!(system.camera_amount(), 2);
}

#[test]
fn test_lookup_is_keyed_by_id() {
    let mut system = create_test_system(0);
    system.add_camera(Camera::new(7)).unwrap();
    system.add_camera(Camera::new(3)).unwrap();

    assert_eq!(system.camera(7).unwrap().id(), 7);
    assert!(matches!(system.camera(0), Err(FleetError::NotFound { id: 0 })));
    assert_eq!(
        system.cameras_as_vec().iter().map(|c| c.id()).collect::<Vec<_>>(),
        vec![3, 7]
    );
    assert!(system.cameras_as_map().keys().all(|id| system.camera(*id).unwrap().id() == *id));
}

#[test]
fn test_empty_registry_is_calibrated_but_cannot_start() {
    let mut system = create_test_system(0);
    assert!(system.is_calibrated());
    assert!(matches!(
        system.start_calibration(test_board()),
        Err(FleetError::EmptyRegistry)
    ));
}

#[test]
fn test_start_calibration_resets_every_camera() {
    let mut system = create_test_system(3);
    system.camera_mut(1).unwrap().set_calibration_data(CalibrationData {
        camera_matrix: [1.0; 9],
        distortion_coefficients: vec![],
        reprojection_error: 0.0,
    });

    let directives = system.start_calibration(test_board()).unwrap();
    assert_eq!(directives.len(), 3);
    assert!(directives.iter().all(|d| d.image_amount == IMAGE_AMOUNT && d.image_delay == 100));
    assert_eq!(directives[0].board_width, 9);

    for camera in system.cameras_as_vec() {
        assert_eq!(camera.state(), CalibrationState::AwaitingImages);
        assert_eq!(camera.pending_image_count(), 0);
        assert!(camera.calibration_data().is_none());
    }
    assert!(system.is_session_active());
}

#[test]
fn test_invalid_board_starts_no_session() {
    let mut system = create_test_system(1);
    system.camera_mut(0).unwrap().set_calibration_data(CalibrationData {
        camera_matrix: [1.0; 9],
        distortion_coefficients: vec![],
        reprojection_error: 0.0,
    });

    assert!(matches!(
        system.start_calibration(CalibrationBoard::new(0, 0, -1.0, 0.0)),
        Err(FleetError::InvalidBoard { .. })
    ));
    assert!(!system.is_session_active());
    assert!(system.camera(0).unwrap().is_calibrated());
}

#[test]
fn test_second_start_fails_while_session_in_flight() {
    let mut system = create_test_system(2);
    system.start_calibration(test_board()).unwrap();

    assert!(matches!(
        system.start_calibration(test_board()),
        Err(FleetError::SessionAlreadyActive)
    ));
}

#[test]
fn test_live_and_unexpected_pictures_are_dropped() {
    let mut system = create_test_system(2);
    let decoder = test_decoder();

    assert!(!system.deliver_picture(calibration_picture(0), &decoder));
    system.start_calibration(test_board()).unwrap();

    assert!(!system.deliver_picture(live_picture(0), &decoder));
    assert!(!system.deliver_picture(calibration_picture(42), &decoder));
    assert!(!system.deliver_picture(
        PictureMessage {
            image: vec![0u8; 3],
            ..calibration_picture(1)
        },
        &decoder
    ));
    assert_eq!(system.calibration_picture_count(), 0);

    assert!(system.deliver_picture(calibration_picture(1), &decoder));
    assert_eq!(system.camera(1).unwrap().pending_image_count(), 1);
    assert_eq!(system.session().unwrap().collected(1), 1);
}

#[test]
fn test_take_calibration_pictures_reports_readiness() {
    let mut system = create_test_system(2);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, IMAGE_AMOUNT);
    feed(&mut system, 1, IMAGE_AMOUNT - 1);

    let ready = system.take_calibration_pictures();
    assert_eq!(ready.get(&0), Some(&true));
    assert_eq!(ready.get(&1), Some(&false));
}

#[test]
fn test_successful_calculation_calibrates_camera() {
    let mut system = create_test_system(1);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, IMAGE_AMOUNT);

    let outcomes = system.calculate_calibration(&succeeding);
    assert_eq!(outcomes.get(&0), Some(&CameraOutcome::Calibrated));

    let camera = system.camera(0).unwrap();
    assert!(camera.is_calibrated());
    assert!(camera.calibration_data().is_some());
    assert_eq!(camera.pending_image_count(), 0);
    assert!(system.is_calibrated());
    assert!(!system.is_session_active());

    let summary = system.take_completed_session().unwrap();
    assert_eq!(summary.calibrated, vec![0]);
    assert!(system.take_completed_session().is_none());
}

#[test]
fn test_calculation_skips_cameras_without_enough_pictures() {
    let mut system = create_test_system(2);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, IMAGE_AMOUNT);
    feed(&mut system, 1, 2);

    let outcomes = system.calculate_calibration(&succeeding);
    assert_eq!(outcomes.len(), 1);
    assert!(system.is_session_active());
    assert_eq!(system.session().unwrap().pending_targets(), vec![1]);
    assert_eq!(system.camera(1).unwrap().pending_image_count(), 2);
}

#[test]
fn test_three_camera_scenario_with_one_failure() {
    let mut system = create_test_system(3);
    let log = Arc::new(StatusLog::new(32));
    system.add_camera_listener(2, log.clone()).unwrap();

    system.start_calibration(test_board()).unwrap();
    for id in 0..3 {
        feed(&mut system, id, IMAGE_AMOUNT);
    }
    assert!(system.take_calibration_pictures().values().all(|ready| *ready));

    let outcomes = system.calculate_calibration(&failing_for_two);
    assert!(outcomes[&0].is_calibrated());
    assert!(outcomes[&1].is_calibrated());
    assert!(!outcomes[&2].is_calibrated());

    assert_eq!(ids(system.calibrated_cameras()), BTreeSet::from([0, 1]));
    assert_eq!(ids(system.uncalibrated_cameras()), BTreeSet::from([2]));
    assert!(!system.is_calibrated());

    let failed = system.camera(2).unwrap();
    assert_eq!(failed.state(), CalibrationState::AwaitingImages);
    assert_eq!(failed.pending_image_count(), IMAGE_AMOUNT as usize);
    assert!(matches!(
        log.latest(2),
        Some(CameraStatus::CalibrationFailed { .. })
    ));

    let summary = system.take_completed_session().unwrap();
    assert_eq!(summary.failed, vec![2]);

    // A failed camera needs a fresh session, which clears its buffer
    system.start_calibration(test_board()).unwrap();
    assert_eq!(system.camera(2).unwrap().pending_image_count(), 0);
}

#[test]
fn test_failed_camera_waits_for_next_session() {
    let mut system = create_test_system(2);
    let log = Arc::new(StatusLog::new(16));
    system.add_camera_listener(0, log.clone()).unwrap();

    let attempts = AtomicUsize::new(0);
    let fails_first_time = |camera_id: u32, pictures: &[Picture], board: &CalibrationBoard| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(CalibrationFailure::Solver {
                message: "did not converge".to_string(),
            })
        } else {
            succeeding(camera_id, pictures, board)
        }
    };

    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, IMAGE_AMOUNT);
    feed(&mut system, 1, 1);

    let first = system.calculate_calibration(&fails_first_time);
    assert!(matches!(first.get(&0), Some(CameraOutcome::Failed(_))));
    assert!(system.is_session_active());

    assert!(!system.deliver_picture(calibration_picture(0), &test_decoder()));
    let second = system.calculate_calibration(&fails_first_time);
    assert!(second.is_empty());

    let camera = system.camera(0).unwrap();
    assert_eq!(camera.state(), CalibrationState::AwaitingImages);
    assert_eq!(camera.pending_image_count(), IMAGE_AMOUNT as usize);
    assert_eq!(
        system.session().unwrap().outcome(0),
        Some(TargetOutcome::Failed)
    );
    let failures = log
        .records()
        .iter()
        .filter(|record| matches!(record.status, CameraStatus::CalibrationFailed { .. }))
        .count();
    assert_eq!(failures, 1);
}

#[test]
fn test_partition_covers_registry_without_overlap() {
    let mut system = create_test_system(4);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 1, IMAGE_AMOUNT);
    feed(&mut system, 3, IMAGE_AMOUNT);
    system.calculate_calibration(&succeeding);
    system.add_camera(Camera::new(10)).unwrap();

    let calibrated = ids(system.calibrated_cameras());
    let uncalibrated = ids(system.uncalibrated_cameras());
    let all: BTreeSet<u32> = system.cameras_as_map().keys().copied().collect();

    assert!(calibrated.is_disjoint(&uncalibrated));
    assert_eq!(calibrated.union(&uncalibrated).copied().collect::<BTreeSet<_>>(), all);
    assert_eq!(calibrated, BTreeSet::from([1, 3]));
}

#[test]
fn test_delete_calibration() {
    let mut system = create_test_system(1);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, IMAGE_AMOUNT);
    system.calculate_calibration(&succeeding);
    assert!(system.is_calibrated());

    system.delete_calibration(0).unwrap();
    assert!(!system.is_calibrated());
    assert!(system.camera(0).unwrap().calibration_data().is_none());

    system.delete_calibration(0).unwrap();
    assert_eq!(system.camera(0).unwrap().state(), CalibrationState::Uncalibrated);
    assert!(matches!(
        system.delete_calibration(9),
        Err(FleetError::NotFound { id: 9 })
    ));
}

#[test]
fn test_delete_calibration_aborts_session_target() {
    let mut system = create_test_system(2);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, IMAGE_AMOUNT);
    system.calculate_calibration(&succeeding);
    assert!(system.is_session_active());

    system.delete_calibration(1).unwrap();
    assert!(!system.is_session_active());

    let summary = system.take_completed_session().unwrap();
    assert_eq!(summary.calibrated, vec![0]);
    assert_eq!(summary.aborted, vec![1]);
    assert!(system.start_calibration(test_board()).is_ok());
}

#[test]
fn test_camera_added_mid_session_is_not_a_target() {
    let mut system = create_test_system(1);
    system.start_calibration(test_board()).unwrap();
    system.add_camera(Camera::new(5)).unwrap();

    assert!(!system.deliver_picture(calibration_picture(5), &test_decoder()));
    assert!(!system.session().unwrap().is_target(5));
    assert_eq!(system.camera(5).unwrap().state(), CalibrationState::Uncalibrated);
}

#[test]
fn test_initialize_cameras_builds_one_directive_per_camera() {
    let system = create_test_system(3);
    let quadcopters: BTreeMap<u32, QuadcopterDescriptor> = [3, 4]
        .into_iter()
        .map(|id| {
            (
                id,
                QuadcopterDescriptor {
                    id,
                    marker_hue: Some(120),
                },
            )
        })
        .collect();

    let first = system.initialize_cameras(&quadcopters);
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|d| d.quadcopters.len() == 2));
    assert_eq!(first, system.initialize_cameras(&quadcopters));
}

#[test]
fn test_calibration_pictures_grouped_per_camera() {
    let mut system = create_test_system(2);
    system.start_calibration(test_board()).unwrap();
    feed(&mut system, 0, 2);
    feed(&mut system, 1, 3);

    let pictures = system.calibration_pictures();
    assert_eq!(pictures.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(system.calibration_picture_count(), 5);
    assert!(pictures[1].iter().all(|p| p.camera_id == 1));
}

#[test]
fn test_listener_registration_on_unknown_camera_fails() {
    let mut system = create_test_system(1);
    let log = Arc::new(StatusLog::new(4));

    assert!(system.add_camera_listener(3, log.clone()).is_err());
    let subscription = system.add_camera_listener(0, log).unwrap();
    assert!(system.remove_camera_listener(0, subscription).unwrap());
    assert!(!system.remove_camera_listener(0, subscription).unwrap());
}
