use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::calibration::{CalibrationBoard, CalibrationFailure, CalibrationSettings};

/// How a target camera left a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetOutcome {
    Calibrated,
    Failed,
    /// Calibration was deleted while the session ran
    Aborted,
}

/// Result of one computation attempt in `calculate_calibration`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CameraOutcome {
    Calibrated,
    Failed(CalibrationFailure),
}

impl CameraOutcome {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CameraOutcome::Calibrated)
    }
}

/// Summary of a session once every target is settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub calibrated: Vec<u32>,
    pub failed: Vec<u32>,
    pub aborted: Vec<u32>,
}

/// Calibration run over the fixed set of cameras known when it started
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    id: Uuid,
    board: CalibrationBoard,
    settings: CalibrationSettings,
    targets: BTreeSet<u32>,
    collected: BTreeMap<u32, u32>,
    settled: BTreeMap<u32, TargetOutcome>,
    started_at: Instant,
}

impl CalibrationSession {
    pub fn new(
        board: CalibrationBoard,
        settings: CalibrationSettings,
        targets: impl IntoIterator<Item = u32>,
    ) -> Self {
        let targets: BTreeSet<u32> = targets.into_iter().collect();
        let collected = targets.iter().map(|id| (*id, 0)).collect();
        Self {
            id: Uuid::new_v4(),
            board,
            settings,
            targets,
            collected,
            settled: BTreeMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn board(&self) -> &CalibrationBoard {
        &self.board
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn targets(&self) -> &BTreeSet<u32> {
        &self.targets
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_target(&self, camera_id: u32) -> bool {
        self.targets.contains(&camera_id)
    }

    /// Pictures collected for a target during this session
    pub fn collected(&self, camera_id: u32) -> u32 {
        self.collected.get(&camera_id).copied().unwrap_or(0)
    }

    pub fn record_image(&mut self, camera_id: u32) {
        if let Some(count) = self.collected.get_mut(&camera_id) {
            *count += 1;
        }
    }

    /// Settle a target; later outcomes for the same camera are ignored
    pub fn settle(&mut self, camera_id: u32, outcome: TargetOutcome) {
        if self.is_target(camera_id) {
            self.settled.entry(camera_id).or_insert(outcome);
        }
    }

    pub fn outcome(&self, camera_id: u32) -> Option<TargetOutcome> {
        self.settled.get(&camera_id).copied()
    }

    /// Targets that have neither calibrated, failed nor been aborted
    pub fn pending_targets(&self) -> Vec<u32> {
        self.targets
            .iter()
            .filter(|id| !self.settled.contains_key(*id))
            .copied()
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.settled.len() == self.targets.len()
    }

    pub fn summary(&self) -> SessionSummary {
        let with = |wanted: TargetOutcome| -> Vec<u32> {
            self.settled
                .iter()
                .filter(|(_, outcome)| **outcome == wanted)
                .map(|(id, _)| *id)
                .collect()
        };
        SessionSummary {
            id: self.id,
            calibrated: with(TargetOutcome::Calibrated),
            failed: with(TargetOutcome::Failed),
            aborted: with(TargetOutcome::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(targets: &[u32]) -> CalibrationSession {
        CalibrationSession::new(
            CalibrationBoard::new(9, 6, 25.0, 25.0),
            CalibrationSettings {
                image_amount: 3,
                image_delay: Duration::from_millis(10),
            },
            targets.iter().copied(),
        )
    }

    #[test]
    fn test_session_completes_when_all_targets_settle() {
        let mut session = session(&[0, 1, 2]);
        session.settle(0, TargetOutcome::Calibrated);
        session.settle(2, TargetOutcome::Aborted);
        assert_eq!(session.pending_targets(), vec![1]);
        assert!(!session.is_complete());

        session.settle(1, TargetOutcome::Failed);
        assert!(session.is_complete());

        let summary = session.summary();
        assert_eq!(summary.calibrated, vec![0]);
        assert_eq!(summary.failed, vec![1]);
        assert_eq!(summary.aborted, vec![2]);
    }

    #[test]
    fn test_non_targets_are_ignored() {
        let mut session = session(&[4]);
        session.record_image(9);
        session.settle(9, TargetOutcome::Calibrated);

        assert_eq!(session.collected(9), 0);
        assert_eq!(session.outcome(9), None);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_first_outcome_wins() {
        let mut session = session(&[1]);
        session.record_image(1);
        session.record_image(1);
        session.settle(1, TargetOutcome::Failed);
        session.settle(1, TargetOutcome::Aborted);

        assert_eq!(session.collected(1), 2);
        assert_eq!(session.outcome(1), Some(TargetOutcome::Failed));
    }
}
