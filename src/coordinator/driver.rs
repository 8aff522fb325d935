use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::handle::CoordinatorHandle;
use crate::calibration::CalibrationBoard;
use crate::error::{FleetError, Result};
use crate::system::CameraOutcome;

impl CoordinatorHandle {
    /// Configured session deadline and picture poll interval
    pub fn calibration_timing(&self) -> (Duration, Duration) {
        (self.calibration.timeout(), self.calibration.poll_interval())
    }

    /// Run a full calibration session with the configured board and deadline
    pub async fn run_default_calibration(&self) -> Result<BTreeMap<u32, CameraOutcome>> {
        let board = CalibrationBoard::from(&self.calibration.board);
        let (deadline, poll_interval) = self.calibration_timing();
        self.run_calibration(board, deadline, poll_interval).await
    }

    /// Start a session, poll until every target holds enough pictures, then
    /// compute the calibration.
    ///
    /// When `deadline` passes first, the cameras still waiting are reported
    /// in `CalibrationTimeout` and the session is left as it is.
    pub async fn run_calibration(
        &self,
        board: CalibrationBoard,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<BTreeMap<u32, CameraOutcome>> {
        let targets = self.start_calibration(board).await?;
        info!(
            "Waiting up to {:?} for calibration pictures from cameras {:?}",
            deadline, targets
        );

        let mut waiting = targets;
        let polled = timeout(deadline, async {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                waiting = self.snapshot().await?.waiting_targets();
                if waiting.is_empty() {
                    return Ok::<(), FleetError>(());
                }
                debug!("Still waiting for calibration pictures from {:?}", waiting);
            }
        })
        .await;

        match polled {
            Ok(Ok(())) => self.calculate_calibration().await,
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    "Calibration deadline of {:?} passed, cameras {:?} incomplete",
                    deadline, waiting
                );
                Err(FleetError::CalibrationTimeout { pending: waiting })
            }
        }
    }
}
