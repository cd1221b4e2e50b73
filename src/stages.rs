//! Consistency rules for the reported pipeline timeline.
//!
//! A run walks six ordered stages after `start`: env, depend, build,
//! test, install, distcheck. A stage timestamp of 0 means the stage
//! was never reached; distcheck != 0 marks overall success.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimes {
    pub start: i64,
    pub env: i64,
    pub depend: i64,
    pub build: i64,
    pub test: i64,
    pub install: i64,
    pub distcheck: i64,
}

impl StageTimes {
    /// Stages in pipeline order, `start` first.
    pub fn sequence(&self) -> [i64; 7] {
        [
            self.start,
            self.env,
            self.depend,
            self.build,
            self.test,
            self.install,
            self.distcheck,
        ]
    }

    pub fn succeeded(&self) -> bool {
        self.distcheck != 0
    }
}

/// The distinct ways a timeline can be inconsistent. All of them are
/// the same 403 externally; they are kept apart for the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageError {
    /// A stage was reached after an earlier stage was not.
    InvalidProgression,
    /// A reached stage carries a timestamp before its predecessor.
    NonMonotonicTimestamp,
    /// A log was supplied together with a successful distcheck.
    LogAfterSuccess,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::InvalidProgression => write!(f, "invalid stages"),
            StageError::NonMonotonicTimestamp => write!(f, "invalid timestamp sequence"),
            StageError::LogAfterSuccess => write!(f, "log on successful run"),
        }
    }
}

/// Validate the timeline and the log-presence rule. For every adjacent
/// pair, a reached stage requires its predecessor reached and a
/// non-decreasing timestamp; an unreached stage forces all later
/// stages unreached.
pub fn validate(times: &StageTimes, log: &str) -> Result<(), StageError> {
    let seq = times.sequence();

    // A zero stage must only be followed by zero stages.
    for i in 1..seq.len() {
        if seq[i] != 0 && seq[i - 1] == 0 {
            return Err(StageError::InvalidProgression);
        }
    }

    // Reached stages must not move backwards in time.
    for i in 1..seq.len() {
        if seq[i] != 0 && seq[i] < seq[i - 1] {
            return Err(StageError::NonMonotonicTimestamp);
        }
    }

    if times.succeeded() && !log.is_empty() {
        return Err(StageError::LogAfterSuccess);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(seq: [i64; 7]) -> StageTimes {
        StageTimes {
            start: seq[0],
            env: seq[1],
            depend: seq[2],
            build: seq[3],
            test: seq[4],
            install: seq[5],
            distcheck: seq[6],
        }
    }

    #[test]
    fn full_successful_run_is_accepted() {
        let t = times([100, 110, 120, 130, 140, 150, 160]);
        assert_eq!(validate(&t, ""), Ok(()));
    }

    #[test]
    fn truncated_run_is_accepted() {
        let t = times([100, 110, 120, 130, 0, 0, 0]);
        assert_eq!(validate(&t, ""), Ok(()));
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        // `date +%s` on a fast machine produces duplicates.
        let t = times([100, 100, 100, 100, 100, 100, 100]);
        assert_eq!(validate(&t, ""), Ok(()));
    }

    #[test]
    fn stage_after_gap_is_rejected() {
        let t = times([100, 110, 0, 50, 0, 0, 0]);
        assert_eq!(validate(&t, ""), Err(StageError::InvalidProgression));
    }

    #[test]
    fn distcheck_after_gap_is_rejected() {
        let t = times([100, 110, 120, 130, 140, 0, 160]);
        assert_eq!(validate(&t, ""), Err(StageError::InvalidProgression));
    }

    #[test]
    fn backwards_timestamp_is_rejected() {
        let t = times([100, 110, 105, 0, 0, 0, 0]);
        assert_eq!(validate(&t, ""), Err(StageError::NonMonotonicTimestamp));
    }

    #[test]
    fn env_before_start_is_rejected() {
        let t = times([100, 90, 0, 0, 0, 0, 0]);
        assert_eq!(validate(&t, ""), Err(StageError::NonMonotonicTimestamp));
    }

    #[test]
    fn failure_log_is_accepted() {
        let t = times([100, 110, 120, 0, 0, 0, 0]);
        assert_eq!(validate(&t, "make: *** [all] Error 1"), Ok(()));
    }

    #[test]
    fn log_with_success_is_rejected() {
        let t = times([100, 110, 120, 130, 140, 150, 160]);
        assert_eq!(
            validate(&t, "spurious warning output"),
            Err(StageError::LogAfterSuccess)
        );
    }

    #[test]
    fn empty_log_with_success_is_accepted() {
        let t = times([100, 110, 120, 130, 140, 150, 160]);
        assert_eq!(validate(&t, ""), Ok(()));
    }
}
