use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::InvalidInputError;

pub const DEFAULT_WORKER_COUNT: usize = 8;
/// Each worker owns a thread with a large stack.
pub const MAX_WORKER_COUNT: usize = 256;
const MIN_BUDGET_SECS: f64 = 5.0;
const MAX_BUDGET_SECS: f64 = 120.0;
const BUDGET_COMPLEXITY_DIVISOR: f64 = 100_000.0;

/// Soft preference minimised by branch and bound when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum Objective {
    /// One penalty point per occupied slot outside the faculty's preferred set.
    PreferredTimes,
    /// One penalty point per period a session starts after the first of its day.
    EarlyPeriods,
}

/// Per-solve configuration. Passed into each invocation, never global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolveConfig {
    /// Wall-clock budget; `None` derives one from the problem size.
    pub time_budget_seconds: Option<f64>,
    pub worker_count: usize,
    pub optimization_objective: Option<Objective>,
    /// Return the deepest partial assignment on timeout instead of nothing.
    pub allow_partial: bool,
    /// Perturbs the search order of workers 1..N. Worker 0 ignores it.
    pub seed: u64,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            time_budget_seconds: None,
            worker_count: DEFAULT_WORKER_COUNT,
            optimization_objective: None,
            allow_partial: false,
            seed: 0,
        }
    }
}

impl SolveConfig {
    pub fn validate(&self) -> Result<(), InvalidInputError> {
        if self.worker_count == 0 {
            return Err(InvalidInputError::Config(
                "workerCount must be at least 1".to_string(),
            ));
        }
        if self.worker_count > MAX_WORKER_COUNT {
            return Err(InvalidInputError::Config(format!(
                "workerCount must be at most {MAX_WORKER_COUNT}, got {}",
                self.worker_count
            )));
        }
        if let Some(secs) = self.time_budget_seconds {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(InvalidInputError::Config(format!(
                    "timeBudgetSeconds must be a positive number, got {secs}"
                )));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(InvalidInputError::Config(format!(
                    "timeBudgetSeconds is too large, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// The explicit budget, or one scaled to `courses × timeslots × students`.
    pub fn time_budget(&self, courses: usize, timeslots: usize, students: u64) -> Duration {
        match self.time_budget_seconds {
            Some(secs) => Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX),
            None => default_time_budget(courses, timeslots, students),
        }
    }
}

pub fn default_time_budget(courses: usize, timeslots: usize, students: u64) -> Duration {
    let complexity = courses as f64 * timeslots as f64 * students.max(1) as f64;
    let secs = (MIN_BUDGET_SECS + complexity / BUDGET_COMPLEXITY_DIVISOR)
        .clamp(MIN_BUDGET_SECS, MAX_BUDGET_SECS);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_grows_with_problem_size_and_is_capped() {
        let small = default_time_budget(2, 10, 30);
        let medium = default_time_budget(40, 40, 600);
        let huge = default_time_budget(500, 60, 20_000);
        assert!(small >= Duration::from_secs(5) && small < Duration::from_secs(6));
        assert!(medium > small);
        assert_eq!(huge, Duration::from_secs(120));
    }

    #[test]
    fn explicit_budget_overrides_default() {
        let config = SolveConfig {
            time_budget_seconds: Some(1.5),
            ..Default::default()
        };
        assert_eq!(config.time_budget(1000, 1000, 1000), Duration::from_millis(1500));
    }

    #[test]
    fn zero_workers_and_bad_budgets_are_rejected() {
        let zero = SolveConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let negative = SolveConfig {
            time_budget_seconds: Some(-1.0),
            ..Default::default()
        };
        assert!(negative.validate().is_err());
        assert!(SolveConfig::default().validate().is_ok());
    }

    #[test]
    fn oversized_budgets_and_worker_counts_are_rejected() {
        let huge = SolveConfig {
            time_budget_seconds: Some(1e20),
            ..Default::default()
        };
        assert!(matches!(huge.validate(), Err(InvalidInputError::Config(_))));
        assert_eq!(huge.time_budget(1, 1, 1), Duration::MAX);

        let crowd = SolveConfig {
            worker_count: MAX_WORKER_COUNT + 1,
            ..Default::default()
        };
        assert!(matches!(crowd.validate(), Err(InvalidInputError::Config(_))));
        let busy = SolveConfig {
            worker_count: MAX_WORKER_COUNT,
            ..Default::default()
        };
        assert!(busy.validate().is_ok());
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: SolveConfig =
            serde_json::from_str(r#"{"optimizationObjective":"preferredTimes"}"#).unwrap();
        assert_eq!(config.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(config.optimization_objective, Some(Objective::PreferredTimes));
    }
}
