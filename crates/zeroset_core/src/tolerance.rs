//! Per-call solver configuration. Nothing here is process-wide.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Branch angle, in degrees, below which exhaustive mode treats a candidate as
/// tangential and spends extra subdivision around it.
pub const EXHAUSTIVE_DETECTION_DEG: f64 = 1.0;

/// How candidates near tangential configurations are handled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AngularMode {
    /// Candidates whose branch angle is below `max_deviation_deg` are treated
    /// as tangencies and merged with tangential neighbours.
    Heuristic { max_deviation_deg: f64 },
    /// Tangential candidates trigger extra subdivision around them instead of
    /// being merged.
    Exhaustive,
}

/// Caller-supplied limits on a run. Exceeding either returns a partial result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub max_nodes: Option<usize>,
    pub time_limit: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Boxes whose widest side is at or below this go to the refiner.
    pub subdivision_tol: f64,
    /// Residual norm accepted as a root.
    pub numeric_tol: f64,
    pub angular: AngularMode,
    /// Disables early refinement so every box is subdivided down to
    /// `subdivision_tol`, and spends extra subdivision around tangential or
    /// failed candidates instead of merging them.
    pub full_search: bool,
    pub max_depth: usize,
    pub max_newton_steps: usize,
    /// Jacobians with a larger condition number count as singular.
    pub condition_limit: f64,
    /// Linking distance, in multiples of `subdivision_tol * sqrt(n)`.
    pub link_factor: f64,
    /// Extra levels of subdivision spent around tangencies in exhaustive mode.
    pub exhaustive_depth: usize,
    pub parallel: bool,
    #[serde(default)]
    pub budget: Budget,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            subdivision_tol: 1e-3,
            numeric_tol: 1e-9,
            angular: AngularMode::Heuristic {
                max_deviation_deg: 1.0,
            },
            full_search: false,
            max_depth: 64,
            max_newton_steps: 30,
            condition_limit: 1e8,
            link_factor: 2.0,
            exhaustive_depth: 3,
            parallel: false,
            budget: Budget::default(),
        }
    }
}

impl ToleranceConfig {
    pub fn new(subdivision_tol: f64, numeric_tol: f64) -> Self {
        Self {
            subdivision_tol,
            numeric_tol,
            ..Self::default()
        }
    }

    pub fn with_angular(mut self, angular: AngularMode) -> Self {
        self.angular = angular;
        self
    }

    pub fn with_full_search(mut self, full_search: bool) -> Self {
        self.full_search = full_search;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn validate(&self) -> Result<()> {
        positive("subdivision_tol", self.subdivision_tol)?;
        positive("numeric_tol", self.numeric_tol)?;
        positive("condition_limit", self.condition_limit)?;
        positive("link_factor", self.link_factor)?;
        if let AngularMode::Heuristic { max_deviation_deg } = self.angular {
            if !max_deviation_deg.is_finite() || !(0.0..=90.0).contains(&max_deviation_deg) {
                return Err(SolverError::InvalidTolerance(format!(
                    "angular deviation must lie in [0, 90] degrees, got {max_deviation_deg}"
                )));
            }
        }
        if self.max_depth == 0 {
            return Err(SolverError::InvalidTolerance(
                "max_depth must be greater than zero".to_string(),
            ));
        }
        if self.max_newton_steps == 0 {
            return Err(SolverError::InvalidTolerance(
                "max_newton_steps must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Candidates closer than this are the same root.
    pub fn dedup_radius(&self) -> f64 {
        0.5 * self.subdivision_tol
    }

    /// Candidates closer than this are adjacent on one component.
    pub fn link_distance(&self, dims: usize) -> f64 {
        self.link_factor * self.subdivision_tol * (dims.max(1) as f64).sqrt()
    }

    /// Widest box handed early to the refiner when `full_search` is off.
    pub fn early_refine_width(&self) -> f64 {
        8.0 * self.subdivision_tol
    }

    /// Threshold in degrees below which a candidate counts as tangential.
    pub fn tangency_threshold(&self) -> f64 {
        match self.angular {
            AngularMode::Heuristic { max_deviation_deg } => max_deviation_deg,
            AngularMode::Exhaustive => EXHAUSTIVE_DETECTION_DEG,
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SolverError::InvalidTolerance(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}
