use crate::constraint::ConstraintSystem;
use crate::domain::{distance, ParameterBox};
use crate::tolerance::ToleranceConfig;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Fraction of the box width the iteration may wander outside the box.
const BOX_MARGIN: f64 = 0.5;

/// Iterations in a row pinned to the margin before giving up.
const MAX_CLAMPED_STEPS: usize = 3;

/// A refined point, with the data the classifier and assembler need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSolution {
    pub params: Vec<f64>,
    pub residual: Vec<f64>,
    pub residual_norm: f64,
    /// Set when the branch angle at the point is below the tangency threshold
    /// or the Jacobian is numerically singular.
    pub tangent: bool,
    /// Branch angle in degrees, when the system defines one.
    pub angle: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    Converged {
        point: Vec<f64>,
        residual: Vec<f64>,
        residual_norm: f64,
        iterations: usize,
        singular: bool,
    },
    /// The Jacobian became singular before the residual reached tolerance.
    Singular { point: Vec<f64>, residual_norm: f64 },
    Diverged,
}

impl Refinement {
    pub fn is_converged(&self) -> bool {
        matches!(self, Refinement::Converged { .. })
    }
}

/// Newton-type refiner. The step is the minimum-norm least-squares solution
/// of `J * delta = F`, so under- and over-determined systems are handled the
/// same way as square ones.
pub struct NewtonRefiner<'a> {
    system: &'a ConstraintSystem,
    config: &'a ToleranceConfig,
    floor: f64,
}

impl<'a> NewtonRefiner<'a> {
    pub fn new(system: &'a ConstraintSystem, config: &'a ToleranceConfig) -> Self {
        Self {
            system,
            config,
            floor: system.singularity_floor(config.numeric_tol),
        }
    }

    /// Ill-conditioned, or with a smallest singular value at or below the
    /// system's singularity floor. The second test is what catches multiple
    /// roots of a single equation, where the condition number is always one.
    pub fn is_singular(&self, jacobian: &DMatrix<f64>) -> bool {
        condition_number(jacobian) > self.config.condition_limit
            || smallest_singular_value(jacobian) <= self.floor
    }

    /// Starting points inside `region`: the centre, plus quarter points along
    /// every axis when the solution set is a manifold rather than points.
    pub fn seeds(&self, region: &ParameterBox) -> Vec<Vec<f64>> {
        let center = region.center();
        let mut seeds = vec![center.clone()];
        if self.system.is_underdetermined() {
            for axis in 0..region.dimension() {
                let quarter = 0.25 * region.width(axis);
                for sign in [-1.0, 1.0] {
                    let mut seed = center.clone();
                    seed[axis] += sign * quarter;
                    seeds.push(seed);
                }
            }
        }
        seeds
    }

    pub fn refine_box(&self, region: &ParameterBox) -> Vec<Refinement> {
        self.seeds(region)
            .iter()
            .map(|seed| self.refine_from(seed, region))
            .collect()
    }

    pub fn refine_from(&self, start: &[f64], region: &ParameterBox) -> Refinement {
        let dim = self.system.dimension();
        let limits = match region.expanded(BOX_MARGIN).intersection(self.system.domain()) {
            Some(limits) => limits,
            None => return Refinement::Diverged,
        };

        let mut state = start.to_vec();
        limits.clamp(&mut state);
        let mut residual = DVector::zeros(self.system.equations());
        self.system.residual(&state, &mut residual);
        let mut residual_norm = residual.norm();
        let mut best = (state.clone(), residual_norm);
        let mut clamped_steps = 0usize;
        let mut last_singular = false;

        for iterations in 0..=self.config.max_newton_steps {
            if !residual_norm.is_finite() {
                return Refinement::Diverged;
            }
            if residual_norm <= self.config.numeric_tol {
                let singular = self.is_singular(&self.system.jacobian(&state));
                return Refinement::Converged {
                    point: state,
                    residual: residual.iter().cloned().collect(),
                    residual_norm,
                    iterations,
                    singular,
                };
            }
            if iterations == self.config.max_newton_steps {
                break;
            }

            let jacobian = self.system.jacobian(&state);
            last_singular = self.is_singular(&jacobian);
            let delta = match least_squares_step(jacobian, &residual) {
                Some(delta) => delta,
                None => break,
            };

            let mut next: Vec<f64> = state.iter().zip(delta.iter()).map(|(x, d)| x - d).collect();
            let before_clamp = next.clone();
            limits.clamp(&mut next);
            if distance(&next, &before_clamp) > 0.0 {
                clamped_steps += 1;
            } else {
                clamped_steps = 0;
            }

            let moved = distance(&next, &state);
            state = next;
            self.system.residual(&state, &mut residual);
            residual_norm = residual.norm();
            if residual_norm < best.1 {
                best = (state.clone(), residual_norm);
            }
            if residual_norm <= self.config.numeric_tol {
                continue;
            }
            let stalled = moved <= f64::EPSILON * (1.0 + l_inf(&state)) * dim as f64;
            if stalled || clamped_steps >= MAX_CLAMPED_STEPS {
                break;
            }
        }

        if last_singular {
            Refinement::Singular {
                point: best.0,
                residual_norm: best.1,
            }
        } else {
            Refinement::Diverged
        }
    }
}

fn l_inf(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

/// Ratio of extreme singular values over the `min(k, n)` meaningful ones.
pub fn condition_number(jacobian: &DMatrix<f64>) -> f64 {
    if jacobian.is_empty() {
        return f64::INFINITY;
    }
    let singular = jacobian.clone().singular_values();
    let max = singular.iter().cloned().fold(0.0, f64::max);
    let min = singular.iter().cloned().fold(f64::INFINITY, f64::min);
    if max == 0.0 || !max.is_finite() {
        f64::INFINITY
    } else if min == 0.0 {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Smallest of the `min(k, n)` singular values.
pub fn smallest_singular_value(jacobian: &DMatrix<f64>) -> f64 {
    if jacobian.is_empty() {
        return 0.0;
    }
    jacobian
        .clone()
        .singular_values()
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min)
}

fn least_squares_step(jacobian: DMatrix<f64>, residual: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = jacobian.svd(true, true);
    let max = svd.singular_values.iter().cloned().fold(0.0, f64::max);
    if max == 0.0 || !max.is_finite() {
        return None;
    }
    let delta = svd.solve(residual, max * 1e-12).ok()?;
    if delta.iter().all(|v| v.is_finite()) {
        Some(delta)
    } else {
        None
    }
}
