//! Tangency detection and handling of non-transversal candidates.

use crate::bound::estimate;
use crate::constraint::ConstraintSystem;
use crate::domain::{distance, ParameterBox};
use crate::refine::{CandidateSolution, NewtonRefiner, Refinement};
use crate::tolerance::{AngularMode, ToleranceConfig};

/// What the subdivision walk should do with one refiner outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept(CandidateSolution),
    /// Keep the candidate and spend extra subdivision around it.
    AcceptAndSubdivide(CandidateSolution),
    Subdivide,
    Discard,
}

pub struct DegeneracyClassifier<'a> {
    system: &'a ConstraintSystem,
    config: &'a ToleranceConfig,
    /// `f = 0, grad f = 0` when the system is a single equation.
    critical: Option<ConstraintSystem>,
}

impl<'a> DegeneracyClassifier<'a> {
    pub fn new(system: &'a ConstraintSystem, config: &'a ToleranceConfig) -> Self {
        Self {
            system,
            config,
            critical: system.critical_system(),
        }
    }

    /// Tangential and failed outcomes get extra subdivision instead of being
    /// merged or dropped.
    fn resubdivides(&self) -> bool {
        self.config.full_search || matches!(self.config.angular, AngularMode::Exhaustive)
    }

    /// `can_subdivide` is false once the exhaustive levels or the depth guard
    /// are used up for the box the outcome came from.
    pub fn classify(&self, outcome: Refinement, can_subdivide: bool) -> Verdict {
        let exhaustive = self.resubdivides();
        match outcome {
            Refinement::Converged {
                point,
                residual,
                residual_norm,
                singular,
                ..
            } => {
                if self.system.excludes_point(&point) {
                    return Verdict::Discard;
                }
                let angle = self.system.tangency_angle(&point);
                let tangent = singular
                    || angle.map_or(false, |a| a < self.config.tangency_threshold());
                let candidate = CandidateSolution {
                    params: point,
                    residual,
                    residual_norm,
                    tangent,
                    angle,
                };
                if tangent && exhaustive && can_subdivide {
                    Verdict::AcceptAndSubdivide(candidate)
                } else {
                    Verdict::Accept(candidate)
                }
            }
            Refinement::Singular { .. } | Refinement::Diverged => {
                if exhaustive && can_subdivide {
                    Verdict::Subdivide
                } else {
                    Verdict::Discard
                }
            }
        }
    }

    /// Singular point of a single equation's zero set inside `region`, such
    /// as a double root or the crossing of two branches. Gradients give no
    /// branch angle there, so the point is found directly from
    /// `f = 0, grad f = 0`. Only tried when every gradient enclosure over the
    /// box contains zero.
    pub fn critical_point(&self, region: &ParameterBox) -> Option<CandidateSolution> {
        let critical = self.critical.as_ref()?;
        let bounds = estimate(critical, region);
        if bounds[1..].iter().any(|b| b.excludes_zero(0.0)) {
            return None;
        }
        let refiner = NewtonRefiner::new(critical, self.config);
        let point = match refiner.refine_from(&region.center(), region) {
            Refinement::Converged { point, .. } if region.contains(&point) => point,
            _ => return None,
        };
        if self.system.excludes_point(&point) {
            return None;
        }
        let residual = self.system.residual_vec(&point);
        let residual_norm = residual.iter().map(|r| r * r).sum::<f64>().sqrt();
        log::trace!("singular point at {point:?}");
        Some(CandidateSolution {
            angle: self.system.tangency_angle(&point),
            params: point,
            residual,
            residual_norm,
            tangent: true,
        })
    }
}

/// Collapses clusters of tangential candidates to their best member. Clusters
/// are built greedily around the lowest-residual candidate and are not
/// transitive, so a tangential curve is thinned rather than collapsed.
/// Transversal candidates pass through untouched.
pub fn merge_tangential(candidates: Vec<CandidateSolution>, radius: f64) -> Vec<CandidateSolution> {
    let (tangent, mut kept): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|c| c.tangent);
    if tangent.is_empty() {
        return kept;
    }

    let mut order: Vec<usize> = (0..tangent.len()).collect();
    order.sort_by(|&a, &b| {
        tangent[a]
            .residual_norm
            .total_cmp(&tangent[b].residual_norm)
            .then_with(|| lex_cmp(&tangent[a].params, &tangent[b].params))
    });

    let mut absorbed = vec![false; tangent.len()];
    let mut representatives = Vec::new();
    for &i in &order {
        if absorbed[i] {
            continue;
        }
        absorbed[i] = true;
        for &j in &order {
            if !absorbed[j] && distance(&tangent[i].params, &tangent[j].params) <= radius {
                absorbed[j] = true;
            }
        }
        representatives.push(i);
    }

    log::trace!(
        "merged {} tangential candidates into {}",
        tangent.len(),
        representatives.len()
    );
    kept.extend(representatives.into_iter().map(|i| tangent[i].clone()));
    kept.sort_by(|a, b| lex_cmp(&a.params, &b.params));
    kept
}

pub(crate) fn lex_cmp(a: &[f64], b: &[f64]) -> std::cmp::Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}
