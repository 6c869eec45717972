//! Intersections of two parametric objects in a common space.

use crate::assemble::SolutionComponent;
use crate::constraint::{ConstraintSystem, TangencyMeasure};
use crate::error::Result;
use crate::geometry::PatchMap;
use crate::solver::{solve_components, SolveOutcome};
use crate::tolerance::ToleranceConfig;
use serde::{Deserialize, Serialize};

/// Output coordinates of intersection components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateMode {
    /// The joint parameters `(x, y)` of both objects.
    Parametric,
    /// Points in the ambient space, evaluated on the first object.
    Euclidean,
}

/// Lifts `A` and `B` into their joint parameter box and returns the system
/// `A(x) - B(y) = 0`, one equation per space coordinate.
pub fn difference_system(a: &PatchMap, b: &PatchMap) -> Result<ConstraintSystem> {
    let (pa, pb) = (a.param_dim(), b.param_dim());
    let domain = a.domain().product(b.domain());
    let lifted_a = a.embed(&(0..pa).collect::<Vec<_>>(), &domain)?;
    let lifted_b = b.embed(&(pa..pa + pb).collect::<Vec<_>>(), &domain)?;
    let difference = lifted_a.try_sub(&lifted_b)?;
    ConstraintSystem::from_patches(difference.components().to_vec())?
        .with_tangency(TangencyMeasure::Split { at: pa })
}

/// Solves `A(x) = B(y)`. Curve pairs give points; surface pairs in 3-space
/// give curves.
pub fn intersect(
    a: &PatchMap,
    b: &PatchMap,
    config: &ToleranceConfig,
    mode: CoordinateMode,
) -> Result<SolveOutcome<SolutionComponent>> {
    let system = difference_system(a, b)?;
    log::debug!(
        "intersecting {}-parameter and {}-parameter objects in R^{}",
        a.param_dim(),
        b.param_dim(),
        a.space_dim()
    );
    let outcome = solve_components(&system, config)?;
    Ok(map_mode(outcome, a, mode))
}

pub(crate) fn map_mode(
    outcome: SolveOutcome<SolutionComponent>,
    object: &PatchMap,
    mode: CoordinateMode,
) -> SolveOutcome<SolutionComponent> {
    match mode {
        CoordinateMode::Parametric => outcome,
        CoordinateMode::Euclidean => {
            let pa = object.param_dim();
            outcome.map_items(|mut component| {
                component.map_coordinates(|params| object.evaluate(&params[..pa]));
                component
            })
        }
    }
}
