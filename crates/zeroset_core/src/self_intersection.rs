//! Self-intersections, solved in the doubled parameter space `(a, b)` with
//! the trivial diagonal `a = b` cut out.

use crate::assemble::SolutionComponent;
use crate::constraint::{ConstraintSystem, Exclusion, TangencyMeasure};
use crate::error::Result;
use crate::geometry::PatchMap;
use crate::intersection::{difference_system, map_mode, CoordinateMode};
use crate::solver::{solve_components, SolveOutcome};
use crate::tolerance::ToleranceConfig;

/// The self-intersection system over the doubled domain, keeping only pairs
/// with `a <_lex b` outside a thin diagonal band.
///
/// Curves use the divided difference `(A(a) - A(b)) / (a - b)`, which does
/// not vanish on the diagonal, so crossings arbitrarily close to it survive.
/// Surfaces use `A(a) - A(b)` directly; refinement on the diagonal lands
/// inside the band and is dropped.
pub fn doubled_system(object: &PatchMap) -> Result<ConstraintSystem> {
    let exclusion = Exclusion::diagonal(object.param_dim(), object.domain());
    let system = if object.param_dim() == 1 {
        let quotient = object.divided_difference()?;
        ConstraintSystem::from_patches(quotient.components().to_vec())?
            .with_tangency(TangencyMeasure::Split { at: 1 })?
    } else {
        difference_system(object, object)?
    };
    system.with_exclusion(exclusion)
}

/// Every unordered pair `a != b` with `A(a) = A(b)` is reported once, with
/// `a <_lex b`. Tangential self-contact is handled according to
/// `config.angular` and `config.full_search`.
pub fn self_intersect(
    object: &PatchMap,
    config: &ToleranceConfig,
    mode: CoordinateMode,
) -> Result<SolveOutcome<SolutionComponent>> {
    let system = doubled_system(object)?;
    let outcome = solve_components(&system, config)?;
    log::debug!("{} self-intersection components", outcome.items.len());
    Ok(map_mode(outcome, object, mode))
}
