//! Differential-geometric queries reduced to polynomial systems.

use crate::assemble::SolutionComponent;
use crate::constraint::ConstraintSystem;
use crate::domain::ParameterBox;
use crate::error::{Result, SolverError};
use crate::geometry::PatchMap;
use crate::patch::BernsteinPatch;
use crate::refine::CandidateSolution;
use crate::solver::{solve, solve_components, SolveOutcome};
use crate::tolerance::ToleranceConfig;

/// Numerator of the derivative of signed curvature of a planar curve:
/// `(x'y''' - y'x''')(x'^2 + y'^2) - 3(x'y'' - y'x'')(x'x'' + y'y'')`.
pub fn curvature_derivative_numerator(curve: &PatchMap) -> Result<BernsteinPatch> {
    if curve.param_dim() != 1 {
        return Err(SolverError::UnsupportedDimension(curve.param_dim()));
    }
    if curve.space_dim() != 2 {
        return Err(SolverError::UnsupportedDimension(curve.space_dim()));
    }
    let d1 = curve.derivative(0);
    let d2 = d1.derivative(0);
    let d3 = d2.derivative(0);
    let first = d1.cross_2d(&d3)?.try_mul(&d1.dot(&d1)?)?;
    let second = d1.cross_2d(&d2)?.try_mul(&d1.dot(&d2)?)?;
    first.try_sub(&second.scale(3.0))
}

/// Parameters where the curvature of a planar curve is extremal.
pub fn curvature_extrema(
    curve: &PatchMap,
    config: &ToleranceConfig,
) -> Result<SolveOutcome<CandidateSolution>> {
    let numerator = curvature_derivative_numerator(curve)?;
    let system = ConstraintSystem::from_patches(vec![numerator])?;
    solve(&system, config)
}

/// Points `X` in `region` equidistant from `point` and `curve`, with the
/// curve distance realised at a foot point. Solved in `(x, y, t)`:
///
/// ```text
/// |X - P|^2 - |X - C(t)|^2 = 0
/// (X - C(t)) . C'(t)      = 0
/// ```
///
/// Component coordinates are the `(x, y)` points of the bisector.
pub fn point_curve_bisector(
    point: [f64; 2],
    curve: &PatchMap,
    region: &ParameterBox,
    config: &ToleranceConfig,
) -> Result<SolveOutcome<SolutionComponent>> {
    if curve.param_dim() != 1 || curve.space_dim() != 2 {
        return Err(SolverError::UnsupportedDimension(curve.space_dim()));
    }
    if region.dimension() != 2 {
        return Err(SolverError::DimensionMismatch {
            index: 0,
            expected: 2,
            found: region.dimension(),
        });
    }

    let domain = region.product(curve.domain());
    let x = BernsteinPatch::variable(domain.clone(), 0)?;
    let y = BernsteinPatch::variable(domain.clone(), 1)?;
    let position = PatchMap::new(vec![x.clone(), y.clone()])?;
    let to_point = PatchMap::new(vec![x.offset(-point[0]), y.offset(-point[1])])?;
    let foot = curve.embed(&[2], &domain)?;
    let to_foot = position.try_sub(&foot)?;

    let equidistant = to_point.dot(&to_point)?.try_sub(&to_foot.dot(&to_foot)?)?;
    let orthogonal = to_foot.dot(&foot.derivative(2))?;
    let system = ConstraintSystem::from_patches(vec![equidistant, orthogonal])?;

    let outcome = solve_components(&system, config)?;
    Ok(outcome.map_items(|mut component| {
        component.map_coordinates(|params| params[..2].to_vec());
        component
    }))
}
