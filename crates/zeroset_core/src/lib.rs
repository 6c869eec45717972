//! The `zeroset_core` crate finds every solution of a system of polynomial
//! constraints over a parameter box, whether the solutions are isolated points
//! or curves.
//!
//! Key components:
//! - **Patches**: `BernsteinPatch` (tensor-product Bernstein polynomials) and `PatchMap` (curves and surfaces).
//! - **Constraints**: `Constraint`, `ConstraintSystem` with tangency measures and diagonal exclusions.
//! - **Subdivision**: convex-hull pruning with recursive bisection, serial or on rayon.
//! - **Refinement**: Newton iteration with minimum-norm least-squares steps.
//! - **Assembly**: linking refined candidates into points, open arcs and closed loops.
//! - **Queries**: intersections, self-intersections, antipodal pairs, curvature extrema and bisectors.
pub mod analysis;
pub mod antipodal;
pub mod assemble;
pub mod bound;
pub mod constraint;
pub mod degeneracy;
pub mod domain;
pub mod error;
pub mod geometry;
pub mod intersection;
pub mod patch;
pub mod refine;
pub mod self_intersection;
pub mod solver;
pub mod subdivision;
pub mod tolerance;
pub mod traits;

pub use analysis::{curvature_extrema, point_curve_bisector};
pub use antipodal::{antipodal, AntipodalPair};
pub use assemble::{ComponentKind, SolutionComponent};
pub use constraint::{Constraint, ConstraintSystem, Exclusion, TangencyMeasure};
pub use domain::{Interval, ParameterBox};
pub use error::{Result, SolverError};
pub use geometry::PatchMap;
pub use intersection::{intersect, CoordinateMode};
pub use patch::BernsteinPatch;
pub use refine::CandidateSolution;
pub use self_intersection::self_intersect;
pub use solver::{solve, solve_components, solve_system, SolveOutcome, SolveStats};
pub use tolerance::{AngularMode, Budget, ToleranceConfig};
pub use traits::ConstraintFunction;
