//! Constraint functions and the systems the solver works on.

use crate::domain::{Interval, ParameterBox};
use crate::error::{Result, SolverError};
use crate::patch::BernsteinPatch;
use crate::traits::ConstraintFunction;
use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A scalar constraint, tagged by how many parameters it depends on.
#[derive(Debug, Clone)]
pub enum Constraint {
    Curve(Arc<BernsteinPatch>),
    Surface(Arc<BernsteinPatch>),
    Trivariate(Arc<BernsteinPatch>),
    Multivariate(Arc<BernsteinPatch>),
}

impl Constraint {
    pub fn from_patch(patch: BernsteinPatch) -> Self {
        Self::from_shared(Arc::new(patch))
    }

    pub fn from_shared(patch: Arc<BernsteinPatch>) -> Self {
        match patch.dimension() {
            1 => Constraint::Curve(patch),
            2 => Constraint::Surface(patch),
            3 => Constraint::Trivariate(patch),
            _ => Constraint::Multivariate(patch),
        }
    }

    pub fn patch(&self) -> &Arc<BernsteinPatch> {
        match self {
            Constraint::Curve(p)
            | Constraint::Surface(p)
            | Constraint::Trivariate(p)
            | Constraint::Multivariate(p) => p,
        }
    }
}

impl ConstraintFunction for Constraint {
    fn dimension(&self) -> usize {
        self.patch().dimension()
    }

    fn domain(&self) -> &ParameterBox {
        self.patch().domain()
    }

    fn evaluate(&self, params: &[f64]) -> f64 {
        self.patch().evaluate(params)
    }

    fn bound(&self, region: &ParameterBox) -> Interval {
        match self.patch().restrict(region) {
            Ok(sub) => sub.bound(),
            Err(_) => self.patch().bound(),
        }
    }

    fn derive(&self, axis: usize) -> Self {
        Constraint::from_patch(self.patch().derivative(axis))
    }
}

/// How the angle between solution branches is measured at a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TangencyMeasure {
    /// Smallest angle between any two constraint gradients.
    Gradients,
    /// System of the form `A(x) - B(y) = 0` with `x = params[..at]`; compares
    /// tangents (curves) or normals (surfaces) of `A` and `B`.
    Split { at: usize },
}

/// Width of the band around `a = b` cut from a doubled parameter space,
/// relative to the widest side of the undoubled domain.
pub const DIAGONAL_BAND: f64 = 1e-6;

/// Parameter regions removed from a doubled parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Exclusion {
    /// Parameters are `(a, b)` with `a = params[..split]`, `b = params[split..]`.
    /// Keeps only pairs with `a <_lex b`, where coordinates closer than `gap`
    /// compare equal. Pairs with `|a - b|_inf < gap` are dropped as diagonal.
    Diagonal { split: usize, gap: f64 },
}

impl Exclusion {
    /// Diagonal exclusion for an object over `domain`, with a band of
    /// `DIAGONAL_BAND` times the domain's widest side.
    pub fn diagonal(split: usize, domain: &ParameterBox) -> Self {
        Exclusion::Diagonal {
            split,
            gap: DIAGONAL_BAND * domain.max_width(),
        }
    }

    /// True only when every point of `region` is excluded: the box lies in
    /// the diagonal band or provably above it in lexicographic order.
    pub fn excludes_box(&self, region: &ParameterBox) -> bool {
        match *self {
            Exclusion::Diagonal { split, gap } => {
                for i in 0..split {
                    let diff = region.axis(i).minus(&region.axis(split + i));
                    if diff.lo >= gap {
                        return true;
                    }
                    if diff.lo <= -gap || diff.hi >= gap {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// Slices shorter than the doubled dimension are never excluded.
    pub fn excludes_point(&self, point: &[f64]) -> bool {
        match *self {
            Exclusion::Diagonal { split, gap } => {
                if point.len() < 2 * split {
                    return false;
                }
                for i in 0..split {
                    let diff = point[i] - point[split + i];
                    if diff.abs() >= gap {
                        return diff > 0.0;
                    }
                }
                true
            }
        }
    }
}

/// `k` constraint functions over a shared `n`-dimensional parameter box.
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    constraints: Vec<Constraint>,
    jacobian: Vec<Vec<Constraint>>,
    domain: ParameterBox,
    tangency: TangencyMeasure,
    exclusion: Option<Exclusion>,
    /// Largest control coefficient over all constraints.
    scale: f64,
}

impl ConstraintSystem {
    pub fn new(constraints: Vec<Constraint>) -> Result<Self> {
        let first = constraints.first().ok_or(SolverError::EmptySystem)?;
        let dim = first.dimension();
        let domain = first.domain().clone();
        for (index, c) in constraints.iter().enumerate().skip(1) {
            if c.dimension() != dim {
                return Err(SolverError::DimensionMismatch {
                    index,
                    expected: dim,
                    found: c.dimension(),
                });
            }
            let tol = 1e-12 * (1.0 + domain.max_width());
            if !c.domain().approx_eq(&domain, tol) {
                return Err(SolverError::DomainMismatch(index));
            }
        }
        let jacobian = constraints
            .iter()
            .map(|c| (0..dim).map(|j| c.derive(j)).collect())
            .collect();
        let scale = constraints
            .iter()
            .map(|c| c.patch().max_abs())
            .fold(0.0, f64::max);
        Ok(Self {
            constraints,
            jacobian,
            domain,
            tangency: TangencyMeasure::Gradients,
            exclusion: None,
            scale,
        })
    }

    pub fn from_patches(patches: Vec<BernsteinPatch>) -> Result<Self> {
        Self::new(patches.into_iter().map(Constraint::from_patch).collect())
    }

    pub fn with_tangency(mut self, tangency: TangencyMeasure) -> Result<Self> {
        if let TangencyMeasure::Split { at } = tangency {
            if at == 0 || at >= self.dimension() {
                return Err(SolverError::InvalidDomain(format!(
                    "tangency split {at} must lie strictly inside {} parameters",
                    self.dimension()
                )));
            }
        }
        self.tangency = tangency;
        Ok(self)
    }

    pub fn with_exclusion(mut self, exclusion: Exclusion) -> Result<Self> {
        let Exclusion::Diagonal { split, gap } = exclusion;
        if split == 0 || 2 * split != self.dimension() {
            return Err(SolverError::DimensionMismatch {
                index: 0,
                expected: 2 * split,
                found: self.dimension(),
            });
        }
        if !(gap >= 0.0) || !gap.is_finite() {
            return Err(SolverError::InvalidTolerance(format!(
                "diagonal gap must be finite and non-negative, got {gap}"
            )));
        }
        self.exclusion = Some(exclusion);
        Ok(self)
    }

    /// Number of constraint equations (k).
    pub fn equations(&self) -> usize {
        self.constraints.len()
    }

    /// Number of parameters (n).
    pub fn dimension(&self) -> usize {
        self.domain.dimension()
    }

    pub fn is_underdetermined(&self) -> bool {
        self.equations() < self.dimension()
    }

    pub fn domain(&self) -> &ParameterBox {
        &self.domain
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn exclusion(&self) -> Option<&Exclusion> {
        self.exclusion.as_ref()
    }

    /// Smallest Jacobian singular value that still counts as regular at a
    /// point whose residual is `numeric_tol`. Near a double root the gradient
    /// only shrinks to about `sqrt(numeric_tol * scale) / width`.
    pub fn singularity_floor(&self, numeric_tol: f64) -> f64 {
        let width = self.domain.max_width();
        if width > 0.0 {
            8.0 * (numeric_tol * self.scale).sqrt() / width
        } else {
            0.0
        }
    }

    /// For a single equation `f`, the system `f = 0, grad f = 0`. Its roots
    /// are the singular points of the zero set of `f`.
    pub fn critical_system(&self) -> Option<ConstraintSystem> {
        if self.equations() != 1 {
            return None;
        }
        let mut constraints = self.constraints.clone();
        constraints.extend(self.jacobian[0].iter().cloned());
        let mut critical = ConstraintSystem::new(constraints).ok()?;
        critical.exclusion = self.exclusion;
        Some(critical)
    }

    pub fn residual(&self, params: &[f64], out: &mut DVector<f64>) {
        for (i, c) in self.constraints.iter().enumerate() {
            out[i] = c.evaluate(params);
        }
    }

    pub fn residual_vec(&self, params: &[f64]) -> Vec<f64> {
        self.constraints.iter().map(|c| c.evaluate(params)).collect()
    }

    /// `k x n` matrix of partial derivatives.
    pub fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.equations(), self.dimension());
        for (i, row) in self.jacobian.iter().enumerate() {
            for (j, d) in row.iter().enumerate() {
                jac[(i, j)] = d.evaluate(params);
            }
        }
        jac
    }

    pub fn excludes_box(&self, region: &ParameterBox) -> bool {
        self.exclusion
            .map(|e| e.excludes_box(region))
            .unwrap_or(false)
    }

    pub fn excludes_point(&self, point: &[f64]) -> bool {
        self.exclusion
            .map(|e| e.excludes_point(point))
            .unwrap_or(false)
    }

    /// Angle in degrees between the solution branches meeting at `params`,
    /// or `None` when the measure is undefined for this system.
    pub fn tangency_angle(&self, params: &[f64]) -> Option<f64> {
        let jac = self.jacobian(params);
        match self.tangency {
            TangencyMeasure::Gradients => gradient_angle(&jac),
            TangencyMeasure::Split { at } => split_angle(&jac, at),
        }
    }
}

fn unsigned_angle(a: &DVector<f64>, b: &DVector<f64>) -> Option<f64> {
    let (na, nb) = (a.norm(), b.norm());
    if na == 0.0 || nb == 0.0 {
        return Some(0.0);
    }
    let cos = (a.dot(b) / (na * nb)).abs().min(1.0);
    Some(cos.acos().to_degrees())
}

fn gradient_angle(jac: &DMatrix<f64>) -> Option<f64> {
    if jac.nrows() < 2 {
        return None;
    }
    let rows: Vec<DVector<f64>> = (0..jac.nrows())
        .map(|i| jac.row(i).transpose().into_owned())
        .collect();
    let mut best: Option<f64> = None;
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            if let Some(angle) = unsigned_angle(&rows[i], &rows[j]) {
                best = Some(best.map_or(angle, |b: f64| b.min(angle)));
            }
        }
    }
    best
}

fn normal(cols: &DMatrix<f64>) -> DVector<f64> {
    let a = Vector3::new(cols[(0, 0)], cols[(1, 0)], cols[(2, 0)]);
    let b = Vector3::new(cols[(0, 1)], cols[(1, 1)], cols[(2, 1)]);
    let n = a.cross(&b);
    DVector::from_column_slice(n.as_slice())
}

fn split_angle(jac: &DMatrix<f64>, at: usize) -> Option<f64> {
    let space = jac.nrows();
    let n = jac.ncols();
    let a = jac.columns(0, at).into_owned();
    let b = jac.columns(at, n - at).into_owned();
    match (a.ncols(), b.ncols(), space) {
        (1, 1, _) => unsigned_angle(&a.column(0).into_owned(), &b.column(0).into_owned()),
        (2, 2, 3) => unsigned_angle(&normal(&a), &normal(&b)),
        (1, 2, 3) => unsigned_angle(&a.column(0).into_owned(), &normal(&b)).map(|t| 90.0 - t),
        (2, 1, 3) => unsigned_angle(&b.column(0).into_owned(), &normal(&a)).map(|t| 90.0 - t),
        _ => None,
    }
}
