//! Vector-valued Bezier curves and surfaces, one scalar patch per coordinate.

use crate::domain::{Interval, ParameterBox};
use crate::error::{Result, SolverError};
use crate::patch::BernsteinPatch;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A polynomial map from a parameter box into R^d.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMap {
    components: Vec<BernsteinPatch>,
}

impl PatchMap {
    pub fn new(components: Vec<BernsteinPatch>) -> Result<Self> {
        let first = components.first().ok_or(SolverError::EmptySystem)?;
        let dims = first.dimension();
        for (index, c) in components.iter().enumerate().skip(1) {
            if c.dimension() != dims {
                return Err(SolverError::DimensionMismatch {
                    index,
                    expected: dims,
                    found: c.dimension(),
                });
            }
            if !c.domain().approx_eq(first.domain(), 1e-12) {
                return Err(SolverError::DomainMismatch(index));
            }
        }
        Ok(Self { components })
    }

    /// Bezier curve over `[0, 1]` from its control points.
    pub fn curve(control_points: &[Vec<f64>]) -> Result<Self> {
        Self::curve_on(control_points, Interval::new(0.0, 1.0))
    }

    pub fn curve_on(control_points: &[Vec<f64>], domain: Interval) -> Result<Self> {
        let space_dim = uniform_len(control_points)?;
        let components = (0..space_dim)
            .map(|k| {
                BernsteinPatch::univariate(control_points.iter().map(|p| p[k]).collect(), domain)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(components)
    }

    /// Tensor-product Bezier surface over `[0, 1]^2`; `rows[i][j]` is the
    /// control point for `u`-index `i` and `v`-index `j`.
    pub fn surface(rows: &[Vec<Vec<f64>>]) -> Result<Self> {
        Self::surface_on(rows, ParameterBox::unit(2))
    }

    pub fn surface_on(rows: &[Vec<Vec<f64>>], domain: ParameterBox) -> Result<Self> {
        let nu = rows.len();
        let nv = rows.first().map(Vec::len).unwrap_or(0);
        if nu == 0 || nv == 0 || rows.iter().any(|r| r.len() != nv) {
            return Err(SolverError::InvalidPatch(
                "surface control net must be a non-empty rectangle".to_string(),
            ));
        }
        let flat: Vec<Vec<f64>> = rows.iter().flatten().cloned().collect();
        let space_dim = uniform_len(&flat)?;
        let components = (0..space_dim)
            .map(|k| {
                BernsteinPatch::new(
                    vec![nu - 1, nv - 1],
                    flat.iter().map(|p| p[k]).collect(),
                    domain.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(components)
    }

    pub fn param_dim(&self) -> usize {
        self.components[0].dimension()
    }

    pub fn space_dim(&self) -> usize {
        self.components.len()
    }

    pub fn domain(&self) -> &ParameterBox {
        self.components[0].domain()
    }

    pub fn components(&self) -> &[BernsteinPatch] {
        &self.components
    }

    pub fn evaluate(&self, params: &[f64]) -> Vec<f64> {
        self.components.iter().map(|c| c.evaluate(params)).collect()
    }

    /// `space_dim x param_dim` matrix of partial derivatives.
    pub fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.space_dim(), self.param_dim());
        for (i, c) in self.components.iter().enumerate() {
            for j in 0..self.param_dim() {
                jac[(i, j)] = c.derivative(j).evaluate(params);
            }
        }
        jac
    }

    pub fn derivative(&self, axis: usize) -> PatchMap {
        PatchMap {
            components: self.components.iter().map(|c| c.derivative(axis)).collect(),
        }
    }

    /// Lifts every component into a larger parameter space.
    pub fn embed(&self, axis_map: &[usize], domain: &ParameterBox) -> Result<PatchMap> {
        let components = self
            .components
            .iter()
            .map(|c| c.embed(axis_map, domain))
            .collect::<Result<Vec<_>>>()?;
        Ok(PatchMap { components })
    }

    pub fn try_sub(&self, rhs: &PatchMap) -> Result<PatchMap> {
        self.check_space(rhs)?;
        let components = self
            .components
            .iter()
            .zip(&rhs.components)
            .map(|(a, b)| a.try_sub(b))
            .collect::<Result<Vec<_>>>()?;
        Ok(PatchMap { components })
    }

    /// Scalar product `<self, rhs>` as a single patch.
    pub fn dot(&self, rhs: &PatchMap) -> Result<BernsteinPatch> {
        self.check_space(rhs)?;
        let mut acc = self.components[0].try_mul(&rhs.components[0])?;
        for (a, b) in self.components.iter().zip(&rhs.components).skip(1) {
            acc = acc.try_add(&a.try_mul(b)?)?;
        }
        Ok(acc)
    }

    /// Planar cross product `x1 * y2 - y1 * x2`.
    pub fn cross_2d(&self, rhs: &PatchMap) -> Result<BernsteinPatch> {
        if self.space_dim() != 2 || rhs.space_dim() != 2 {
            return Err(SolverError::UnsupportedDimension(self.space_dim()));
        }
        let a = self.components[0].try_mul(&rhs.components[1])?;
        let b = self.components[1].try_mul(&rhs.components[0])?;
        a.try_sub(&b)
    }

    /// For a curve `C`, the map `Q(a, b)` over the doubled domain with
    /// `C(a) - C(b) = (a - b) Q(a, b)`. On the diagonal `Q(a, a) = C'(a)`,
    /// so off-diagonal zeros of `Q` are exactly the self-crossings of a
    /// regular curve.
    pub fn divided_difference(&self) -> Result<PatchMap> {
        if self.param_dim() != 1 {
            return Err(SolverError::UnsupportedDimension(self.param_dim()));
        }
        let domain = self.domain().product(self.domain());
        let m = self.domain().center()[0];
        let u = BernsteinPatch::variable(domain.clone(), 0)?.offset(-m);
        let v = BernsteinPatch::variable(domain.clone(), 1)?.offset(-m);
        let degree = self.components.iter().map(|c| c.degrees()[0]).max().unwrap_or(0);

        // h[k] = sum_{j <= k} u^(k - j) v^j, so (u^(k+1) - v^(k+1)) / (u - v) = h[k].
        let mut h = Vec::with_capacity(degree);
        let mut v_power = BernsteinPatch::constant(domain.clone(), 1.0);
        for _ in 0..degree {
            let next = match h.last() {
                None => v_power.clone(),
                Some(previous) => {
                    v_power = v_power.try_mul(&v)?;
                    u.try_mul(previous)?.try_add(&v_power)?
                }
            };
            h.push(next);
        }

        let mut components = Vec::with_capacity(self.space_dim());
        for component in &self.components {
            let mut quotient = BernsteinPatch::constant(domain.clone(), 0.0);
            let mut derivative = component.derivative(0);
            let mut factorial = 1.0;
            for (k, basis) in h.iter().enumerate().take(component.degrees()[0]) {
                factorial *= (k + 1) as f64;
                let taylor = derivative.evaluate(&[m]) / factorial;
                quotient = quotient.try_add(&basis.scale(taylor))?;
                derivative = derivative.derivative(0);
            }
            components.push(quotient);
        }
        Ok(PatchMap { components })
    }

    fn check_space(&self, rhs: &PatchMap) -> Result<()> {
        if self.space_dim() != rhs.space_dim() {
            return Err(SolverError::DimensionMismatch {
                index: 1,
                expected: self.space_dim(),
                found: rhs.space_dim(),
            });
        }
        Ok(())
    }
}

fn uniform_len(points: &[Vec<f64>]) -> Result<usize> {
    let first = points.first().ok_or_else(|| {
        SolverError::InvalidPatch("at least one control point is required".to_string())
    })?;
    let len = first.len();
    if len == 0 || points.iter().any(|p| p.len() != len) {
        return Err(SolverError::InvalidPatch(
            "control points must share a non-zero dimension".to_string(),
        ));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn curve_evaluates_endpoints() {
        let curve = PatchMap::curve(&[vec![0.0, 0.0], vec![1.0, 2.0], vec![2.0, 0.0]]).unwrap();
        assert_eq!(curve.param_dim(), 1);
        assert_eq!(curve.space_dim(), 2);
        assert_eq!(curve.evaluate(&[0.0]), vec![0.0, 0.0]);
        assert_eq!(curve.evaluate(&[1.0]), vec![2.0, 0.0]);
        let mid = curve.evaluate(&[0.5]);
        assert_relative_eq!(mid[0], 1.0);
        assert_relative_eq!(mid[1], 1.0);
    }

    #[test]
    fn surface_jacobian_of_bilinear_patch() {
        let surface = PatchMap::surface(&[
            vec![vec![0.0, 0.0, 0.0], vec![0.0, 2.0, 0.0]],
            vec![vec![3.0, 0.0, 0.0], vec![3.0, 2.0, 1.0]],
        ])
        .unwrap();
        let jac = surface.jacobian(&[0.5, 0.5]);
        assert_relative_eq!(jac[(0, 0)], 3.0);
        assert_relative_eq!(jac[(1, 1)], 2.0);
        assert_relative_eq!(jac[(2, 0)], 0.5);
        assert_relative_eq!(jac[(2, 1)], 0.5);
    }

    #[test]
    fn ragged_control_points_are_rejected() {
        let err = PatchMap::curve(&[vec![0.0, 0.0], vec![1.0]]).expect_err("ragged");
        assert!(format!("{err}").contains("share a non-zero dimension"));
    }

    #[test]
    fn dot_of_curve_with_itself_is_squared_length() {
        let curve = PatchMap::curve(&[vec![0.0, 1.0], vec![2.0, 1.0]]).unwrap();
        let sq = curve.dot(&curve).unwrap();
        let p = curve.evaluate(&[0.25]);
        assert_relative_eq!(sq.evaluate(&[0.25]), p[0] * p[0] + p[1] * p[1], epsilon = 1e-12);
    }

    #[test]
    fn divided_difference_factors_the_chord() {
        let curve = PatchMap::curve_on(
            &[vec![0.0, 0.0], vec![2.0, 2.0], vec![-1.0, 2.0], vec![1.0, 0.0]],
            Interval::new(-1.0, 2.0),
        )
        .unwrap();
        let quotient = curve.divided_difference().unwrap();
        assert_eq!(quotient.param_dim(), 2);
        assert_eq!(quotient.components()[0].degrees(), &[2, 2]);
        for &(a, b) in &[(-0.7, 1.3), (0.2, 0.9), (1.9, -0.4)] {
            let (ca, cb) = (curve.evaluate(&[a]), curve.evaluate(&[b]));
            let q = quotient.evaluate(&[a, b]);
            for i in 0..2 {
                assert_relative_eq!(ca[i] - cb[i], (a - b) * q[i], epsilon = 1e-10);
            }
        }
        let on_diagonal = quotient.evaluate(&[0.4, 0.4]);
        let tangent = curve.jacobian(&[0.4]);
        assert_relative_eq!(on_diagonal[0], tangent[(0, 0)], epsilon = 1e-10);
        assert_relative_eq!(on_diagonal[1], tangent[(1, 0)], epsilon = 1e-10);
    }

    #[test]
    fn divided_difference_needs_a_curve() {
        let surface = PatchMap::surface(&[
            vec![vec![0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            vec![vec![1.0, 0.0, 0.0], vec![1.0, 1.0, 1.0]],
        ])
        .unwrap();
        assert!(matches!(
            surface.divided_difference(),
            Err(SolverError::UnsupportedDimension(2))
        ));
    }
}
