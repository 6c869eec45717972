//! Scalar tensor-product Bernstein patches over an axis-aligned parameter box.
//!
//! Coefficients are stored flat, last axis fastest. The patch is defined over
//! `domain`; all public evaluation takes global parameter values and maps them
//! to `[0, 1]` per axis internally.

use crate::domain::{Interval, ParameterBox};
use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BernsteinPatch {
    degrees: Vec<usize>,
    coefficients: Vec<f64>,
    domain: ParameterBox,
}

pub(crate) fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    let mut result = 1.0;
    for i in 0..k {
        result = result * (n - i) as f64 / (i + 1) as f64;
    }
    result
}

fn de_casteljau(column: &mut [f64], t: f64) -> f64 {
    let m = column.len();
    let one_minus = 1.0 - t;
    for r in 1..m {
        for i in 0..(m - r) {
            column[i] = column[i] * one_minus + column[i + 1] * t;
        }
    }
    column[0]
}

impl BernsteinPatch {
    pub fn new(degrees: Vec<usize>, coefficients: Vec<f64>, domain: ParameterBox) -> Result<Self> {
        if degrees.is_empty() {
            return Err(SolverError::UnsupportedDimension(0));
        }
        if degrees.len() != domain.dimension() {
            return Err(SolverError::InvalidPatch(format!(
                "{} degrees for a {}-dimensional domain",
                degrees.len(),
                domain.dimension()
            )));
        }
        let expected: usize = degrees.iter().map(|d| d + 1).product();
        if coefficients.len() != expected {
            return Err(SolverError::InvalidPatch(format!(
                "expected {} coefficients for degrees {:?}, got {}",
                expected,
                degrees,
                coefficients.len()
            )));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(SolverError::InvalidPatch(
                "coefficients must be finite".to_string(),
            ));
        }
        Ok(Self {
            degrees,
            coefficients,
            domain,
        })
    }

    /// Univariate patch from its control coefficients.
    pub fn univariate(coefficients: Vec<f64>, domain: Interval) -> Result<Self> {
        let degree = coefficients.len().checked_sub(1).ok_or_else(|| {
            SolverError::InvalidPatch("univariate patch needs a coefficient".to_string())
        })?;
        Self::new(vec![degree], coefficients, ParameterBox::new(vec![domain])?)
    }

    pub fn constant(domain: ParameterBox, value: f64) -> Self {
        Self {
            degrees: vec![0; domain.dimension()],
            coefficients: vec![value],
            domain,
        }
    }

    /// The coordinate function `x_axis` over `domain`.
    pub fn variable(domain: ParameterBox, axis: usize) -> Result<Self> {
        if axis >= domain.dimension() {
            return Err(SolverError::InvalidPatch(format!(
                "axis {axis} out of range for {}-dimensional domain",
                domain.dimension()
            )));
        }
        let mut degrees = vec![0; domain.dimension()];
        degrees[axis] = 1;
        let iv = domain.axis(axis);
        Ok(Self {
            degrees,
            coefficients: vec![iv.lo, iv.hi],
            domain,
        })
    }

    pub fn dimension(&self) -> usize {
        self.degrees.len()
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn domain(&self) -> &ParameterBox {
        &self.domain
    }

    fn shape(&self) -> Vec<usize> {
        self.degrees.iter().map(|d| d + 1).collect()
    }

    /// (outer, length, inner) sizes for iterating fibers along `axis`.
    fn fiber_layout(&self, axis: usize) -> (usize, usize, usize) {
        let shape = self.shape();
        let outer: usize = shape[..axis].iter().product();
        let inner: usize = shape[axis + 1..].iter().product();
        (outer, shape[axis], inner)
    }

    /// Value at global parameters `params`.
    ///
    /// # Panics
    ///
    /// Panics if `params.len()` differs from the patch dimension.
    pub fn evaluate(&self, params: &[f64]) -> f64 {
        assert_eq!(
            params.len(),
            self.dimension(),
            "evaluate needs one parameter per patch axis"
        );
        let shape = self.shape();
        let mut buffer = self.coefficients.clone();
        for axis in 0..self.dimension() {
            let t = self.domain.to_local(axis, params[axis]);
            let m = shape[axis];
            let rest: usize = shape[axis + 1..].iter().product();
            let mut column = vec![0.0; m];
            let mut next = Vec::with_capacity(rest);
            for j in 0..rest {
                for i in 0..m {
                    column[i] = buffer[i * rest + j];
                }
                next.push(de_casteljau(&mut column, t));
            }
            buffer = next;
        }
        buffer[0]
    }

    /// Splits at local parameter `t` in `[0, 1]` along `axis`.
    pub fn split(&self, axis: usize, t: f64) -> (Self, Self) {
        let (outer, m, inner) = self.fiber_layout(axis);
        let one_minus = 1.0 - t;
        let mut left = self.coefficients.clone();
        let mut right = self.coefficients.clone();
        let mut column = vec![0.0; m];
        for o in 0..outer {
            for j in 0..inner {
                let index = |i: usize| o * m * inner + i * inner + j;
                for i in 0..m {
                    column[i] = self.coefficients[index(i)];
                }
                left[index(0)] = column[0];
                right[index(m - 1)] = column[m - 1];
                for r in 1..m {
                    for i in 0..(m - r) {
                        column[i] = column[i] * one_minus + column[i + 1] * t;
                    }
                    left[index(r)] = column[0];
                    right[index(m - 1 - r)] = column[m - 1 - r];
                }
            }
        }

        let iv = self.domain.axis(axis);
        let cut = iv.lo + t * iv.width();
        let mut left_intervals = self.domain.intervals().to_vec();
        let mut right_intervals = left_intervals.clone();
        left_intervals[axis] = Interval { lo: iv.lo, hi: cut };
        right_intervals[axis] = Interval { lo: cut, hi: iv.hi };

        (
            Self {
                degrees: self.degrees.clone(),
                coefficients: left,
                domain: ParameterBox::new(left_intervals).unwrap_or_else(|_| self.domain.clone()),
            },
            Self {
                degrees: self.degrees.clone(),
                coefficients: right,
                domain: ParameterBox::new(right_intervals).unwrap_or_else(|_| self.domain.clone()),
            },
        )
    }

    pub fn bisect(&self, axis: usize) -> (Self, Self) {
        self.split(axis, 0.5)
    }

    /// Re-expresses the patch over a sub-box of its domain.
    pub fn restrict(&self, region: &ParameterBox) -> Result<Self> {
        if region.dimension() != self.dimension() {
            return Err(SolverError::DimensionMismatch {
                index: 0,
                expected: self.dimension(),
                found: region.dimension(),
            });
        }
        let target = self.domain.intersection(region).ok_or_else(|| {
            SolverError::InvalidDomain("restriction region lies outside the patch".to_string())
        })?;
        let mut patch = self.clone();
        for axis in 0..self.dimension() {
            let want = target.axis(axis);
            let have = patch.domain.axis(axis);
            if want.lo > have.lo && have.width() > 0.0 {
                let t = (want.lo - have.lo) / have.width();
                patch = patch.split(axis, t).1;
            }
            let have = patch.domain.axis(axis);
            if want.hi < have.hi && have.width() > 0.0 {
                let t = (want.hi - have.lo) / have.width();
                patch = patch.split(axis, t).0;
            }
        }
        Ok(patch)
    }

    /// Partial derivative along `axis`, in global parameter units.
    pub fn derivative(&self, axis: usize) -> Self {
        let degree = self.degrees[axis];
        let width = self.domain.width(axis);
        if degree == 0 || width == 0.0 {
            let mut degrees = self.degrees.clone();
            degrees[axis] = 0;
            let len: usize = degrees.iter().map(|d| d + 1).product();
            return Self {
                degrees,
                coefficients: vec![0.0; len],
                domain: self.domain.clone(),
            };
        }
        let (outer, m, inner) = self.fiber_layout(axis);
        let scale = degree as f64 / width;
        let mut coefficients = Vec::with_capacity(outer * (m - 1) * inner);
        for o in 0..outer {
            for i in 0..(m - 1) {
                for j in 0..inner {
                    let a = self.coefficients[o * m * inner + i * inner + j];
                    let b = self.coefficients[o * m * inner + (i + 1) * inner + j];
                    coefficients.push((b - a) * scale);
                }
            }
        }
        let mut degrees = self.degrees.clone();
        degrees[axis] = degree - 1;
        Self {
            degrees,
            coefficients,
            domain: self.domain.clone(),
        }
    }

    /// Raises the degree along `axis` by `r` without changing the function.
    pub fn elevate(&self, axis: usize, r: usize) -> Self {
        if r == 0 {
            return self.clone();
        }
        let d = self.degrees[axis];
        let (outer, m, inner) = self.fiber_layout(axis);
        let new_m = m + r;
        let mut coefficients = vec![0.0; outer * new_m * inner];
        for o in 0..outer {
            for j in 0..inner {
                for k in 0..new_m {
                    let lo = k.saturating_sub(r);
                    let hi = k.min(d);
                    let mut acc = 0.0;
                    for i in lo..=hi {
                        let w = binomial(d, i) * binomial(r, k - i) / binomial(d + r, k);
                        acc = acc + self.coefficients[o * m * inner + i * inner + j] * w;
                    }
                    coefficients[o * new_m * inner + k * inner + j] = acc;
                }
            }
        }
        let mut degrees = self.degrees.clone();
        degrees[axis] = d + r;
        Self {
            degrees,
            coefficients,
            domain: self.domain.clone(),
        }
    }

    fn check_compatible(&self, rhs: &Self) -> Result<()> {
        if self.dimension() != rhs.dimension() {
            return Err(SolverError::DimensionMismatch {
                index: 1,
                expected: self.dimension(),
                found: rhs.dimension(),
            });
        }
        let tol = 1e-12 * (1.0 + self.domain.max_width());
        if !self.domain.approx_eq(&rhs.domain, tol) {
            return Err(SolverError::DomainMismatch(1));
        }
        Ok(())
    }

    fn elevated_to(&self, degrees: &[usize]) -> Self {
        let mut patch = self.clone();
        for (axis, &target) in degrees.iter().enumerate() {
            patch = patch.elevate(axis, target - patch.degrees[axis]);
        }
        patch
    }

    fn combine(&self, rhs: &Self, op: impl Fn(f64, f64) -> f64) -> Result<Self> {
        self.check_compatible(rhs)?;
        let degrees: Vec<usize> = self
            .degrees
            .iter()
            .zip(&rhs.degrees)
            .map(|(a, b)| *a.max(b))
            .collect();
        let a = self.elevated_to(&degrees);
        let b = rhs.elevated_to(&degrees);
        let coefficients = a
            .coefficients
            .iter()
            .zip(&b.coefficients)
            .map(|(x, y)| op(*x, *y))
            .collect();
        Ok(Self {
            degrees,
            coefficients,
            domain: self.domain.clone(),
        })
    }

    pub fn try_add(&self, rhs: &Self) -> Result<Self> {
        self.combine(rhs, |a, b| a + b)
    }

    pub fn try_sub(&self, rhs: &Self) -> Result<Self> {
        self.combine(rhs, |a, b| a - b)
    }

    /// Product of two patches over the same domain.
    pub fn try_mul(&self, rhs: &Self) -> Result<Self> {
        self.check_compatible(rhs)?;
        let degrees: Vec<usize> = self
            .degrees
            .iter()
            .zip(&rhs.degrees)
            .map(|(a, b)| a + b)
            .collect();
        let out_shape: Vec<usize> = degrees.iter().map(|d| d + 1).collect();
        let mut coefficients = vec![0.0; out_shape.iter().product()];

        let a_shape = self.shape();
        let b_shape = rhs.shape();
        for (ia, &ca) in self.coefficients.iter().enumerate() {
            let a_idx = unravel(ia, &a_shape);
            for (ib, &cb) in rhs.coefficients.iter().enumerate() {
                let b_idx = unravel(ib, &b_shape);
                let mut weight = 1.0;
                let mut flat = 0;
                for axis in 0..degrees.len() {
                    let (da, db) = (self.degrees[axis], rhs.degrees[axis]);
                    let (i, j) = (a_idx[axis], b_idx[axis]);
                    weight *= binomial(da, i) * binomial(db, j) / binomial(da + db, i + j);
                    flat = flat * out_shape[axis] + i + j;
                }
                coefficients[flat] = coefficients[flat] + ca * cb * weight;
            }
        }
        Ok(Self {
            degrees,
            coefficients,
            domain: self.domain.clone(),
        })
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self {
            degrees: self.degrees.clone(),
            coefficients: self.coefficients.iter().map(|c| *c * factor).collect(),
            domain: self.domain.clone(),
        }
    }

    /// Adds a constant; Bernstein bases sum to one.
    pub fn offset(&self, value: f64) -> Self {
        Self {
            degrees: self.degrees.clone(),
            coefficients: self.coefficients.iter().map(|c| *c + value).collect(),
            domain: self.domain.clone(),
        }
    }

    /// Lifts the patch into a larger parameter space. Source axis `i` becomes
    /// target axis `axis_map[i]`; every other target axis gets degree zero.
    pub fn embed(&self, axis_map: &[usize], domain: &ParameterBox) -> Result<Self> {
        if axis_map.len() != self.dimension() {
            return Err(SolverError::InvalidPatch(format!(
                "axis map has {} entries for a {}-dimensional patch",
                axis_map.len(),
                self.dimension()
            )));
        }
        let total = domain.dimension();
        let mut degrees = vec![0; total];
        let mut used = vec![false; total];
        for (source, &target) in axis_map.iter().enumerate() {
            if target >= total || used[target] {
                return Err(SolverError::InvalidPatch(format!(
                    "axis map entry {target} is out of range or repeated"
                )));
            }
            let want = self.domain.axis(source);
            let have = domain.axis(target);
            let tol = 1e-12 * (1.0 + want.width());
            if (want.lo - have.lo).abs() > tol || (want.hi - have.hi).abs() > tol {
                return Err(SolverError::DomainMismatch(source));
            }
            used[target] = true;
            degrees[target] = self.degrees[source];
        }
        let out_shape: Vec<usize> = degrees.iter().map(|d| d + 1).collect();
        let src_shape = self.shape();
        let mut coefficients = vec![0.0; out_shape.iter().product()];
        for (flat, &c) in self.coefficients.iter().enumerate() {
            let src = unravel(flat, &src_shape);
            let mut target_idx = vec![0; total];
            for (source, &target) in axis_map.iter().enumerate() {
                target_idx[target] = src[source];
            }
            coefficients[ravel(&target_idx, &out_shape)] = c;
        }
        Ok(Self {
            degrees,
            coefficients,
            domain: domain.clone(),
        })
    }

    /// Interval hull of the coefficients, which encloses the patch's range.
    pub fn bound(&self) -> Interval {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for c in &self.coefficients {
            let v = *c;
            lo = lo.min(v);
            hi = hi.max(v);
        }
        Interval { lo, hi }
    }

    /// Largest coefficient range along `axis` over all fibers.
    pub fn spread(&self, axis: usize) -> f64 {
        let (outer, m, inner) = self.fiber_layout(axis);
        if m < 2 {
            return 0.0;
        }
        let mut best = 0.0f64;
        for o in 0..outer {
            for j in 0..inner {
                let mut lo = f64::INFINITY;
                let mut hi = f64::NEG_INFINITY;
                for i in 0..m {
                    let v = self.coefficients[o * m * inner + i * inner + j];
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
                best = best.max(hi - lo);
            }
        }
        best
    }

    pub fn max_abs(&self) -> f64 {
        self.coefficients
            .iter()
            .map(|c| c.abs())
            .fold(0.0, f64::max)
    }
}

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for axis in (0..shape.len()).rev() {
        index[axis] = flat % shape[axis];
        flat /= shape[axis];
    }
    index
}

fn ravel(index: &[usize], shape: &[usize]) -> usize {
    index
        .iter()
        .zip(shape)
        .fold(0, |acc, (i, s)| acc * s + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> ParameterBox {
        ParameterBox::unit(2)
    }

    fn circle_patch(domain: ParameterBox) -> BernsteinPatch {
        let x = BernsteinPatch::variable(domain.clone(), 0).unwrap();
        let y = BernsteinPatch::variable(domain, 1).unwrap();
        x.try_mul(&x)
            .unwrap()
            .try_add(&y.try_mul(&y).unwrap())
            .unwrap()
            .offset(-0.25)
    }

    #[test]
    fn new_rejects_wrong_coefficient_count() {
        let err = BernsteinPatch::new(vec![2, 1], vec![0.0; 5], unit_square())
            .expect_err("shape mismatch");
        assert!(format!("{err}").contains("expected 6 coefficients"));
    }

    #[test]
    fn evaluate_matches_polynomial() {
        let domain = ParameterBox::from_bounds(&[(-1.0, 1.0), (-2.0, 0.5)]).unwrap();
        let patch = circle_patch(domain);
        for &(x, y) in &[(0.0, 0.0), (0.5, -0.5), (-1.0, 0.5), (0.3, -1.7)] {
            assert_relative_eq!(
                patch.evaluate(&[x, y]),
                x * x + y * y - 0.25,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    #[should_panic(expected = "one parameter per patch axis")]
    fn evaluate_rejects_short_parameter_slices() {
        circle_patch(unit_square()).evaluate(&[0.5]);
    }

    #[test]
    fn split_preserves_values() {
        let patch = circle_patch(unit_square());
        let (left, right) = patch.split(0, 0.3);
        assert_relative_eq!(left.domain().axis(0).hi, 0.3);
        assert_relative_eq!(right.domain().axis(0).lo, 0.3);
        for &(x, y) in &[(0.1, 0.2), (0.29, 0.9)] {
            assert_relative_eq!(left.evaluate(&[x, y]), patch.evaluate(&[x, y]), epsilon = 1e-12);
        }
        for &(x, y) in &[(0.31, 0.2), (0.99, 0.5)] {
            assert_relative_eq!(right.evaluate(&[x, y]), patch.evaluate(&[x, y]), epsilon = 1e-12);
        }
    }

    #[test]
    fn restrict_tightens_bound() {
        let patch = circle_patch(ParameterBox::from_bounds(&[(-1.0, 1.0), (-1.0, 1.0)]).unwrap());
        let region = ParameterBox::from_bounds(&[(0.6, 0.8), (0.6, 0.8)]).unwrap();
        let sub = patch.restrict(&region).unwrap();
        let bound = sub.bound();
        assert!(bound.lo >= 0.72 - 0.25 - 1e-12);
        assert!(bound.hi <= 1.28 - 0.25 + 1e-12);
        assert!(bound.excludes_zero(0.0));
        assert!(!patch.bound().excludes_zero(0.0));
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let domain = ParameterBox::from_bounds(&[(-1.0, 2.0), (0.0, 3.0)]).unwrap();
        let patch = circle_patch(domain);
        let dx = patch.derivative(0);
        let dy = patch.derivative(1);
        let (x, y) = (0.4, 1.1);
        assert_relative_eq!(dx.evaluate(&[x, y]), 2.0 * x, epsilon = 1e-12);
        assert_relative_eq!(dy.evaluate(&[x, y]), 2.0 * y, epsilon = 1e-12);
        assert_eq!(dx.degrees(), &[1, 2]);
    }

    #[test]
    fn elevate_keeps_function() {
        let patch = circle_patch(unit_square());
        let raised = patch.elevate(1, 3);
        assert_eq!(raised.degrees(), &[2, 5]);
        assert_relative_eq!(raised.evaluate(&[0.2, 0.7]), patch.evaluate(&[0.2, 0.7]), epsilon = 1e-12);
    }

    #[test]
    fn embed_ignores_new_axes() {
        let curve = BernsteinPatch::univariate(vec![0.0, 2.0, 1.0], Interval::new(0.0, 1.0)).unwrap();
        let domain = ParameterBox::unit(3);
        let lifted = curve.embed(&[2], &domain).unwrap();
        assert_eq!(lifted.degrees(), &[0, 0, 2]);
        assert_relative_eq!(lifted.evaluate(&[0.9, 0.1, 0.5]), curve.evaluate(&[0.5]));
    }

    #[test]
    fn mul_rejects_mismatched_domains() {
        let a = BernsteinPatch::constant(ParameterBox::unit(1), 1.0);
        let b = BernsteinPatch::constant(ParameterBox::from_bounds(&[(0.0, 2.0)]).unwrap(), 1.0);
        assert!(matches!(a.try_mul(&b), Err(SolverError::DomainMismatch(_))));
    }

    #[test]
    fn spread_is_zero_for_constant_axis() {
        let domain = unit_square();
        let x = BernsteinPatch::variable(domain, 0).unwrap();
        assert_eq!(x.spread(1), 0.0);
        assert_relative_eq!(x.spread(0), 1.0);
    }
}
