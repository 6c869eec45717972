//! Intervals and axis-aligned parameter boxes.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};

/// A closed interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi, "lo ({lo}) > hi ({hi})");
        Self { lo, hi }
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.lo + self.hi)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lo && value <= self.hi
    }

    /// True when zero lies strictly outside the interval widened by `slack`.
    pub fn excludes_zero(&self, slack: f64) -> bool {
        self.lo > slack || self.hi < -slack
    }

    /// Interval of `a - b` for `a` in `self`, `b` in `other`.
    pub fn minus(&self, other: &Interval) -> Interval {
        Interval::new(self.lo - other.hi, self.hi - other.lo)
    }
}

/// An n-dimensional axis-aligned box, one interval per parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBox {
    intervals: Vec<Interval>,
}

impl ParameterBox {
    pub fn new(intervals: Vec<Interval>) -> Result<Self> {
        if intervals.is_empty() {
            return Err(SolverError::UnsupportedDimension(0));
        }
        for (axis, iv) in intervals.iter().enumerate() {
            if !iv.lo.is_finite() || !iv.hi.is_finite() || iv.lo > iv.hi {
                return Err(SolverError::InvalidDomain(format!(
                    "axis {axis} has invalid range [{}, {}]",
                    iv.lo, iv.hi
                )));
            }
        }
        Ok(Self { intervals })
    }

    /// Builds a box from `(lo, hi)` pairs.
    pub fn from_bounds(bounds: &[(f64, f64)]) -> Result<Self> {
        let mut intervals = Vec::with_capacity(bounds.len());
        for &(lo, hi) in bounds {
            if !(lo <= hi) {
                return Err(SolverError::InvalidDomain(format!(
                    "range [{lo}, {hi}] is reversed or NaN"
                )));
            }
            intervals.push(Interval { lo, hi });
        }
        Self::new(intervals)
    }

    /// The unit box `[0, 1]^dims`.
    pub fn unit(dims: usize) -> Self {
        Self {
            intervals: vec![Interval { lo: 0.0, hi: 1.0 }; dims.max(1)],
        }
    }

    pub fn dimension(&self) -> usize {
        self.intervals.len()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn axis(&self, axis: usize) -> Interval {
        self.intervals[axis]
    }

    pub fn width(&self, axis: usize) -> f64 {
        self.intervals[axis].width()
    }

    pub fn max_width(&self) -> f64 {
        self.intervals
            .iter()
            .map(Interval::width)
            .fold(0.0, f64::max)
    }

    pub fn center(&self) -> Vec<f64> {
        self.intervals.iter().map(Interval::midpoint).collect()
    }

    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.intervals.len()
            && self
                .intervals
                .iter()
                .zip(point)
                .all(|(iv, &p)| iv.contains(p))
    }

    /// Box widened by `fraction` of its width on every side.
    pub fn expanded(&self, fraction: f64) -> ParameterBox {
        let intervals = self
            .intervals
            .iter()
            .map(|iv| {
                let pad = iv.width() * fraction;
                Interval::new(iv.lo - pad, iv.hi + pad)
            })
            .collect();
        ParameterBox { intervals }
    }

    pub fn intersection(&self, other: &ParameterBox) -> Option<ParameterBox> {
        let mut intervals = Vec::with_capacity(self.intervals.len());
        for (a, b) in self.intervals.iter().zip(&other.intervals) {
            let lo = a.lo.max(b.lo);
            let hi = a.hi.min(b.hi);
            if lo > hi {
                return None;
            }
            intervals.push(Interval { lo, hi });
        }
        Some(ParameterBox { intervals })
    }

    /// Clamps `point` into the box in place.
    pub fn clamp(&self, point: &mut [f64]) {
        for (p, iv) in point.iter_mut().zip(&self.intervals) {
            *p = p.clamp(iv.lo, iv.hi);
        }
    }

    /// Splits the box at the midpoint of `axis`.
    pub fn bisect(&self, axis: usize) -> (ParameterBox, ParameterBox) {
        let mid = self.intervals[axis].midpoint();
        let mut left = self.clone();
        let mut right = self.clone();
        left.intervals[axis].hi = mid;
        right.intervals[axis].lo = mid;
        (left, right)
    }

    /// Maps a global coordinate on `axis` to `[0, 1]`.
    pub fn to_local(&self, axis: usize, value: f64) -> f64 {
        let iv = self.intervals[axis];
        let width = iv.width();
        if width == 0.0 {
            0.0
        } else {
            (value - iv.lo) / width
        }
    }

    /// Concatenates two boxes into one over the product space.
    pub fn product(&self, other: &ParameterBox) -> ParameterBox {
        let mut intervals = self.intervals.clone();
        intervals.extend_from_slice(&other.intervals);
        ParameterBox { intervals }
    }

    pub fn approx_eq(&self, other: &ParameterBox, tol: f64) -> bool {
        self.intervals.len() == other.intervals.len()
            && self
                .intervals
                .iter()
                .zip(&other.intervals)
                .all(|(a, b)| (a.lo - b.lo).abs() <= tol && (a.hi - b.hi).abs() <= tol)
    }
}

pub(crate) fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
