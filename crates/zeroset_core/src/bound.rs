//! Conservative range enclosures from the Bernstein convex-hull property.

use crate::constraint::ConstraintSystem;
use crate::domain::{Interval, ParameterBox};
use crate::patch::BernsteinPatch;
use crate::traits::ConstraintFunction;
use serde::{Deserialize, Serialize};

/// One enclosure per constraint function over a single box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundRecord {
    pub bounds: Vec<Interval>,
    slack: Vec<f64>,
}

impl BoundRecord {
    /// Bounds of patches already restricted to the box of interest.
    pub fn from_patches(patches: &[BernsteinPatch]) -> Self {
        Self {
            bounds: patches.iter().map(BernsteinPatch::bound).collect(),
            slack: patches.iter().map(rounding_slack).collect(),
        }
    }

    /// Index of the first constraint whose enclosure provably excludes zero.
    pub fn excluding_constraint(&self) -> Option<usize> {
        self.bounds
            .iter()
            .zip(&self.slack)
            .position(|(b, &s)| b.excludes_zero(s))
    }

    pub fn excludes_zero(&self) -> bool {
        self.excluding_constraint().is_some()
    }
}

/// De Casteljau round-off grows with coefficient magnitude; an enclosure only
/// counts as excluding zero when it clears this margin.
fn rounding_slack(patch: &BernsteinPatch) -> f64 {
    let degree: usize = patch.degrees().iter().sum();
    f64::EPSILON * 16.0 * (degree as f64 + 1.0) * (1.0 + patch.max_abs())
}

/// Enclosure of every constraint of `system` over `region`.
pub fn estimate(system: &ConstraintSystem, region: &ParameterBox) -> Vec<Interval> {
    system
        .constraints()
        .iter()
        .map(|c| c.bound(region))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::BernsteinPatch;

    fn circle(domain: &ParameterBox) -> BernsteinPatch {
        let x = BernsteinPatch::variable(domain.clone(), 0).unwrap();
        let y = BernsteinPatch::variable(domain.clone(), 1).unwrap();
        x.try_mul(&x)
            .unwrap()
            .try_add(&y.try_mul(&y).unwrap())
            .unwrap()
            .offset(-0.25)
    }

    #[test]
    fn enclosure_contains_sampled_values() {
        let domain = ParameterBox::from_bounds(&[(-1.0, 1.0), (-1.0, 1.0)]).unwrap();
        let patch = circle(&domain);
        let region = ParameterBox::from_bounds(&[(-0.3, 0.2), (0.1, 0.9)]).unwrap();
        let sub = patch.restrict(&region).unwrap();
        let record = BoundRecord::from_patches(std::slice::from_ref(&sub));
        let bound = record.bounds[0];
        for i in 0..=10 {
            for j in 0..=10 {
                let x = -0.3 + 0.5 * i as f64 / 10.0;
                let y = 0.1 + 0.8 * j as f64 / 10.0;
                let v = patch.evaluate(&[x, y]);
                assert!(v >= bound.lo - 1e-12 && v <= bound.hi + 1e-12, "{v} outside {bound:?}");
            }
        }
    }

    #[test]
    fn far_box_is_excluded() {
        let domain = ParameterBox::from_bounds(&[(-1.0, 1.0), (-1.0, 1.0)]).unwrap();
        let patch = circle(&domain);
        let inside = patch
            .restrict(&ParameterBox::from_bounds(&[(-0.1, 0.1), (-0.1, 0.1)]).unwrap())
            .unwrap();
        let crossing = patch
            .restrict(&ParameterBox::from_bounds(&[(0.4, 0.6), (-0.1, 0.1)]).unwrap())
            .unwrap();
        assert_eq!(BoundRecord::from_patches(&[inside]).excluding_constraint(), Some(0));
        assert!(!BoundRecord::from_patches(&[crossing]).excludes_zero());
    }

    #[test]
    fn estimate_uses_every_constraint() {
        let domain = ParameterBox::unit(2);
        let system = ConstraintSystem::from_patches(vec![
            circle(&domain),
            BernsteinPatch::variable(domain.clone(), 0).unwrap(),
        ])
        .unwrap();
        let region = ParameterBox::from_bounds(&[(0.5, 1.0), (0.5, 1.0)]).unwrap();
        let bounds = estimate(&system, &region);
        assert_eq!(bounds.len(), 2);
        assert!(bounds[1].lo >= 0.5 - 1e-12 && bounds[1].hi <= 1.0 + 1e-12);
    }
}
