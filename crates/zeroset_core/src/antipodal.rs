//! Antipodal pairs: parameter pairs whose connecting chord is orthogonal to
//! the tangent space at both ends.

use crate::constraint::{ConstraintSystem, Exclusion};
use crate::domain::distance;
use crate::error::Result;
use crate::geometry::PatchMap;
use crate::solver::{solve, SolveOutcome};
use crate::tolerance::ToleranceConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntipodalPair {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    /// Euclidean length of the chord.
    pub distance: f64,
    pub residual_norm: f64,
}

/// `(A(a) - A(b)) . dA/da_j = 0` and `(A(a) - A(b)) . dA/db_j = 0` for every
/// parameter direction, over the doubled domain keeping only `a <_lex b`.
///
/// For curves the chord is replaced by the divided difference
/// `(A(a) - A(b)) / (a - b)`, which removes the trivial zeros on the diagonal.
pub fn antipodal_system(object: &PatchMap) -> Result<ConstraintSystem> {
    let p = object.param_dim();
    let domain = object.domain().product(object.domain());
    let first = object.embed(&(0..p).collect::<Vec<_>>(), &domain)?;
    let second = object.embed(&(p..2 * p).collect::<Vec<_>>(), &domain)?;
    let chord = if p == 1 {
        object.divided_difference()?
    } else {
        first.try_sub(&second)?
    };

    let mut constraints = Vec::with_capacity(2 * p);
    for j in 0..p {
        constraints.push(chord.dot(&first.derivative(j))?);
    }
    for j in 0..p {
        constraints.push(chord.dot(&second.derivative(p + j))?);
    }
    ConstraintSystem::from_patches(constraints)?
        .with_exclusion(Exclusion::diagonal(p, object.domain()))
}

/// Each unordered pair is reported once, with `a <_lex b`.
pub fn antipodal(
    object: &PatchMap,
    config: &ToleranceConfig,
) -> Result<SolveOutcome<AntipodalPair>> {
    let p = object.param_dim();
    let system = antipodal_system(object)?;
    let outcome = solve(&system, config)?;
    log::debug!("{} antipodal pairs", outcome.items.len());
    Ok(outcome.map_items(|candidate| {
        let (a, b) = candidate.params.split_at(p);
        AntipodalPair {
            distance: distance(&object.evaluate(a), &object.evaluate(b)),
            a: a.to_vec(),
            b: b.to_vec(),
            residual_norm: candidate.residual_norm,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tangent(curve: &PatchMap, t: f64) -> Vec<f64> {
        let jac = curve.jacobian(&[t]);
        vec![jac[(0, 0)], jac[(1, 0)]]
    }

    fn arch() -> PatchMap {
        PatchMap::curve(&[
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
            vec![1.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn arch_width_is_its_only_antipodal_pair() {
        let curve = arch();
        let outcome = antipodal(&curve, &ToleranceConfig::new(1e-2, 1e-10)).unwrap();
        assert_eq!(outcome.items.len(), 1);
        let pair = &outcome.items[0];
        assert!(pair.a[0].abs() < 1e-8);
        assert!((pair.b[0] - 1.0).abs() < 1e-8);
        assert!((pair.distance - 1.0).abs() < 1e-8);
    }

    #[test]
    fn pairs_have_parallel_tangents_and_no_mirrors() {
        let wave = PatchMap::curve(&[
            vec![0.0, 0.0],
            vec![0.3, 1.5],
            vec![0.7, -1.5],
            vec![1.0, 0.0],
        ])
        .unwrap();
        let outcome = antipodal(&wave, &ToleranceConfig::new(1e-2, 1e-10)).unwrap();
        for pair in &outcome.items {
            assert!(pair.a[0] < pair.b[0]);
            let (ta, tb) = (tangent(&wave, pair.a[0]), tangent(&wave, pair.b[0]));
            let cross = ta[0] * tb[1] - ta[1] * tb[0];
            let scale = (ta[0].hypot(ta[1]) * tb[0].hypot(tb[1])).max(1e-12);
            assert!((cross / scale).abs() < 1e-6, "tangents not parallel at {pair:?}");
        }
        assert_no_mirrors(&outcome.items);
    }

    fn assert_no_mirrors(pairs: &[AntipodalPair]) {
        let close = |x: &[f64], y: &[f64]| x.iter().zip(y).all(|(u, v)| (u - v).abs() < 1e-6);
        for (i, p) in pairs.iter().enumerate() {
            for q in &pairs[i + 1..] {
                assert!(!(close(&p.a, &q.b) && close(&p.b, &q.a)), "{p:?} mirrors {q:?}");
            }
        }
    }

    #[test]
    fn extruded_arch_pairs_are_reported_once() {
        let profile = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]];
        let rows: Vec<Vec<Vec<f64>>> = vec![
            profile.iter().map(|p| vec![p[0], p[1], 0.0]).collect(),
            profile.iter().map(|p| vec![p[0], p[1], 1.0]).collect(),
        ];
        let surface = PatchMap::surface(&rows).unwrap();
        let outcome = antipodal(&surface, &ToleranceConfig::new(0.1, 1e-10)).unwrap();
        assert!(!outcome.items.is_empty());
        for pair in &outcome.items {
            assert!((pair.a[0] - pair.b[0]).abs() < 1e-8, "{pair:?}");
            assert!(pair.a[1].abs() < 1e-8, "{pair:?}");
            assert!((pair.b[1] - 1.0).abs() < 1e-8, "{pair:?}");
            assert!((pair.distance - 1.0).abs() < 1e-8, "{pair:?}");
        }
        assert_no_mirrors(&outcome.items);
    }
}
