//! Generic entry points: constraint list in, candidates or components out.

use crate::assemble::{dedup, ComponentAssembler, SolutionComponent};
use crate::constraint::{Constraint, ConstraintSystem};
use crate::degeneracy::{lex_cmp, merge_tangential};
use crate::error::Result;
use crate::refine::CandidateSolution;
use crate::subdivision::{SubdivisionEngine, WalkStats};
use crate::tolerance::{AngularMode, ToleranceConfig};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveStats {
    pub walk: WalkStats,
    /// Candidates left after deduplication and tangential merging.
    pub candidates: usize,
    pub elapsed: Duration,
}

/// Result of a solve. `partial` is set when a budget cut the search short;
/// `items` then holds whatever was found before the cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome<T> {
    pub items: Vec<T>,
    pub partial: bool,
    pub stats: SolveStats,
}

impl<T> SolveOutcome<T> {
    pub fn map_items<U, F>(self, f: F) -> SolveOutcome<U>
    where
        F: FnMut(T) -> U,
    {
        SolveOutcome {
            items: self.items.into_iter().map(f).collect(),
            partial: self.partial,
            stats: self.stats,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Solves the system formed by `constraints`, which must share one domain.
pub fn solve_system(
    constraints: Vec<Constraint>,
    config: &ToleranceConfig,
) -> Result<SolveOutcome<CandidateSolution>> {
    let system = ConstraintSystem::new(constraints)?;
    solve(&system, config)
}

/// Solves a prepared system and returns deduplicated candidates sorted
/// lexicographically by parameters.
pub fn solve(
    system: &ConstraintSystem,
    config: &ToleranceConfig,
) -> Result<SolveOutcome<CandidateSolution>> {
    config.validate()?;
    let started = Instant::now();
    log::debug!(
        "solving {} equations in {} parameters (tol {:e}, parallel {})",
        system.equations(),
        system.dimension(),
        config.subdivision_tol,
        config.parallel
    );

    let walk = SubdivisionEngine::new(system, config).run();
    let mut candidates: Vec<CandidateSolution> = walk
        .candidates
        .into_iter()
        .filter(|c| !system.excludes_point(&c.params))
        .collect();
    candidates.sort_by(|a, b| lex_cmp(&a.params, &b.params));
    candidates = dedup(candidates, config.dedup_radius());
    let heuristic = matches!(config.angular, AngularMode::Heuristic { .. });
    if heuristic && !config.full_search {
        let link = config.link_distance(system.dimension());
        let radius = if system.is_underdetermined() { 0.5 * link } else { link };
        candidates = merge_tangential(candidates, radius);
    }

    let stats = SolveStats {
        walk: walk.stats,
        candidates: candidates.len(),
        elapsed: started.elapsed(),
    };
    log::debug!(
        "{} candidates from {} nodes ({} pruned) in {:?}",
        stats.candidates,
        stats.walk.nodes_visited,
        stats.walk.nodes_pruned,
        stats.elapsed
    );
    Ok(SolveOutcome {
        items: candidates,
        partial: walk.partial,
        stats,
    })
}

/// Solves and links the candidates into points, arcs and loops.
pub fn solve_components(
    system: &ConstraintSystem,
    config: &ToleranceConfig,
) -> Result<SolveOutcome<SolutionComponent>> {
    let outcome = solve(system, config)?;
    let assembler = ComponentAssembler::new(
        config.link_distance(system.dimension()),
        system.is_underdetermined(),
    );
    let components = assembler.assemble(outcome.items);
    Ok(SolveOutcome {
        items: components,
        partial: outcome.partial,
        stats: outcome.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::ComponentKind;
    use crate::domain::ParameterBox;
    use crate::error::SolverError;
    use crate::patch::BernsteinPatch;
    use crate::tolerance::Budget;

    fn square() -> ParameterBox {
        ParameterBox::from_bounds(&[(-1.0, 1.0), (-1.0, 1.0)]).unwrap()
    }

    fn vars(domain: &ParameterBox) -> (BernsteinPatch, BernsteinPatch) {
        (
            BernsteinPatch::variable(domain.clone(), 0).unwrap(),
            BernsteinPatch::variable(domain.clone(), 1).unwrap(),
        )
    }

    fn circle(domain: &ParameterBox, r2: f64) -> BernsteinPatch {
        let (x, y) = vars(domain);
        x.try_mul(&x)
            .unwrap()
            .try_add(&y.try_mul(&y).unwrap())
            .unwrap()
            .offset(-r2)
    }

    fn parabola_line(h: f64) -> Vec<Constraint> {
        let domain = square();
        let (x, y) = vars(&domain);
        vec![
            Constraint::from_patch(y.try_sub(&x.try_mul(&x).unwrap()).unwrap()),
            Constraint::from_patch(y.offset(-h)),
        ]
    }

    fn tangency_config() -> ToleranceConfig {
        ToleranceConfig::new(1e-3, 1e-9).with_angular(AngularMode::Heuristic {
            max_deviation_deg: 5.0,
        })
    }

    #[test]
    fn empty_constraint_list_is_an_error() {
        let err = solve_system(Vec::new(), &ToleranceConfig::default()).expect_err("empty");
        assert_eq!(err, SolverError::EmptySystem);
    }

    #[test]
    fn invalid_tolerance_is_an_error() {
        let err = solve_system(parabola_line(0.25), &ToleranceConfig::new(-1.0, 1e-9))
            .expect_err("negative");
        assert!(matches!(err, SolverError::InvalidTolerance(_)));
    }

    #[test]
    fn every_candidate_satisfies_the_system() {
        let config = ToleranceConfig::new(1e-3, 1e-10);
        let outcome = solve_system(parabola_line(0.25), &config).unwrap();
        assert_eq!(outcome.items.len(), 2);
        for c in &outcome.items {
            assert!(c.residual_norm <= config.numeric_tol);
            assert!((c.params[0].abs() - 0.5).abs() < 1e-8);
        }
        assert!(outcome.items[0].params[0] < outcome.items[1].params[0]);
    }

    #[test]
    fn rootless_system_returns_nothing() {
        let domain = square();
        let outcome = solve(
            &ConstraintSystem::from_patches(vec![circle(&domain, -0.1)]).unwrap(),
            &ToleranceConfig::new(1e-2, 1e-9),
        )
        .unwrap();
        assert!(outcome.is_empty());
        assert!(!outcome.partial);
    }

    #[test]
    fn tangency_does_not_grow_the_root_count() {
        let config = tangency_config();
        let mut previous = usize::MAX;
        for h in [0.04, 0.01, 0.0025, 0.0] {
            let count = solve_system(parabola_line(h), &config).unwrap().items.len();
            assert!((1..=2).contains(&count), "h = {h}: {count} roots");
            assert!(count <= previous, "h = {h}: {count} > {previous}");
            previous = count;
        }
        assert_eq!(previous, 1);
    }

    #[test]
    fn tangential_root_is_flagged() {
        let outcome = solve_system(parabola_line(0.0), &tangency_config()).unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.items[0].tangent);
        assert!(outcome.items[0].params[0].abs() < 1e-3);
    }

    #[test]
    fn exhaustive_mode_resolves_tangency_and_crossings() {
        let config = ToleranceConfig::new(1e-3, 1e-9).with_angular(AngularMode::Exhaustive);
        let touching = solve_system(parabola_line(0.0), &config).unwrap();
        assert_eq!(touching.items.len(), 1);
        assert!(touching.items[0].tangent);
        let crossing = solve_system(parabola_line(0.01), &config).unwrap();
        assert_eq!(crossing.items.len(), 2);
        assert!(crossing.items.iter().all(|c| !c.tangent));
    }

    #[test]
    fn full_search_subdivides_around_tangency_instead_of_merging() {
        let quick = solve_system(parabola_line(0.0), &tangency_config()).unwrap();
        let full = solve_system(parabola_line(0.0), &tangency_config().with_full_search(true))
            .unwrap();
        assert_eq!(full.items.len(), 1);
        assert!(full.items[0].tangent);
        assert!(full.stats.walk.boxes_refined > quick.stats.walk.boxes_refined);
    }

    #[test]
    fn double_root_of_one_equation_is_tangent() {
        let t = BernsteinPatch::variable(ParameterBox::unit(1), 0).unwrap().offset(-0.5);
        let constraints = vec![Constraint::from_patch(t.try_mul(&t).unwrap())];
        let heuristic = solve_system(constraints.clone(), &ToleranceConfig::new(1e-3, 1e-10))
            .unwrap();
        assert_eq!(heuristic.items.len(), 1);
        assert!(heuristic.items[0].tangent);
        assert!((heuristic.items[0].params[0] - 0.5).abs() < 1e-4);

        let exhaustive = solve_system(
            constraints,
            &ToleranceConfig::new(1e-3, 1e-10).with_angular(AngularMode::Exhaustive),
        )
        .unwrap();
        assert_eq!(exhaustive.items.len(), 1);
        assert!(exhaustive.items[0].tangent);
        assert!(exhaustive.stats.walk.boxes_refined > heuristic.stats.walk.boxes_refined);
    }

    #[test]
    fn crossing_branches_of_an_implicit_curve_are_flagged() {
        let domain = square();
        let (x, y) = vars(&domain);
        let saddle = x.try_mul(&x).unwrap().try_sub(&y.try_mul(&y).unwrap()).unwrap();
        let system = ConstraintSystem::from_patches(vec![saddle]).unwrap();
        let outcome = solve(&system, &ToleranceConfig::new(0.02, 1e-9)).unwrap();
        assert!(outcome
            .items
            .iter()
            .any(|c| c.tangent && c.params.iter().all(|p| p.abs() < 0.02)));
        assert!(outcome
            .items
            .iter()
            .filter(|c| c.params[0].abs() > 0.1)
            .all(|c| !c.tangent));
    }

    #[test]
    fn shrinking_circle_stays_one_component() {
        let domain = square();
        let config = ToleranceConfig::new(0.02, 1e-9);
        let mut last = None;
        for r2 in [0.01, 0.0025, 0.0004, 0.0] {
            let system = ConstraintSystem::from_patches(vec![circle(&domain, r2)]).unwrap();
            let outcome = solve_components(&system, &config).unwrap();
            assert_eq!(outcome.items.len(), 1, "r^2 = {r2}");
            last = outcome.items.into_iter().next();
        }
        let point = last.unwrap();
        assert_eq!(point.kind, ComponentKind::Point);
        assert!(point.points[0].tangent);
        assert!(point.coordinates[0].iter().all(|p| p.abs() < 1e-6));
    }

    #[test]
    fn implicit_circle_is_one_loop() {
        let domain = square();
        let system = ConstraintSystem::from_patches(vec![circle(&domain, 0.25)]).unwrap();
        let outcome = solve_components(&system, &ToleranceConfig::new(0.02, 1e-9)).unwrap();
        assert_eq!(outcome.items.len(), 1);
        let component = &outcome.items[0];
        assert_eq!(component.kind, ComponentKind::ClosedLoop);
        for p in &component.coordinates {
            assert!(((p[0] * p[0] + p[1] * p[1]).sqrt() - 0.5).abs() < 1e-8);
        }
    }

    #[test]
    fn loop_survives_finer_tolerances() {
        let domain = ParameterBox::unit(2);
        let (u, v) = vars(&domain);
        let du = u.offset(-0.5);
        let dv = v.offset(-0.5);
        let bowl = du
            .try_mul(&du)
            .unwrap()
            .try_add(&dv.try_mul(&dv).unwrap())
            .unwrap()
            .offset(-0.09);
        let system = ConstraintSystem::from_patches(vec![bowl]).unwrap();
        for tol in [0.05, 0.025, 0.0125] {
            let outcome = solve_components(&system, &ToleranceConfig::new(tol, 1e-9)).unwrap();
            assert_eq!(outcome.items.len(), 1, "tol {tol}");
            assert_eq!(outcome.items[0].kind, ComponentKind::ClosedLoop, "tol {tol}");
        }
    }

    #[test]
    fn parallel_walk_matches_serial() {
        let constraints = parabola_line(0.25);
        let serial = solve_system(constraints.clone(), &ToleranceConfig::new(1e-3, 1e-10)).unwrap();
        let parallel = solve_system(
            constraints,
            &ToleranceConfig::new(1e-3, 1e-10).with_parallel(true),
        )
        .unwrap();
        assert_eq!(serial.items, parallel.items);

        let domain = square();
        let system = ConstraintSystem::from_patches(vec![circle(&domain, 0.25)]).unwrap();
        let serial = solve(&system, &ToleranceConfig::new(0.02, 1e-9)).unwrap();
        let parallel = solve(&system, &ToleranceConfig::new(0.02, 1e-9).with_parallel(true)).unwrap();
        assert_eq!(serial.items, parallel.items);
    }

    #[test]
    fn full_search_finds_the_same_roots() {
        let quick = solve_system(parabola_line(0.25), &ToleranceConfig::new(1e-3, 1e-10)).unwrap();
        let full = solve_system(
            parabola_line(0.25),
            &ToleranceConfig::new(1e-3, 1e-10).with_full_search(true),
        )
        .unwrap();
        assert_eq!(quick.items.len(), full.items.len());
        assert!(full.stats.walk.nodes_visited >= quick.stats.walk.nodes_visited);
    }

    #[test]
    fn node_budget_returns_partial_result() {
        let config = ToleranceConfig::new(1e-3, 1e-9).with_budget(Budget {
            max_nodes: Some(5),
            time_limit: None,
        });
        let outcome = solve_system(parabola_line(0.25), &config).unwrap();
        assert!(outcome.partial);
    }
}
