//! Recursive box subdivision with convex-hull pruning.
//!
//! Each node carries its constraint patches already restricted to the node's
//! box, so bounds come straight from the control coefficients and children
//! are produced by one de Casteljau split per patch.

use crate::bound::BoundRecord;
use crate::constraint::ConstraintSystem;
use crate::degeneracy::{DegeneracyClassifier, Verdict};
use crate::domain::ParameterBox;
use crate::patch::BernsteinPatch;
use crate::refine::{CandidateSolution, NewtonRefiner, Refinement};
use crate::tolerance::ToleranceConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Active,
    /// A bound excluded zero or the box lies in an excluded region.
    Pruned,
    ReadyForRefinement,
    /// The budget ran out before the node was examined.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct SubdivisionNode {
    pub region: ParameterBox,
    pub patches: Vec<BernsteinPatch>,
    pub depth: usize,
    /// Remaining extra levels around a tangency; `Some` once the node is
    /// below the subdivision tolerance and being refocused.
    pub focus: Option<usize>,
}

impl SubdivisionNode {
    pub fn root(system: &ConstraintSystem) -> Self {
        Self {
            region: system.domain().clone(),
            patches: system
                .constraints()
                .iter()
                .map(|c| c.patch().as_ref().clone())
                .collect(),
            depth: 0,
            focus: None,
        }
    }

    pub fn bounds(&self) -> BoundRecord {
        BoundRecord::from_patches(&self.patches)
    }

    pub fn split(&self, axis: usize) -> (SubdivisionNode, SubdivisionNode) {
        let (left_box, right_box) = self.region.bisect(axis);
        let (left, right): (Vec<_>, Vec<_>) =
            self.patches.iter().map(|p| p.bisect(axis)).unzip();
        let focus = self.focus.map(|f| f.saturating_sub(1));
        (
            SubdivisionNode {
                region: left_box,
                patches: left,
                depth: self.depth + 1,
                focus,
            },
            SubdivisionNode {
                region: right_box,
                patches: right,
                depth: self.depth + 1,
                focus,
            },
        )
    }

    /// Axis to bisect: among axes wider than `tol`, the one along which the
    /// control coefficients vary most. Ties go to the wider axis.
    pub fn choose_axis(&self, tol: f64) -> usize {
        let dims = self.region.dimension();
        let mut candidates: Vec<usize> = (0..dims).filter(|&a| self.region.width(a) > tol).collect();
        if candidates.is_empty() {
            candidates = (0..dims).collect();
        }
        let score = |axis: usize| {
            self.patches
                .iter()
                .map(|p| p.spread(axis))
                .fold(0.0, f64::max)
        };
        let mut best = candidates[0];
        let mut best_score = score(best);
        for &axis in &candidates[1..] {
            let s = score(axis);
            let wider = self.region.width(axis) > self.region.width(best);
            if s > best_score || (s == best_score && wider) {
                best = axis;
                best_score = s;
            }
        }
        best
    }
}

/// Counters shared across the walk.
#[derive(Debug, Default)]
struct Counters {
    visited: AtomicUsize,
    pruned: AtomicUsize,
    refined: AtomicUsize,
    early_refined: AtomicUsize,
    converged: AtomicUsize,
    discarded: AtomicUsize,
    depth_exhausted: AtomicUsize,
}

/// Totals of one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    pub nodes_visited: usize,
    pub nodes_pruned: usize,
    pub boxes_refined: usize,
    pub early_refinements: usize,
    pub candidates_converged: usize,
    pub candidates_discarded: usize,
    pub depth_exhausted: usize,
}

#[derive(Debug, Clone)]
pub struct WalkResult {
    pub candidates: Vec<CandidateSolution>,
    pub partial: bool,
    pub stats: WalkStats,
}

pub struct SubdivisionEngine<'a> {
    system: &'a ConstraintSystem,
    config: &'a ToleranceConfig,
    refiner: NewtonRefiner<'a>,
    classifier: DegeneracyClassifier<'a>,
    started: Instant,
    counters: Counters,
    budget_hit: AtomicBool,
    found: Mutex<Vec<CandidateSolution>>,
}

impl<'a> SubdivisionEngine<'a> {
    pub fn new(system: &'a ConstraintSystem, config: &'a ToleranceConfig) -> Self {
        Self {
            system,
            config,
            refiner: NewtonRefiner::new(system, config),
            classifier: DegeneracyClassifier::new(system, config),
            started: Instant::now(),
            counters: Counters::default(),
            budget_hit: AtomicBool::new(false),
            found: Mutex::new(Vec::new()),
        }
    }

    /// Walks the whole domain. Candidates come back in discovery order, which
    /// differs between serial and parallel runs.
    pub fn run(self) -> WalkResult {
        let root = SubdivisionNode::root(self.system);
        self.visit(root);

        let c = &self.counters;
        let stats = WalkStats {
            nodes_visited: c.visited.load(Ordering::Relaxed),
            nodes_pruned: c.pruned.load(Ordering::Relaxed),
            boxes_refined: c.refined.load(Ordering::Relaxed),
            early_refinements: c.early_refined.load(Ordering::Relaxed),
            candidates_converged: c.converged.load(Ordering::Relaxed),
            candidates_discarded: c.discarded.load(Ordering::Relaxed),
            depth_exhausted: c.depth_exhausted.load(Ordering::Relaxed),
        };
        let partial = self.budget_hit.load(Ordering::Relaxed);
        if stats.depth_exhausted > 0 {
            log::warn!(
                "{} boxes reached the depth limit of {} before the subdivision tolerance",
                stats.depth_exhausted,
                self.config.max_depth
            );
        }
        let candidates = match self.found.into_inner() {
            Ok(found) => found,
            Err(poisoned) => poisoned.into_inner(),
        };
        WalkResult {
            candidates,
            partial,
            stats,
        }
    }

    fn out_of_budget(&self) -> bool {
        if self.budget_hit.load(Ordering::Relaxed) {
            return true;
        }
        let budget = &self.config.budget;
        let visited = self.counters.visited.fetch_add(1, Ordering::Relaxed) + 1;
        let over_nodes = budget.max_nodes.map_or(false, |max| visited > max);
        let over_time = budget
            .time_limit
            .map_or(false, |limit| self.started.elapsed() > limit);
        if over_nodes || over_time {
            if !self.budget_hit.swap(true, Ordering::Relaxed) {
                log::warn!("budget exhausted after {visited} nodes; returning partial result");
            }
            return true;
        }
        false
    }

    fn visit(&self, node: SubdivisionNode) -> NodeState {
        if self.out_of_budget() {
            return NodeState::Discarded;
        }
        if self.system.excludes_box(&node.region) || node.bounds().excludes_zero() {
            self.counters.pruned.fetch_add(1, Ordering::Relaxed);
            return NodeState::Pruned;
        }

        let width = node.region.max_width();
        if node.focus.is_some() || width <= self.config.subdivision_tol {
            self.refine_leaf(node);
            return NodeState::ReadyForRefinement;
        }
        if node.depth >= self.config.max_depth {
            self.counters.depth_exhausted.fetch_add(1, Ordering::Relaxed);
            log::trace!("depth limit at box of width {width:.3e}");
            self.refine_leaf(node);
            return NodeState::ReadyForRefinement;
        }
        if self.try_early_refinement(&node) {
            return NodeState::ReadyForRefinement;
        }

        let axis = node.choose_axis(self.config.subdivision_tol);
        self.descend(node.split(axis));
        NodeState::Active
    }

    fn descend(&self, (left, right): (SubdivisionNode, SubdivisionNode)) {
        if self.config.parallel {
            rayon::join(|| self.visit(left), || self.visit(right));
        } else {
            self.visit(left);
            self.visit(right);
        }
    }

    /// A small box around a well-conditioned isolated root stops subdividing
    /// once Newton converges inside it. Skipped for manifold solution sets and
    /// when `full_search` is set.
    fn try_early_refinement(&self, node: &SubdivisionNode) -> bool {
        if self.config.full_search
            || self.system.is_underdetermined()
            || node.region.max_width() > self.config.early_refine_width()
        {
            return false;
        }
        let center = node.region.center();
        if self.refiner.is_singular(&self.system.jacobian(&center)) {
            return false;
        }
        let outcome = self.refiner.refine_from(&center, &node.region);
        let inside = match &outcome {
            Refinement::Converged { point, .. } => node.region.contains(point),
            _ => false,
        };
        if !inside {
            return false;
        }
        match self.classifier.classify(outcome, false) {
            Verdict::Accept(candidate) if !candidate.tangent => {
                self.counters.early_refined.fetch_add(1, Ordering::Relaxed);
                self.counters.converged.fetch_add(1, Ordering::Relaxed);
                self.push(candidate);
                true
            }
            _ => false,
        }
    }

    fn refine_leaf(&self, node: SubdivisionNode) {
        self.counters.refined.fetch_add(1, Ordering::Relaxed);
        let remaining = node.focus.unwrap_or(self.config.exhaustive_depth);
        let can_subdivide = remaining > 0 && node.depth < self.config.max_depth;

        let mut refocus = false;
        for outcome in self.refiner.refine_box(&node.region) {
            match self.classifier.classify(outcome, can_subdivide) {
                Verdict::Accept(candidate) => {
                    self.counters.converged.fetch_add(1, Ordering::Relaxed);
                    self.push(candidate);
                }
                Verdict::AcceptAndSubdivide(candidate) => {
                    self.counters.converged.fetch_add(1, Ordering::Relaxed);
                    self.push(candidate);
                    refocus = true;
                }
                Verdict::Subdivide => refocus = true,
                Verdict::Discard => {
                    self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        if let Some(candidate) = self.classifier.critical_point(&node.region) {
            self.counters.converged.fetch_add(1, Ordering::Relaxed);
            self.push(candidate);
        }

        if refocus {
            let axis = node.choose_axis(0.0);
            let mut focused = node;
            focused.focus = Some(remaining);
            self.descend(focused.split(axis));
        }
    }

    fn push(&self, candidate: CandidateSolution) {
        log::trace!("candidate at {:?}", candidate.params);
        match self.found.lock() {
            Ok(mut found) => found.push(candidate),
            Err(poisoned) => poisoned.into_inner().push(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::Budget;

    fn circle_system() -> ConstraintSystem {
        let domain = ParameterBox::from_bounds(&[(-1.0, 1.0), (-1.0, 1.0)]).unwrap();
        let x = BernsteinPatch::variable(domain.clone(), 0).unwrap();
        let y = BernsteinPatch::variable(domain.clone(), 1).unwrap();
        let circle = x
            .try_mul(&x)
            .unwrap()
            .try_add(&y.try_mul(&y).unwrap())
            .unwrap()
            .offset(-0.25);
        ConstraintSystem::from_patches(vec![circle, x.try_sub(&y).unwrap()]).unwrap()
    }

    #[test]
    fn split_restricts_patches_to_children() {
        let system = circle_system();
        let root = SubdivisionNode::root(&system);
        let (left, right) = root.split(0);
        assert_eq!(left.depth, 1);
        assert!((left.region.axis(0).hi - 0.0).abs() < 1e-15);
        let p = [0.5, -0.3];
        let expected = system.constraints()[0].patch().evaluate(&p);
        assert!((right.patches[0].evaluate(&p) - expected).abs() < 1e-12);
    }

    #[test]
    fn axis_choice_skips_narrow_axes() {
        let domain = ParameterBox::from_bounds(&[(0.0, 1.0), (0.0, 0.001)]).unwrap();
        let y = BernsteinPatch::variable(domain.clone(), 1).unwrap();
        let system = ConstraintSystem::from_patches(vec![y.scale(1000.0)]).unwrap();
        let node = SubdivisionNode::root(&system);
        assert_eq!(node.choose_axis(0.01), 0);
    }

    #[test]
    fn walk_finds_both_diagonal_circle_points() {
        let system = circle_system();
        let config = ToleranceConfig::new(1e-2, 1e-10);
        let result = SubdivisionEngine::new(&system, &config).run();
        assert!(!result.partial);
        let s = 0.5 / 2f64.sqrt();
        for target in [[s, s], [-s, -s]] {
            assert!(result.candidates.iter().any(|c| {
                (c.params[0] - target[0]).abs() < 1e-8 && (c.params[1] - target[1]).abs() < 1e-8
            }));
        }
        assert!(result.stats.nodes_pruned > 0);
    }

    #[test]
    fn node_budget_marks_partial() {
        let system = circle_system();
        let config = ToleranceConfig::new(1e-4, 1e-10)
            .with_full_search(true)
            .with_budget(Budget {
                max_nodes: Some(10),
                time_limit: None,
            });
        let result = SubdivisionEngine::new(&system, &config).run();
        assert!(result.partial);
    }
}
