//! Turns refined candidates into isolated points, open arcs and closed loops.

use crate::degeneracy::lex_cmp;
use crate::domain::distance;
use crate::refine::CandidateSolution;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Point,
    OpenArc,
    ClosedLoop,
}

/// One connected piece of the solution set. `coordinates[i]` is the output
/// coordinate of `points[i]`: the parameters themselves unless the caller
/// mapped them into another space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionComponent {
    pub kind: ComponentKind,
    pub points: Vec<CandidateSolution>,
    pub coordinates: Vec<Vec<f64>>,
}

impl SolutionComponent {
    fn new(kind: ComponentKind, points: Vec<CandidateSolution>) -> Self {
        let coordinates = points.iter().map(|p| p.params.clone()).collect();
        Self {
            kind,
            points,
            coordinates,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Replaces the output coordinates with `f(params)` for every sample.
    pub fn map_coordinates<F>(&mut self, f: F)
    where
        F: Fn(&[f64]) -> Vec<f64>,
    {
        self.coordinates = self.points.iter().map(|p| f(&p.params)).collect();
    }

    pub fn arc_length(&self) -> f64 {
        polyline_length(&self.coordinates)
    }
}

/// Sorts candidates lexicographically and drops every candidate within
/// `radius` of an earlier kept one, keeping the lower residual of the two.
/// The survivor stays tangential if either of the two was.
pub fn dedup(mut candidates: Vec<CandidateSolution>, radius: f64) -> Vec<CandidateSolution> {
    candidates.sort_by(|a, b| lex_cmp(&a.params, &b.params));
    let mut kept: Vec<CandidateSolution> = Vec::with_capacity(candidates.len());
    'outer: for candidate in candidates {
        for existing in kept.iter_mut().rev() {
            if candidate.params[0] - existing.params[0] > radius {
                break;
            }
            if distance(&candidate.params, &existing.params) <= radius {
                let tangent = existing.tangent || candidate.tangent;
                if candidate.residual_norm < existing.residual_norm {
                    *existing = candidate;
                }
                existing.tangent = tangent;
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept.sort_by(|a, b| lex_cmp(&a.params, &b.params));
    kept
}

pub struct ComponentAssembler {
    link: f64,
    manifold: bool,
}

impl ComponentAssembler {
    /// `manifold` is set when the solution set is expected to be curves
    /// (fewer equations than parameters); otherwise every candidate is a point.
    pub fn new(link: f64, manifold: bool) -> Self {
        Self { link, manifold }
    }

    pub fn assemble(&self, mut candidates: Vec<CandidateSolution>) -> Vec<SolutionComponent> {
        candidates.sort_by(|a, b| lex_cmp(&a.params, &b.params));
        if !self.manifold {
            return candidates
                .into_iter()
                .map(|c| SolutionComponent::new(ComponentKind::Point, vec![c]))
                .collect();
        }

        let adjacency = self.adjacency(&candidates);
        let mut components = Vec::new();
        for group in connected_groups(&adjacency) {
            self.trace_group(&candidates, &adjacency, group, &mut components);
        }
        log::debug!(
            "assembled {} candidates into {} components",
            candidates.len(),
            components.len()
        );
        components
    }

    /// Neighbour lists within the link distance; candidates must be sorted
    /// on their first coordinate.
    fn adjacency(&self, points: &[CandidateSolution]) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); points.len()];
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                if points[j].params[0] - points[i].params[0] > self.link {
                    break;
                }
                if distance(&points[i].params, &points[j].params) <= self.link {
                    adjacency[i].push(j);
                    adjacency[j].push(i);
                }
            }
        }
        adjacency
    }

    fn trace_group(
        &self,
        points: &[CandidateSolution],
        adjacency: &[Vec<usize>],
        group: Vec<usize>,
        out: &mut Vec<SolutionComponent>,
    ) {
        let first = group[0];
        let far = farthest(points, first, &group);
        if distance(&points[first].params, &points[far].params) <= self.link {
            out.push(SolutionComponent::new(
                ComponentKind::Point,
                vec![best_residual(points, &group).clone()],
            ));
            return;
        }

        let mut remaining = vec![false; points.len()];
        for &i in &group {
            remaining[i] = true;
        }
        let mut pending = group;
        while !pending.is_empty() {
            let start = farthest(points, pending[0], &pending);
            let chain = self.chain_from(points, adjacency, start, &mut remaining);
            for &i in &pending {
                if remaining[i]
                    && chain
                        .iter()
                        .any(|&c| distance(&points[i].params, &points[c].params) <= self.link)
                {
                    remaining[i] = false;
                }
            }
            pending.retain(|&i| remaining[i]);
            out.push(self.classify_chain(points, chain));
        }
    }

    /// Greedy nearest-neighbour walk forward from `start`, then backward from
    /// `start` along whatever the forward walk left unvisited.
    fn chain_from(
        &self,
        points: &[CandidateSolution],
        adjacency: &[Vec<usize>],
        start: usize,
        remaining: &mut [bool],
    ) -> Vec<usize> {
        remaining[start] = false;
        let forward = walk(points, adjacency, start, remaining);
        let backward = walk(points, adjacency, start, remaining);
        let mut chain: Vec<usize> = backward.into_iter().rev().collect();
        chain.push(start);
        chain.extend(forward);
        chain
    }

    fn classify_chain(&self, points: &[CandidateSolution], chain: Vec<usize>) -> SolutionComponent {
        let samples: Vec<CandidateSolution> = chain.iter().map(|&i| points[i].clone()).collect();
        if samples.len() == 1 {
            return SolutionComponent::new(ComponentKind::Point, samples);
        }
        let params: Vec<Vec<f64>> = samples.iter().map(|s| s.params.clone()).collect();
        let length = polyline_length(&params);
        let ends_meet = distance(&params[0], &params[params.len() - 1]) <= self.link;
        let kind = if samples.len() >= 4 && ends_meet && length > 3.0 * self.link {
            ComponentKind::ClosedLoop
        } else {
            ComponentKind::OpenArc
        };
        SolutionComponent::new(kind, samples)
    }
}

fn walk(
    points: &[CandidateSolution],
    adjacency: &[Vec<usize>],
    start: usize,
    remaining: &mut [bool],
) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = start;
    loop {
        let next = adjacency[current]
            .iter()
            .copied()
            .filter(|&j| remaining[j])
            .min_by(|&a, &b| {
                distance(&points[current].params, &points[a].params)
                    .total_cmp(&distance(&points[current].params, &points[b].params))
                    .then(a.cmp(&b))
            });
        match next {
            Some(j) => {
                remaining[j] = false;
                path.push(j);
                current = j;
            }
            None => return path,
        }
    }
}

fn connected_groups(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut seen = vec![false; adjacency.len()];
    let mut groups = Vec::new();
    for root in 0..adjacency.len() {
        if seen[root] {
            continue;
        }
        seen[root] = true;
        let mut stack = vec![root];
        let mut group = Vec::new();
        while let Some(i) = stack.pop() {
            group.push(i);
            for &j in &adjacency[i] {
                if !seen[j] {
                    seen[j] = true;
                    stack.push(j);
                }
            }
        }
        group.sort_unstable();
        groups.push(group);
    }
    groups
}

fn farthest(points: &[CandidateSolution], from: usize, among: &[usize]) -> usize {
    among
        .iter()
        .copied()
        .max_by(|&a, &b| {
            distance(&points[from].params, &points[a].params)
                .total_cmp(&distance(&points[from].params, &points[b].params))
                .then(b.cmp(&a))
        })
        .unwrap_or(from)
}

fn best_residual<'p>(points: &'p [CandidateSolution], group: &[usize]) -> &'p CandidateSolution {
    let best = group
        .iter()
        .copied()
        .min_by(|&a, &b| points[a].residual_norm.total_cmp(&points[b].residual_norm))
        .unwrap_or(group[0]);
    &points[best]
}

fn polyline_length(points: &[Vec<f64>]) -> f64 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}
