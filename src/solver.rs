//! # Move-making minimizers
//!
//! Strategies that lower the energy of a labeling by proposing moves and accepting only those
//! that strictly decrease the exact total energy. The alternation logic only sees the
//! [`Minimizer`] trait, so backends can be swapped through the parameters.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::trace;

use crate::cost::Cost;
use crate::graph::Edge;
use crate::labels::Label;
use crate::maxflow::FlowGraph;
use crate::params::SolverKind;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Energy over a labeling of graph nodes.
pub trait Energy {
    fn node_count(&self) -> usize;

    /// Number of labels every node may take.
    fn label_count(&self) -> usize;

    fn edges(&self) -> &[Edge];

    /// Indices into `edges` of the edges incident to `node`.
    fn node_edges(&self, node: usize) -> &[usize];

    /// Cost of `label` at `node`. Terms that depend on other nodes' labels are evaluated against
    /// the labeling last passed to `sync` or updated through `relabel`.
    fn unary(&self, node: usize, label: Label) -> Cost;

    /// Cost of labels `a` and `b` on the endpoints `a` and `b` of an edge.
    fn pairwise(&self, edge: usize, a: Label, b: Label) -> Cost;

    /// Exact total energy of a labeling.
    fn total(&self, labels: &[Label]) -> Cost;

    /// Refresh labeling-dependent state from a full labeling.
    fn sync(&mut self, _labels: &[Label]) {}

    /// Update labeling-dependent state after a single node changed label.
    fn relabel(&mut self, _node: usize, _from: Label, _to: Label) {}
}

/// Strategy minimizing an [`Energy`] in place.
pub trait Minimizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Improve `labels` with at most `max_moves` moves.
    fn minimize(&self, energy: &mut dyn Energy, labels: &mut [Label], max_moves: usize)
        -> MoveReport;
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Energy trace of one minimizer run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveReport {
    /// Total energy before the run, then after each accepted move.
    pub energies: Vec<Cost>,
    pub accepted: usize,
    pub rejected: usize,
    /// True if the run stopped because no move improved the energy.
    pub converged: bool,
}

/// α-expansion: each move lets every node either keep its label or switch to α, and the best
/// such move is found with a minimum cut.
#[derive(Debug, Default, Clone, Copy)]
pub struct Expansion;

/// Iterated conditional modes: each sweep gives every node its best label given its neighbours.
#[derive(Debug, Default, Clone, Copy)]
pub struct Icm;

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl MoveReport {
    fn start(energy: Cost) -> Self {
        Self {
            energies: vec![energy],
            ..Self::default()
        }
    }

    pub fn initial_energy(&self) -> Option<Cost> {
        self.energies.first().copied()
    }

    pub fn final_energy(&self) -> Option<Cost> {
        self.energies.last().copied()
    }
}

/// Build the minimizer selected in the parameters.
pub fn make_minimizer(kind: SolverKind) -> Box<dyn Minimizer> {
    match kind {
        SolverKind::Expansion => Box::new(Expansion),
        SolverKind::Icm => Box::new(Icm),
    }
}

impl Expansion {
    /// Best α-expansion of `labels`, or `None` if no node would switch.
    fn propose(energy: &dyn Energy, labels: &[Label], alpha: Label) -> Option<Vec<Label>> {
        let n = energy.node_count();
        let (s, t) = (n, n + 1);
        let mut graph = FlowGraph::new(n + 2);

        // Cost of keeping (x = 0) or switching (x = 1) every node.
        let keep: Vec<Cost> = (0..n).map(|i| energy.unary(i, labels[i])).collect();
        let mut switch: Vec<Cost> = (0..n)
            .map(|i| {
                if labels[i] == alpha {
                    keep[i]
                } else {
                    energy.unary(i, alpha)
                }
            })
            .collect();

        for (k, edge) in energy.edges().iter().enumerate() {
            let (la, lb) = (labels[edge.a], labels[edge.b]);
            let e00 = energy.pairwise(k, la, lb);
            let e01 = energy.pairwise(k, la, alpha);
            let e10 = energy.pairwise(k, alpha, lb);
            let e11 = energy.pairwise(k, alpha, alpha);

            switch[edge.a] += e10 - e00;
            switch[edge.b] += e11 - e10;
            let coupling = e01 + e10 - e00 - e11;
            if coupling > 0 {
                graph.add_edge(edge.a, edge.b, coupling, 0);
            } else if coupling < 0 {
                // Non-submodular term after rounding; truncated, the energy check catches it.
                trace!("truncating non-regular pair term {} on edge {}", coupling, k);
            }
        }

        for i in 0..n {
            let delta = switch[i] - keep[i];
            if delta > 0 {
                graph.add_edge(s, i, delta, 0);
            } else if delta < 0 {
                graph.add_edge(i, t, -delta, 0);
            }
        }

        graph.max_flow(s, t);
        let source = graph.source_side(s);

        let mut changed = false;
        let proposal: Vec<Label> = (0..n)
            .map(|i| {
                if !source[i] && labels[i] != alpha {
                    changed = true;
                    alpha
                } else {
                    labels[i]
                }
            })
            .collect();

        if changed {
            Some(proposal)
        } else {
            None
        }
    }
}

impl Minimizer for Expansion {
    fn name(&self) -> &'static str {
        "expansion"
    }

    fn minimize(
        &self,
        energy: &mut dyn Energy,
        labels: &mut [Label],
        max_moves: usize,
    ) -> MoveReport {
        energy.sync(labels);
        let mut current = energy.total(labels);
        let mut report = MoveReport::start(current);
        let mut moves = 0;

        'cycles: loop {
            let mut improved = false;
            for alpha in 0..energy.label_count() {
                if moves >= max_moves {
                    break 'cycles;
                }
                moves += 1;

                let proposal = match Self::propose(&*energy, labels, alpha as Label) {
                    Some(p) => p,
                    None => continue,
                };
                let candidate = energy.total(&proposal);
                if candidate < current {
                    labels.copy_from_slice(&proposal);
                    energy.sync(labels);
                    current = candidate;
                    improved = true;
                    report.accepted += 1;
                    report.energies.push(current);
                } else {
                    report.rejected += 1;
                }
            }
            if !improved {
                report.converged = true;
                break;
            }
        }

        report
    }
}

impl Icm {
    /// Cost of giving `node` the label `label` with every other node fixed.
    fn local_cost(energy: &dyn Energy, labels: &[Label], node: usize, label: Label) -> Cost {
        let edges = energy.edges();
        energy.unary(node, label)
            + energy
                .node_edges(node)
                .iter()
                .map(|&k| {
                    let edge = &edges[k];
                    if edge.a == node {
                        energy.pairwise(k, label, labels[edge.b])
                    } else {
                        energy.pairwise(k, labels[edge.a], label)
                    }
                })
                .sum::<Cost>()
    }
}

impl Minimizer for Icm {
    fn name(&self) -> &'static str {
        "icm"
    }

    fn minimize(
        &self,
        energy: &mut dyn Energy,
        labels: &mut [Label],
        max_moves: usize,
    ) -> MoveReport {
        energy.sync(labels);
        let mut current = energy.total(labels);
        let mut report = MoveReport::start(current);

        for _ in 0..max_moves {
            let backup = labels.to_vec();
            let mut changed = 0;

            for node in 0..energy.node_count() {
                let old = labels[node];
                let mut best = (old, Self::local_cost(&*energy, labels, node, old));
                for l in 0..energy.label_count() {
                    let l = l as Label;
                    if l == old {
                        continue;
                    }
                    let c = Self::local_cost(&*energy, labels, node, l);
                    if c < best.1 {
                        best = (l, c);
                    }
                }
                if best.0 != old {
                    labels[node] = best.0;
                    energy.relabel(node, old, best.0);
                    changed += 1;
                }
            }

            if changed == 0 {
                report.converged = true;
                break;
            }

            let candidate = energy.total(labels);
            if candidate < current {
                current = candidate;
                report.accepted += 1;
                report.energies.push(current);
            } else {
                labels.copy_from_slice(&backup);
                energy.sync(labels);
                report.rejected += 1;
                report.converged = true;
                break;
            }
        }

        report
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::WEIGHT_ONE;

    /// Chain of nodes with a Potts smoothness term.
    struct Chain {
        unary: Vec<Vec<Cost>>,
        edges: Vec<Edge>,
        node_edges: Vec<Vec<usize>>,
        smooth: Cost,
    }

    impl Chain {
        fn new(unary: Vec<Vec<Cost>>, smooth: Cost) -> Self {
            let n = unary.len();
            let edges: Vec<Edge> = (1..n)
                .map(|b| Edge {
                    a: b - 1,
                    b,
                    weight: WEIGHT_ONE,
                })
                .collect();
            let mut node_edges = vec![Vec::new(); n];
            for (k, e) in edges.iter().enumerate() {
                node_edges[e.a].push(k);
                node_edges[e.b].push(k);
            }
            Self {
                unary,
                edges,
                node_edges,
                smooth,
            }
        }
    }

    impl Energy for Chain {
        fn node_count(&self) -> usize {
            self.unary.len()
        }

        fn label_count(&self) -> usize {
            self.unary[0].len()
        }

        fn edges(&self) -> &[Edge] {
            &self.edges
        }

        fn node_edges(&self, node: usize) -> &[usize] {
            &self.node_edges[node]
        }

        fn unary(&self, node: usize, label: Label) -> Cost {
            self.unary[node][label as usize]
        }

        fn pairwise(&self, _edge: usize, a: Label, b: Label) -> Cost {
            if a == b {
                0
            } else {
                self.smooth
            }
        }

        fn total(&self, labels: &[Label]) -> Cost {
            let u: Cost = labels
                .iter()
                .enumerate()
                .map(|(i, &l)| self.unary(i, l))
                .sum();
            let p: Cost = self
                .edges
                .iter()
                .enumerate()
                .map(|(k, e)| self.pairwise(k, labels[e.a], labels[e.b]))
                .sum();
            u + p
        }
    }

    fn noisy_chain() -> Chain {
        // Three labels; the middle node weakly prefers label 2 but is surrounded by label 0.
        Chain::new(
            vec![
                vec![0, 50, 50],
                vec![0, 50, 50],
                vec![30, 50, 20],
                vec![0, 50, 50],
                vec![0, 50, 50],
            ],
            40,
        )
    }

    fn assert_non_increasing(report: &MoveReport) {
        for w in report.energies.windows(2) {
            assert!(w[1] <= w[0], "energy went up: {:?}", report.energies);
        }
    }

    #[test]
    fn expansion_reaches_smooth_labeling() {
        let mut chain = noisy_chain();
        let mut labels = vec![1; 5];
        let report = Expansion.minimize(&mut chain, &mut labels, 100);

        assert_eq!(labels, vec![0; 5]);
        assert!(report.converged);
        assert_eq!(report.final_energy(), Some(30));
        assert_non_increasing(&report);
    }

    #[test]
    fn icm_never_increases_energy() {
        let mut chain = noisy_chain();
        let mut labels = vec![1, 1, 2, 1, 1];
        let report = Icm.minimize(&mut chain, &mut labels, 100);

        assert!(report.converged);
        assert_non_increasing(&report);
        assert!(report.final_energy().unwrap() <= report.initial_energy().unwrap());
    }

    #[test]
    fn zero_moves_keeps_labels() {
        let mut chain = noisy_chain();
        let mut labels = vec![1; 5];
        let report = Expansion.minimize(&mut chain, &mut labels, 0);
        assert_eq!(labels, vec![1; 5]);
        assert_eq!(report.energies.len(), 1);
        assert!(!report.converged);
    }

    #[test]
    fn factory_selects_backend() {
        assert_eq!(make_minimizer(SolverKind::Icm).name(), "icm");
        assert_eq!(make_minimizer(SolverKind::Expansion).name(), "expansion");
    }
}
