//! # Stereo inference
//!
//! Disparity labeling of one camera graph. The engine starts from the locally best unary labels,
//! then runs the configured move-maker over the full stereo energy: unary costs, edge-aware
//! smoothness, cross-view factors conditioned on the current segmentation, and a uniqueness
//! penalty on pixels of the other view matched more than once.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;

use crate::assoc::AssociationTable;
use crate::cost::{uniqueness_penalty, Cost};
use crate::graph::{stereo_pairwise, CameraGraph, CrossView, Edge, NodeGrid, StereoTerms};
use crate::labels::{Label, LabelSpace};
use crate::params::Params;
use crate::solver::{Energy, Minimizer, MoveReport};

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Progress of a camera's disparity labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceState {
    /// No labels assigned since the last reset.
    Unlabeled,
    /// Labels hold the unary-only warm start.
    PartiallyLabeled,
    /// Move-making ran but stopped on its move budget.
    Refined,
    /// The last pass found no improving move.
    Converged,
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Stereo energy of one camera with its segmentation frozen.
pub(crate) struct StereoEnergy<'a> {
    params: &'a Params,
    labels: &'a LabelSpace,
    grid: &'a NodeGrid,
    terms: &'a StereoTerms,
    cond: Vec<Cost>,
    assoc: &'a mut AssociationTable,
    penalties: Vec<Cost>,
    current: Vec<Label>,
}

/// Drives disparity inference with an installed move-making strategy.
pub struct StereoInference<'m> {
    params: &'m Params,
    labels: &'m LabelSpace,
    minimizer: &'m dyn Minimizer,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl<'a> StereoEnergy<'a> {
    /// Borrow the parts of a camera graph needed by the stereo energy. `cond` holds the
    /// conditioned cross-view factor costs, one row per node.
    pub(crate) fn new(
        params: &'a Params,
        labels: &'a LabelSpace,
        graph: &'a mut CameraGraph,
        cond: Vec<Cost>,
    ) -> (Self, &'a mut Vec<Label>) {
        let CameraGraph {
            grid,
            stereo,
            assoc,
            disp,
            ..
        } = graph;

        // A pixel can be matched at most once per real label.
        let penalties = (0..=labels.real_count() + 1)
            .map(|k| uniqueness_penalty(params, k as u16))
            .collect();

        let energy = Self {
            params,
            labels,
            grid: &*grid,
            terms: &*stereo,
            cond,
            assoc,
            penalties,
            current: disp.clone(),
        };
        (energy, disp)
    }

    fn row(&self, node: usize) -> usize {
        node * self.labels.node_label_count()
    }

    /// Change in total uniqueness penalty if `node` moved its match to `label`'s target, given
    /// the other nodes' current matches.
    fn uniqueness_marginal(&self, node: usize, label: Label) -> Cost {
        match self.terms.target(node, label) {
            None => 0,
            Some(t) => {
                let mut k = self.assoc.count(t) as usize;
                if self.terms.target(node, self.current[node]) == Some(t) {
                    k -= 1;
                }
                self.penalties[k + 1] - self.penalties[k]
            }
        }
    }
}

impl<'a> Energy for StereoEnergy<'a> {
    fn node_count(&self) -> usize {
        self.grid.len()
    }

    fn label_count(&self) -> usize {
        self.labels.node_label_count()
    }

    fn edges(&self) -> &[Edge] {
        &self.grid.edges
    }

    fn node_edges(&self, node: usize) -> &[usize] {
        self.grid.node_edges(node)
    }

    fn unary(&self, node: usize, label: Label) -> Cost {
        self.terms.cost(node, label)
            + self.cond[self.row(node) + label as usize]
            + self.uniqueness_marginal(node, label)
    }

    fn pairwise(&self, edge: usize, a: Label, b: Label) -> Cost {
        stereo_pairwise(self.params, self.labels, self.grid.edges[edge].weight, a, b)
    }

    fn total(&self, labels: &[Label]) -> Cost {
        let mut counts = vec![0u16; self.assoc.counts().len()];
        let mut energy = 0;
        for (node, &l) in labels.iter().enumerate() {
            energy += self.terms.cost(node, l) + self.cond[self.row(node) + l as usize];
            if let Some(t) = self.terms.target(node, l) {
                counts[t] += 1;
            }
        }
        for (k, edge) in self.grid.edges.iter().enumerate() {
            energy += self.pairwise(k, labels[edge.a], labels[edge.b]);
        }
        energy + counts.iter().map(|&c| self.penalties[c as usize]).sum::<Cost>()
    }

    fn sync(&mut self, labels: &[Label]) {
        self.current.copy_from_slice(labels);
        let terms = self.terms;
        self.assoc
            .rebuild(labels.iter().enumerate().map(|(n, &l)| (n, terms.target(n, l))));
    }

    fn relabel(&mut self, node: usize, from: Label, to: Label) {
        if let Some(t) = self.terms.target(node, from) {
            self.assoc.remove(t, node);
        }
        if let Some(t) = self.terms.target(node, to) {
            self.assoc.add(t, node);
        }
        self.current[node] = to;
    }
}

impl<'m> StereoInference<'m> {
    pub fn new(params: &'m Params, labels: &'m LabelSpace, minimizer: &'m dyn Minimizer) -> Self {
        Self {
            params,
            labels,
            minimizer,
        }
    }

    /// Give every node its locally best unary label and rebuild the association table.
    pub fn warm_start(&self, graph: &mut CameraGraph) {
        for node in 0..graph.grid.len() {
            graph.disp[node] = graph.stereo.best_label(node);
        }
        graph.rebuild_associations();
        graph.state = InferenceState::PartiallyLabeled;

        debug!(
            "Camera {} stereo warm start: {} occluded of {} nodes",
            graph.camera,
            graph
                .disp
                .iter()
                .filter(|&&l| l == self.labels.occluded())
                .count(),
            graph.grid.len()
        );
    }

    /// Run move-making over the full stereo energy, `other` summarising the segmentation of the
    /// paired camera.
    pub fn run(&self, graph: &mut CameraGraph, other: &CrossView) -> MoveReport {
        let cond = graph.stereo_conditioning(self.params, self.labels, other);
        let camera = graph.camera;

        let report = {
            let (mut energy, disp) = StereoEnergy::new(self.params, self.labels, graph, cond);
            self.minimizer
                .minimize(&mut energy, disp, self.params.max_move_iterations)
        };
        graph.rebuild_associations();

        graph.state = if report.converged {
            InferenceState::Converged
        } else {
            InferenceState::Refined
        };

        debug!(
            "Camera {} stereo pass ({}): energy {:?} -> {:?}, {} moves accepted, {} rejected",
            camera,
            self.minimizer.name(),
            report.initial_energy(),
            report.final_energy(),
            report.accepted,
            report.rejected
        );

        report
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
