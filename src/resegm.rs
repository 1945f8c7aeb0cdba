//! # Resegmentation inference
//!
//! Foreground/background labeling of one camera graph with its disparities frozen. Node costs
//! combine a colour appearance model fitted to the current masks, the agreement of the node's
//! disparity with each segment's median disparity, the distance to the initial mask hint, and the
//! cross-view factors conditioned on the current disparities.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;

use crate::cost::{cost_cast, Cost};
use crate::features::FeaturePacket;
use crate::graph::{resegm_pairwise, CameraGraph, CrossView, Edge, NodeGrid};
use crate::labels::{Label, LabelSpace, SEGM_LABEL_COUNT};
use crate::params::Params;
use crate::solver::{Energy, Minimizer, MoveReport};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Colour channels used by the appearance model. Alpha is ignored.
const APPEARANCE_CHANNELS: usize = 3;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Per-segment colour histogram turned into a cost per histogram bin.
#[derive(Debug, Clone)]
pub struct AppearanceModel {
    bins: usize,
    channels: usize,
    costs: [Vec<Cost>; SEGM_LABEL_COUNT],
}

/// Binary segmentation energy of one camera.
pub(crate) struct ResegmEnergy<'a> {
    params: &'a Params,
    grid: &'a NodeGrid,
    unary: Vec<Cost>,
}

/// Drives segmentation inference with an installed move-making strategy.
pub struct ResegmInference<'m> {
    params: &'m Params,
    labels: &'m LabelSpace,
    minimizer: &'m dyn Minimizer,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl AppearanceModel {
    /// Fit colour histograms to the current segmentation of `graph`.
    pub fn fit(params: &Params, feats: &FeaturePacket, graph: &CameraGraph) -> Self {
        let bins = params.appearance_bins;
        let channels = feats.channels.min(APPEARANCE_CHANNELS);
        let size = bins.pow(channels as u32);

        let mut hist = [vec![0u32; size], vec![0u32; size]];
        for (node, &s) in graph.segm.iter().enumerate() {
            let color = feats.color(graph.camera, graph.grid.pixel(node));
            hist[s as usize][Self::bin_of(bins, channels, color)] += 1;
        }

        let trunc = params.unary_max_trunc;
        let to_costs = |h: &Vec<u32>| -> Vec<Cost> {
            let total: u32 = h.iter().sum();
            if total == 0 {
                return vec![trunc; size];
            }
            let denom = (total as usize + size) as f32;
            h.iter()
                .map(|&c| {
                    let p = (c as f32 + 1.0) / denom;
                    cost_cast(-p.ln() * params.appearance_scale).min(trunc)
                })
                .collect()
        };

        Self {
            bins,
            channels,
            costs: [to_costs(&hist[0]), to_costs(&hist[1])],
        }
    }

    pub fn cost(&self, color: &[u8], label: Label) -> Cost {
        self.costs[label as usize][Self::bin_of(self.bins, self.channels, color)]
    }

    fn bin_of(bins: usize, channels: usize, color: &[u8]) -> usize {
        color[..channels]
            .iter()
            .fold(0, |acc, &v| acc * bins + v as usize * bins / 256)
    }
}

/// Median real disparity label of the nodes currently in each segment.
fn segment_medians(labels: &LabelSpace, graph: &CameraGraph) -> [Option<Label>; SEGM_LABEL_COUNT] {
    let mut members: [Vec<Label>; SEGM_LABEL_COUNT] = [Vec::new(), Vec::new()];
    for (&d, &s) in graph.disp.iter().zip(graph.segm.iter()) {
        if labels.is_real(d) {
            members[s as usize].push(d);
        }
    }

    let mut medians = [None; SEGM_LABEL_COUNT];
    for (m, out) in members.iter_mut().zip(medians.iter_mut()) {
        if !m.is_empty() {
            m.sort_unstable();
            *out = Some(m[m.len() / 2]);
        }
    }
    medians
}

impl<'a> Energy for ResegmEnergy<'a> {
    fn node_count(&self) -> usize {
        self.grid.len()
    }

    fn label_count(&self) -> usize {
        SEGM_LABEL_COUNT
    }

    fn edges(&self) -> &[Edge] {
        &self.grid.edges
    }

    fn node_edges(&self, node: usize) -> &[usize] {
        self.grid.node_edges(node)
    }

    fn unary(&self, node: usize, label: Label) -> Cost {
        self.unary[node * SEGM_LABEL_COUNT + label as usize]
    }

    fn pairwise(&self, edge: usize, a: Label, b: Label) -> Cost {
        resegm_pairwise(self.params, self.grid.edges[edge].weight, a, b)
    }

    fn total(&self, labels: &[Label]) -> Cost {
        let unary: Cost = labels
            .iter()
            .enumerate()
            .map(|(n, &l)| self.unary(n, l))
            .sum();
        let pairwise: Cost = self
            .grid
            .edges
            .iter()
            .enumerate()
            .map(|(k, e)| self.pairwise(k, labels[e.a], labels[e.b]))
            .sum();
        unary + pairwise
    }
}

impl<'m> ResegmInference<'m> {
    pub fn new(params: &'m Params, labels: &'m LabelSpace, minimizer: &'m dyn Minimizer) -> Self {
        Self {
            params,
            labels,
            minimizer,
        }
    }

    /// Segmentation costs of every node, two per node, from the current labelings.
    ///
    /// `other` summarises the paired camera's segmentation and `init` this camera's mask hint.
    pub fn unaries(
        &self,
        graph: &CameraGraph,
        feats: &FeaturePacket,
        other: &CrossView,
        init: &CrossView,
    ) -> Vec<Cost> {
        let params = self.params;
        let appearance = AppearanceModel::fit(params, feats, graph);
        let medians = segment_medians(self.labels, graph);
        let both = medians.iter().all(Option::is_some);
        let mut unary = graph.resegm_conditioning(params, self.labels, other);

        for node in 0..graph.grid.len() {
            let px = graph.grid.pixel(node);
            let color = feats.color(graph.camera, px);
            let d = graph.disp[node];

            for s in 0..SEGM_LABEL_COUNT {
                let label = s as Label;
                let mut cost = appearance.cost(color, label);
                cost += init.shape_cost(params, px, label, params.shape_dist_init_scale);

                // Only meaningful once both segments hold matched pixels.
                if let (Some(med), true) = (medians[s], both && self.labels.is_real(d)) {
                    let diff = (d as Cost - med as Cost).abs().min(params.stereo_max_diff);
                    cost += cost_cast(
                        params.disp_consistency_scale * diff as f32 / params.stereo_max_diff as f32,
                    );
                }

                unary[node * SEGM_LABEL_COUNT + s] += cost;
            }
        }

        unary
    }

    /// Run up to `resegm_passes_per_loop` passes, stopping early once a pass changes nothing.
    /// Costs are re-derived at the start of every pass.
    pub fn run(
        &self,
        graph: &mut CameraGraph,
        feats: &FeaturePacket,
        other: &CrossView,
        init: &CrossView,
    ) -> Vec<MoveReport> {
        let mut reports = Vec::with_capacity(self.params.resegm_passes_per_loop);

        for pass in 0..self.params.resegm_passes_per_loop {
            let unary = self.unaries(graph, feats, other, init);
            let CameraGraph { grid, segm, .. } = graph;
            let mut energy = ResegmEnergy {
                params: self.params,
                grid: &*grid,
                unary,
            };
            let report = self
                .minimizer
                .minimize(&mut energy, segm, self.params.resegm_max_moves);

            debug!(
                "Camera {} resegmentation pass {} ({}): energy {:?} -> {:?}",
                graph.camera,
                pass,
                self.minimizer.name(),
                report.initial_energy(),
                report.final_energy()
            );

            let done = report.accepted == 0;
            reports.push(report);
            if done {
                break;
            }
        }

        reports
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CameraInput, StereoInput, LEFT, RIGHT};
    use crate::labels::{BACKGROUND_IDX, FOREGROUND_IDX};
    use crate::solver::{Expansion, Icm};
    use crate::stereo::StereoInference;
    use image::{GrayImage, RgbImage};

    type Fixture = (Params, LabelSpace, FeaturePacket, [CameraGraph; 2], StereoInput);

    /// Identical views over a smooth background with an optional flat red blob.
    fn setup(fg: &[(u32, u32)]) -> Fixture {
        let (w, h) = (8u32, 6u32);
        let img = RgbImage::from_fn(w, h, |x, y| {
            if fg.contains(&(x, y)) {
                image::Rgb([230, 40, 40])
            } else {
                image::Rgb([(x * 20) as u8, 120, (y * 30) as u8])
            }
        });
        let mut mask = GrayImage::new(w, h);
        for &(x, y) in fg {
            mask.put_pixel(x, y, image::Luma([255]));
        }
        let roi = GrayImage::from_pixel(w, h, image::Luma([255]));

        let params = Params {
            resegm_label_scale: 50,
            ..Params::with_disparity_range(0, 2)
        };
        let labels = LabelSpace::new(&params).unwrap();
        let input = StereoInput::new(
            CameraInput::new(&img, mask.clone()),
            CameraInput::new(&img, mask),
        );
        let packet = FeaturePacket::compute(&params, &labels, &input).unwrap();
        let mut graphs = [
            CameraGraph::new(&params, &labels, LEFT, &roi, &roi).unwrap(),
            CameraGraph::new(&params, &labels, RIGHT, &roi, &roi).unwrap(),
        ];
        for g in graphs.iter_mut() {
            g.load_features(&params, &labels, &packet);
            g.reset_labels(&labels, &input.heads[g.camera].mask);
            StereoInference::new(&params, &labels, &Expansion).warm_start(g);
        }
        (params, labels, packet, graphs, input)
    }

    #[test]
    fn empty_segment_costs_truncation() {
        let (params, _, packet, graphs, _) = setup(&[]);
        let model = AppearanceModel::fit(&params, &packet, &graphs[LEFT]);
        let color = packet.color(LEFT, 0);
        assert_eq!(model.cost(color, FOREGROUND_IDX), params.unary_max_trunc);
        assert!(model.cost(color, BACKGROUND_IDX) < params.unary_max_trunc);
    }

    #[test]
    fn all_background_is_a_fixed_point() {
        let (params, labels, packet, mut graphs, input) = setup(&[]);
        let other = CrossView::from_graph(&graphs[RIGHT]);
        let init = CrossView::from_flags(8, 6, &vec![false; 48]);
        assert!(input.heads[LEFT].mask.pixels().all(|p| p[0] == 0));

        for minimizer in [&Expansion as &dyn Minimizer, &Icm].iter() {
            let engine = ResegmInference::new(&params, &labels, *minimizer);
            engine.run(&mut graphs[LEFT], &packet, &other, &init);
            assert!(graphs[LEFT].segm.iter().all(|&s| s == BACKGROUND_IDX));
        }
    }

    #[test]
    fn distinct_foreground_colour_survives() {
        let square = [(3, 2), (4, 2), (3, 3), (4, 3)];
        let (params, labels, packet, mut graphs, _) = setup(&square);
        let other = CrossView::from_graph(&graphs[RIGHT]);
        let init = CrossView::from_graph(&graphs[LEFT]);

        let engine = ResegmInference::new(&params, &labels, &Expansion);
        let reports = engine.run(&mut graphs[LEFT], &packet, &other, &init);
        assert!(!reports.is_empty());
        for r in reports.iter() {
            for w in r.energies.windows(2) {
                assert!(w[1] <= w[0]);
            }
        }

        let graph = &graphs[LEFT];
        for node in 0..graph.grid.len() {
            let (x, y) = graph.grid.coords(node);
            let expected = if square.contains(&(x as u32, y as u32)) {
                FOREGROUND_IDX
            } else {
                BACKGROUND_IDX
            };
            assert_eq!(graph.segm[node], expected, "node at ({}, {})", x, y);
        }
    }

    #[test]
    fn passes_respect_move_budget() {
        let square = [(3, 2), (4, 2), (3, 3), (4, 3)];
        let (mut params, labels, packet, mut graphs, _) = setup(&square);
        params.resegm_max_moves = 1;
        let other = CrossView::from_graph(&graphs[RIGHT]);
        let init = CrossView::from_graph(&graphs[LEFT]);

        let engine = ResegmInference::new(&params, &labels, &Expansion);
        let reports = engine.run(&mut graphs[LEFT], &packet, &other, &init);
        assert!(!reports.is_empty());
        assert!(reports.len() <= params.resegm_passes_per_loop);
        for r in reports.iter() {
            assert!(r.accepted + r.rejected <= 1);
        }
    }
}
