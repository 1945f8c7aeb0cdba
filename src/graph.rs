//! # Graph model
//!
//! Per-camera graphical model over the pixels of a region of interest. Each in-ROI pixel is a
//! node; nodes are linked to their 4-neighbours. The model holds the stereo unary cost table, the
//! edge-aware pairwise weights, the strided cross-view factors and the current labelings of both
//! sub-problems.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;
use imageproc::distance_transform::{distance_transform, Norm};
use rayon::prelude::*;

use crate::assoc::AssociationTable;
use crate::cost::{cost_cast, gradient_weight, weighted, Cost, WEIGHT_ONE};
use crate::disparity::DisparityMap;
use crate::error::*;
use crate::features::FeaturePacket;
use crate::frame::{matched_column, CameraOutput};
use crate::labels::{
    Label, LabelSpace, BACKGROUND_IDX, FOREGROUND_IDX, FOREGROUND_LABEL, SEGM_LABEL_COUNT,
};
use crate::params::Params;
use crate::stereo::InferenceState;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const NO_NODE: usize = usize::MAX;
const NO_TARGET: usize = usize::MAX;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Link between two 4-neighbour nodes, `a` preceding `b` in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
    /// Edge-aware weight in thousandths.
    pub weight: Cost,
}

/// Nodes and edges of one camera's region of interest.
#[derive(Debug, Clone)]
pub struct NodeGrid {
    pub width: usize,
    pub height: usize,
    px_of_node: Vec<usize>,
    node_of_px: Vec<usize>,
    pub edges: Vec<Edge>,
    node_edges: Vec<Vec<usize>>,
}

/// Stereo unary costs and the pixel each (node, real label) pair matches in the other view.
#[derive(Debug, Clone, Default)]
pub struct StereoTerms {
    label_count: usize,
    real_count: usize,
    pub unary: Vec<Cost>,
    targets: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    /// Ties the node's segmentation to the other camera's mask at the matched pixel.
    ShapeConsistency,
    /// Ties the node's segmentation to its own disparity.
    StereoSegm,
}

/// Factor over a node, its two labels and the other camera's segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HigherOrderFactor {
    pub node: usize,
    pub kind: FactorKind,
}

/// Segmentation of one camera summarised for the other camera's cost terms.
#[derive(Debug, Clone)]
pub struct CrossView {
    dist_to_fg: Vec<u8>,
    dist_to_bg: Vec<u8>,
}

/// Graph model of one camera head.
#[derive(Debug, Clone)]
pub struct CameraGraph {
    pub camera: usize,
    pub grid: NodeGrid,
    pub stereo: StereoTerms,
    pub factors: Vec<HigherOrderFactor>,
    pub assoc: AssociationTable,
    /// Current disparity label of every node.
    pub disp: Vec<Label>,
    /// Current segmentation label of every node.
    pub segm: Vec<Label>,
    pub state: InferenceState,
    other_roi: Vec<bool>,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl NodeGrid {
    /// Create one node per non-zero ROI pixel, in row-major order.
    pub fn from_roi(roi: &GrayImage) -> Self {
        let (width, height) = (roi.width() as usize, roi.height() as usize);
        let mut px_of_node = Vec::new();
        let mut node_of_px = vec![NO_NODE; width * height];

        for (px, p) in roi.pixels().enumerate() {
            if p[0] > 0 {
                node_of_px[px] = px_of_node.len();
                px_of_node.push(px);
            }
        }

        let mut edges = Vec::new();
        let mut node_edges = vec![Vec::new(); px_of_node.len()];
        for (a, &px) in px_of_node.iter().enumerate() {
            let (x, y) = (px % width, px / width);
            let right = if x + 1 < width { node_of_px[px + 1] } else { NO_NODE };
            let down = if y + 1 < height { node_of_px[px + width] } else { NO_NODE };
            for &b in [right, down].iter() {
                if b != NO_NODE {
                    node_edges[a].push(edges.len());
                    node_edges[b].push(edges.len());
                    edges.push(Edge {
                        a,
                        b,
                        weight: WEIGHT_ONE,
                    });
                }
            }
        }

        Self {
            width,
            height,
            px_of_node,
            node_of_px,
            edges,
            node_edges,
        }
    }

    pub fn len(&self) -> usize {
        self.px_of_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.px_of_node.is_empty()
    }

    /// Flat pixel index (`row * width + column`) of a node.
    pub fn pixel(&self, node: usize) -> usize {
        self.px_of_node[node]
    }

    pub fn coords(&self, node: usize) -> (usize, usize) {
        let px = self.px_of_node[node];
        (px % self.width, px / self.width)
    }

    /// Node covering a flat pixel index, if the pixel lies in the ROI.
    pub fn node(&self, px: usize) -> Option<usize> {
        Some(self.node_of_px[px]).filter(|&n| n != NO_NODE)
    }

    /// Edges incident to a node.
    pub fn node_edges(&self, node: usize) -> &[usize] {
        &self.node_edges[node]
    }
}

impl StereoTerms {
    pub fn cost(&self, node: usize, label: Label) -> Cost {
        self.unary[node * self.label_count + label as usize]
    }

    /// Pixel of the other view matched by `node` at `label`, for real labels that land inside
    /// the other image's ROI.
    pub fn target(&self, node: usize, label: Label) -> Option<usize> {
        if (label as usize) < self.real_count {
            Some(self.targets[node * self.real_count + label as usize]).filter(|&t| t != NO_TARGET)
        } else {
            None
        }
    }

    /// Label with the lowest unary cost, ties going to the lowest index.
    pub fn best_label(&self, node: usize) -> Label {
        let row = &self.unary[node * self.label_count..(node + 1) * self.label_count];
        row.iter()
            .enumerate()
            .fold(0, |best, (l, &c)| if c < row[best] { l } else { best }) as Label
    }
}

impl CrossView {
    /// Summarise a segmentation given as a foreground flag per pixel.
    pub fn from_flags(width: usize, height: usize, fg: &[bool]) -> Self {
        let fg_img = GrayImage::from_fn(width as u32, height as u32, |x, y| {
            image::Luma([if fg[y as usize * width + x as usize] { 255 } else { 0 }])
        });
        let bg_img = GrayImage::from_fn(width as u32, height as u32, |x, y| {
            image::Luma([if fg[y as usize * width + x as usize] { 0 } else { 255 }])
        });

        Self {
            dist_to_fg: distance_transform(&fg_img, Norm::L1).into_raw(),
            dist_to_bg: distance_transform(&bg_img, Norm::L1).into_raw(),
        }
    }

    /// Summarise the current segmentation of a camera graph. Pixels outside its ROI are
    /// background.
    pub fn from_graph(graph: &CameraGraph) -> Self {
        let grid = &graph.grid;
        let mut fg = vec![false; grid.width * grid.height];
        for (node, &s) in graph.segm.iter().enumerate() {
            fg[grid.pixel(node)] = s == FOREGROUND_IDX;
        }
        Self::from_flags(grid.width, grid.height, &fg)
    }

    /// L1 distance from `px` to the nearest pixel segmented as `label`, saturating at 255.
    pub fn distance(&self, px: usize, label: Label) -> u8 {
        if label == FOREGROUND_IDX {
            self.dist_to_fg[px]
        } else {
            self.dist_to_bg[px]
        }
    }

    /// Capped shape distance cost used by the shape terms.
    pub fn shape_cost(&self, params: &Params, px: usize, label: Label, scale: f32) -> Cost {
        let dist = (self.distance(px, label) as f32).min(params.shape_dist_px_max);
        cost_cast(params.shape_dist_scale * scale * dist)
    }
}

impl CameraGraph {
    /// Build the node grid of `camera` over its ROI. `other_roi` is the ROI of the paired
    /// camera, used to decide which matches are valid.
    pub fn new(
        params: &Params,
        labels: &LabelSpace,
        camera: usize,
        roi: &GrayImage,
        other_roi: &GrayImage,
    ) -> Result<Self> {
        let grid = NodeGrid::from_roi(roi);
        if grid.is_empty() {
            return Err(Error::Roi {
                camera,
                reason: "mask has no pixel of interest".into(),
            });
        }

        let mut factors = Vec::new();
        for node in 0..grid.len() {
            let (x, y) = grid.coords(node);
            if x % params.ho_resegm_stride == 0 && y % params.ho_resegm_stride == 0 {
                factors.push(HigherOrderFactor {
                    node,
                    kind: FactorKind::ShapeConsistency,
                });
            }
            if x % params.ho_stereo_stride == 0 && y % params.ho_stereo_stride == 0 {
                factors.push(HigherOrderFactor {
                    node,
                    kind: FactorKind::StereoSegm,
                });
            }
        }

        let n = grid.len();
        let pixel_count = grid.width * grid.height;
        Ok(Self {
            camera,
            grid,
            stereo: StereoTerms::default(),
            factors,
            assoc: AssociationTable::new(pixel_count, labels.real_count()),
            disp: vec![labels.occluded(); n],
            segm: vec![BACKGROUND_IDX; n],
            state: InferenceState::Unlabeled,
            other_roi: other_roi.pixels().map(|p| p[0] > 0).collect(),
        })
    }

    /// Rebuild the stereo unary table and the pairwise weights from a feature packet.
    pub fn load_features(&mut self, params: &Params, labels: &LabelSpace, feats: &FeaturePacket) {
        let cam = &feats.cameras[self.camera];
        let (width, real) = (self.grid.width, labels.real_count());
        let label_count = labels.node_label_count();

        let rows: Vec<(Vec<Cost>, Vec<usize>)> = (0..self.grid.len())
            .into_par_iter()
            .map(|node| {
                let px = self.grid.pixel(node);
                let (x, y) = (px % width, px / width);
                let mut costs = Vec::with_capacity(label_count);
                let mut targets = Vec::with_capacity(real);

                for l in 0..real {
                    let target = matched_column(self.camera, x, labels.offset(l as Label), width)
                        .map(|xm| y * width + xm)
                        .filter(|&t| self.other_roi[t]);
                    match target {
                        Some(t) => {
                            costs.push(cam.affinity[px * real + l].min(params.unary_max_trunc));
                            targets.push(t);
                        }
                        None => {
                            costs.push(params.unary_oob_cost.min(params.unary_max_trunc));
                            targets.push(NO_TARGET);
                        }
                    }
                }
                costs.push(params.unary_occluded_cost.min(params.unary_max_trunc));
                (costs, targets)
            })
            .collect();

        let mut unary = Vec::with_capacity(self.grid.len() * label_count);
        let mut targets = Vec::with_capacity(self.grid.len() * real);
        for (c, t) in rows {
            unary.extend(c);
            targets.extend(t);
        }
        self.stereo = StereoTerms {
            label_count,
            real_count: real,
            unary,
            targets,
        };

        for edge in self.grid.edges.iter_mut() {
            let ga = cam.gradient[self.grid.px_of_node[edge.a]];
            let gb = cam.gradient[self.grid.px_of_node[edge.b]];
            edge.weight = gradient_weight(params, ga.max(gb));
        }
    }

    /// Reset the segmentation labels from a foreground hint and forget previous inference.
    pub fn reset_labels(&mut self, labels: &LabelSpace, mask: &GrayImage) {
        let hint = mask.as_raw();
        for node in 0..self.grid.len() {
            self.segm[node] = if hint[self.grid.pixel(node)] > 0 {
                FOREGROUND_IDX
            } else {
                BACKGROUND_IDX
            };
        }
        for d in self.disp.iter_mut() {
            *d = labels.occluded();
        }
        self.assoc.clear();
        self.state = InferenceState::Unlabeled;
    }

    /// Cost of a cross-view factor for a given disparity and segmentation label of its node.
    pub fn factor_cost(
        &self,
        params: &Params,
        labels: &LabelSpace,
        factor: &HigherOrderFactor,
        disp: Label,
        segm: Label,
        other: &CrossView,
    ) -> Cost {
        match factor.kind {
            FactorKind::ShapeConsistency => match self.stereo.target(factor.node, disp) {
                Some(t) => other.shape_cost(params, t, segm, params.shape_dist_interspec_scale),
                None => 0,
            },
            FactorKind::StereoSegm => {
                if segm == FOREGROUND_IDX && disp == labels.occluded() {
                    params.fg_occlusion_cost
                } else {
                    0
                }
            }
        }
    }

    /// Factor costs over disparity labels, with segmentation fixed at its current value.
    pub fn stereo_conditioning(
        &self,
        params: &Params,
        labels: &LabelSpace,
        other: &CrossView,
    ) -> Vec<Cost> {
        let lc = labels.node_label_count();
        let mut cond = vec![0; self.grid.len() * lc];
        for factor in self.factors.iter() {
            let segm = self.segm[factor.node];
            for l in 0..lc {
                cond[factor.node * lc + l] +=
                    self.factor_cost(params, labels, factor, l as Label, segm, other);
            }
        }
        cond
    }

    /// Factor costs over segmentation labels, with disparity fixed at its current value.
    pub fn resegm_conditioning(
        &self,
        params: &Params,
        labels: &LabelSpace,
        other: &CrossView,
    ) -> Vec<Cost> {
        let mut cond = vec![0; self.grid.len() * SEGM_LABEL_COUNT];
        for factor in self.factors.iter() {
            let disp = self.disp[factor.node];
            for s in 0..SEGM_LABEL_COUNT {
                cond[factor.node * SEGM_LABEL_COUNT + s] +=
                    self.factor_cost(params, labels, factor, disp, s as Label, other);
            }
        }
        cond
    }

    /// Rebuild the association table from the current disparity labels.
    pub fn rebuild_associations(&mut self) {
        let Self {
            assoc, stereo, disp, ..
        } = self;
        assoc.rebuild(disp.iter().enumerate().map(|(n, &l)| (n, stereo.target(n, l))));
    }

    /// Translate the current labelings to output maps.
    pub fn to_output(&self, labels: &LabelSpace) -> CameraOutput {
        let (width, height) = (self.grid.width, self.grid.height);
        let mut disparity = DisparityMap::new(width, height);
        let mut mask = GrayImage::new(width as u32, height as u32);

        for node in 0..self.grid.len() {
            let (x, y) = self.grid.coords(node);
            disparity.put(x, y, labels.to_output(self.disp[node]));
            if self.segm[node] == FOREGROUND_IDX {
                mask.put_pixel(x as u32, y as u32, image::Luma([FOREGROUND_LABEL as u8]));
            }
        }

        CameraOutput { disparity, mask }
    }
}

/// Pairwise stereo cost: truncated linear between real labels, a fixed cost between a real
/// label and the occluded sentinel, scaled by the edge weight.
pub fn stereo_pairwise(
    params: &Params,
    labels: &LabelSpace,
    weight: Cost,
    a: Label,
    b: Label,
) -> Cost {
    if a == b {
        return 0;
    }
    let base = if labels.is_real(a) && labels.is_real(b) {
        let diff = (a as Cost - b as Cost).abs().min(params.stereo_max_diff);
        (diff * params.stereo_label_scale).min(params.lblsim_max_trunc)
    } else {
        params.lblsim_max_occl
    };
    weighted(base, weight)
}

/// Pairwise segmentation cost: Potts term scaled by the edge weight.
pub fn resegm_pairwise(params: &Params, weight: Cost, a: Label, b: Label) -> Cost {
    if a == b {
        0
    } else {
        weighted(params.resegm_label_scale, weight)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
