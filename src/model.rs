//! # Graph model data
//!
//! Owns the graph models of both camera heads and alternates between the stereo and
//! resegmentation sub-problems until the labelings stop changing or the round budget runs out.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;
use log::{debug, info};

use crate::cost::Cost;
use crate::error::*;
use crate::features::FeaturePacket;
use crate::frame::{other_camera, StereoInput, StereoOutput, CAMERA_COUNT};
use crate::graph::{CameraGraph, CrossView};
use crate::labels::LabelSpace;
use crate::params::Params;
use crate::resegm::ResegmInference;
use crate::solver::{make_minimizer, Minimizer, MoveReport};
use crate::stereo::StereoInference;

#[cfg(feature = "statistics")]
use log::warn;
#[cfg(feature = "statistics")]
use plotters::prelude::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Outcome of one alternation round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    /// Stereo passes, primary camera first.
    pub stereo: Vec<MoveReport>,
    /// Resegmentation passes, primary camera's first.
    pub resegm: Vec<MoveReport>,
    /// Disparity and segmentation labels changed over both cameras during the round.
    pub label_changes: usize,
}

/// Outcome of a full `apply`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub rounds: Vec<RoundReport>,
    /// False if the round budget ran out before the labelings settled.
    pub converged: bool,
}

/// Graph models of both heads plus the installed move-making strategies.
pub struct GraphModelData {
    graphs: [CameraGraph; CAMERA_COUNT],
    primary: usize,
    width: usize,
    height: usize,
    stereo_solver: Box<dyn Minimizer>,
    resegm_solver: Box<dyn Minimizer>,
    last_report: Option<RunReport>,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl RunReport {
    /// Final stereo energy of every round, summed over both cameras.
    pub fn stereo_energies(&self) -> Vec<Cost> {
        self.rounds
            .iter()
            .map(|r| r.stereo.iter().filter_map(MoveReport::final_energy).sum())
            .collect()
    }
}

impl GraphModelData {
    /// Build both camera graphs over their regions of interest.
    pub fn new(
        params: &Params,
        labels: &LabelSpace,
        rois: &[GrayImage],
        primary: usize,
    ) -> Result<Self> {
        if rois.len() != CAMERA_COUNT {
            return Err(Error::Config(format!(
                "expected {} ROI masks, got {}",
                CAMERA_COUNT,
                rois.len()
            )));
        }
        if primary >= CAMERA_COUNT {
            return Err(Error::Config(format!(
                "primary camera {} out of range",
                primary
            )));
        }

        let (width, height) = rois[0].dimensions();
        for (camera, roi) in rois.iter().enumerate() {
            if roi.width() == 0 || roi.height() == 0 {
                return Err(Error::Roi {
                    camera,
                    reason: "mask has zero size".into(),
                });
            }
            if roi.dimensions() != (width, height) {
                return Err(Error::Roi {
                    camera,
                    reason: format!(
                        "mask is {}x{}, expected {}x{}",
                        roi.width(),
                        roi.height(),
                        width,
                        height
                    ),
                });
            }
        }

        let build = |camera: usize| {
            CameraGraph::new(params, labels, camera, &rois[camera], &rois[other_camera(camera)])
        };
        let graphs = [build(0)?, build(1)?];

        debug!(
            "Graph model built: {}x{}, {} + {} nodes, {} labels, primary camera {}",
            width,
            height,
            graphs[0].grid.len(),
            graphs[1].grid.len(),
            labels.node_label_count(),
            primary
        );

        Ok(Self {
            graphs,
            primary,
            width: width as usize,
            height: height as usize,
            stereo_solver: make_minimizer(params.stereo_solver),
            resegm_solver: make_minimizer(params.resegm_solver),
            last_report: None,
        })
    }

    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn graph(&self, camera: usize) -> &CameraGraph {
        &self.graphs[camera]
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Run the bootstrap round and the alternation rounds on a stereo input whose features have
    /// already been computed.
    pub fn apply(
        &mut self,
        params: &Params,
        labels: &LabelSpace,
        feats: &FeaturePacket,
        input: &StereoInput,
    ) -> Result<StereoOutput> {
        let (width, height) = input.validate()?;
        if (width, height) != self.size() {
            return Err(Error::Input {
                camera: self.primary,
                reason: format!(
                    "image is {}x{}, model was initialized for {}x{}",
                    width, height, self.width, self.height
                ),
            });
        }
        feats.check_compatible(params, labels, width, height)?;

        for graph in self.graphs.iter_mut() {
            graph.load_features(params, labels, feats);
            graph.reset_labels(labels, &input.heads[graph.camera].mask);
        }
        let init = [
            CrossView::from_graph(&self.graphs[0]),
            CrossView::from_graph(&self.graphs[1]),
        ];

        let stereo = StereoInference::new(params, labels, &*self.stereo_solver);
        let resegm = ResegmInference::new(params, labels, &*self.resegm_solver);
        let order = [self.primary, other_camera(self.primary)];

        // ---- BOOTSTRAP ----

        for &cam in order.iter() {
            stereo.warm_start(&mut self.graphs[cam]);
        }

        // ---- ALTERNATION ----

        let mut report = RunReport::default();
        for round in 0..params.max_outer_iterations {
            let prev: Vec<_> = self
                .graphs
                .iter()
                .map(|g| (g.disp.clone(), g.segm.clone()))
                .collect();
            let mut round_report = RoundReport::default();

            for &cam in order.iter() {
                let other = CrossView::from_graph(&self.graphs[other_camera(cam)]);
                round_report
                    .stereo
                    .push(stereo.run(&mut self.graphs[cam], &other));
            }

            for &cam in order.iter() {
                let other = CrossView::from_graph(&self.graphs[other_camera(cam)]);
                let passes = resegm.run(&mut self.graphs[cam], feats, &other, &init[cam]);
                round_report.resegm.extend(passes);
            }

            round_report.label_changes = self
                .graphs
                .iter()
                .zip(prev.iter())
                .map(|(g, (disp, segm))| changed(&g.disp, disp) + changed(&g.segm, segm))
                .sum();

            debug!(
                "Round {}: {} labels changed, stereo energies {:?}",
                round,
                round_report.label_changes,
                round_report
                    .stereo
                    .iter()
                    .map(|r| r.final_energy())
                    .collect::<Vec<_>>()
            );

            let settled = round_report.label_changes <= params.convergence_label_changes;
            report.rounds.push(round_report);
            if settled {
                report.converged = true;
                break;
            }
        }

        if report.converged {
            info!("Stereo segmentation converged after {} rounds", report.rounds.len());
        } else {
            info!(
                "Stereo segmentation stopped after {} rounds without converging",
                report.rounds.len()
            );
        }

        // ---- PLOTTING ----
        #[cfg(feature = "statistics")]
        {
            if let Err(e) = plot_energy_history(&report) {
                warn!("Could not plot the energy history: {}", e);
            }
        }

        self.last_report = Some(report);

        Ok(StereoOutput {
            heads: [
                self.graphs[0].to_output(labels),
                self.graphs[1].to_output(labels),
            ],
        })
    }
}

fn changed<T: PartialEq>(now: &[T], before: &[T]) -> usize {
    now.iter().zip(before.iter()).filter(|(a, b)| a != b).count()
}

#[cfg(feature = "statistics")]
fn plot_energy_history(report: &RunReport) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let energies = report.stereo_energies();
    if energies.is_empty() {
        return Ok(());
    }
    let lo = energies.iter().copied().min().unwrap_or(0);
    let hi = energies.iter().copied().max().unwrap_or(0) + 1;

    std::fs::create_dir_all("plots/stereo_segm")?;
    let area = BitMapBackend::new("plots/stereo_segm/energy.png", (800, 600)).into_drawing_area();
    area.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&area)
        .caption("Stereo energy per round", ("sans-serif", 20).into_font())
        .margin(5)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_ranged(0..energies.len(), lo..hi)?;

    chart.configure_mesh().draw()?;
    chart
        .draw_series(LineSeries::new(energies.into_iter().enumerate(), &RED))?
        .label("Stereo energy")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CameraInput, LEFT, RIGHT};
    use crate::labels::BACKGROUND_IDX;

    fn full_roi(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, image::Luma([255]))
    }

    #[test]
    fn roi_checks() {
        let params = Params::with_disparity_range(0, 2);
        let labels = LabelSpace::new(&params).unwrap();

        let one = [full_roi(4, 4)];
        assert!(matches!(
            GraphModelData::new(&params, &labels, &one, 0),
            Err(Error::Config(_))
        ));

        let mismatched = [full_roi(4, 4), full_roi(5, 4)];
        assert!(matches!(
            GraphModelData::new(&params, &labels, &mismatched, 0),
            Err(Error::Roi { camera: 1, .. })
        ));

        let zero = [GrayImage::new(0, 0), GrayImage::new(0, 0)];
        assert!(matches!(
            GraphModelData::new(&params, &labels, &zero, 0),
            Err(Error::Roi { camera: 0, .. })
        ));

        let ok = [full_roi(4, 4), full_roi(4, 4)];
        assert!(matches!(
            GraphModelData::new(&params, &labels, &ok, 2),
            Err(Error::Config(_))
        ));
        assert!(GraphModelData::new(&params, &labels, &ok, RIGHT).is_ok());
    }

    #[test]
    fn alternation_reports_each_round() {
        let (w, h) = (6u32, 5u32);
        let img = GrayImage::from_fn(w, h, |x, y| image::Luma([((x * 37 + y * 71) % 256) as u8]));
        let params = Params::with_disparity_range(0, 2);
        let labels = LabelSpace::new(&params).unwrap();
        let input = StereoInput::new(
            CameraInput::new(&img, GrayImage::new(w, h)),
            CameraInput::new(&img, GrayImage::new(w, h)),
        );
        let feats = FeaturePacket::compute(&params, &labels, &input).unwrap();

        let rois = [full_roi(w, h), full_roi(w, h)];
        let mut model = GraphModelData::new(&params, &labels, &rois, LEFT).unwrap();
        model.apply(&params, &labels, &feats, &input).unwrap();

        let report = model.last_report().unwrap();
        assert!(!report.rounds.is_empty());
        assert!(report.rounds.len() <= params.max_outer_iterations);
        for round in report.rounds.iter() {
            assert_eq!(round.stereo.len(), CAMERA_COUNT);
        }
        assert_eq!(report.stereo_energies().len(), report.rounds.len());
        assert!(model.graph(LEFT).segm.iter().all(|&s| s == BACKGROUND_IDX));
    }
}
