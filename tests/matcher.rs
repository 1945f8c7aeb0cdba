//! # Matcher on synthetic pairs
//!
//! Runs the full stereo segmentation matcher on small generated stereo pairs.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{GrayImage, Luma, RgbImage};
use stereo_segm::prelude::*;

// -----------------------------------------------------------------------------------------------
// HELPERS
// -----------------------------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn full_roi(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([255]))
}

fn texture(x: u32, y: u32) -> u8 {
    ((x * 53 + y * 97 + (x * y) % 7 * 31) % 256) as u8
}

/// Textured pair where the right view sees the scene shifted by `shift` pixels.
fn textured_pair(width: u32, height: u32, shift: u32) -> StereoInput {
    let left = GrayImage::from_fn(width, height, |x, y| Luma([texture(x, y)]));
    let right = GrayImage::from_fn(width, height, |x, y| Luma([texture(x + shift, y)]));
    StereoInput::new(
        CameraInput::new(&left, GrayImage::new(width, height)),
        CameraInput::new(&right, GrayImage::new(width, height)),
    )
}

fn matcher(max_disparity: usize, width: u32, height: u32) -> Result<StereoSegmMatcher> {
    let mut matcher = StereoSegmMatcher::new(Params::with_disparity_range(0, max_disparity))?;
    matcher.initialize(&[full_roi(width, height), full_roi(width, height)], LEFT)?;
    Ok(matcher)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[test]
fn outputs_stay_in_label_domain() -> Result<()> {
    init_logging();

    let params = Params {
        min_disparity: 2,
        max_disparity: 8,
        disparity_step: 2,
        ..Params::default()
    };
    let (w, h) = (14, 8);
    let mut roi = full_roi(w, h);
    for y in 0..h {
        roi.put_pixel(0, y, Luma([0]));
    }

    let mut matcher = StereoSegmMatcher::new(params)?;
    matcher.initialize(&[roi.clone(), roi], RIGHT)?;
    let output = matcher.apply(&textured_pair(w, h, 4))?;

    for head in output.heads.iter() {
        for y in 0..h as usize {
            for x in 0..w as usize {
                let d = head.disparity.get(x, y);
                if x == 0 {
                    assert_eq!(d, DONT_CARE_LABEL);
                } else {
                    assert!(
                        d == OCCLUDED_LABEL || [2, 4, 6, 8].contains(&d),
                        "unexpected label {} at ({}, {})",
                        d,
                        x,
                        y
                    );
                }
            }
        }
        assert!(head
            .mask
            .pixels()
            .all(|p| p[0] as i32 == FOREGROUND_LABEL || p[0] as i32 == BACKGROUND_LABEL));
    }
    Ok(())
}

#[test]
fn identical_views_give_zero_disparity() -> Result<()> {
    init_logging();

    let (w, h) = (16, 12);
    let mut matcher = matcher(4, w, h)?;
    let output = matcher.apply(&textured_pair(w, h, 0))?;

    for head in output.heads.iter() {
        let zeros = head.disparity.as_slice().iter().filter(|&&d| d == 0).count();
        assert!(
            zeros * 10 >= (w * h) as usize * 9,
            "{} of {} pixels at zero disparity",
            zeros,
            w * h
        );
    }
    Ok(())
}

#[test]
fn shifted_square_is_found() -> Result<()> {
    init_logging();

    let square = |offset: u32| {
        GrayImage::from_fn(4, 4, move |x, y| {
            if (offset..offset + 2).contains(&x) && (1..3).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    };
    let input = StereoInput::new(
        CameraInput::new(&square(2), GrayImage::new(4, 4)),
        CameraInput::new(&square(1), GrayImage::new(4, 4)),
    );

    let mut matcher = matcher(1, 4, 4)?;
    let output = matcher.apply(&input)?;

    let left = &output.heads[LEFT].disparity;
    for y in 1..3 {
        assert_eq!(left.get(2, y), 1);
        assert_eq!(left.get(3, y), 1);
    }
    let background = [0, 3]
        .iter()
        .flat_map(|&y| (0..4).map(move |x| (x, y)))
        .filter(|&(x, y)| left.get(x, y) == 0)
        .count();
    assert!(background >= 6, "only {} background pixels at zero", background);

    let right = &output.heads[RIGHT].disparity;
    for y in 1..3 {
        assert_eq!(right.get(1, y), 1);
        assert_eq!(right.get(2, y), 1);
    }
    Ok(())
}

#[test]
fn apply_is_deterministic() -> Result<()> {
    init_logging();

    let (w, h) = (12, 10);
    let img = RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([texture(x, y), texture(y, x), texture(x + 3, y)])
    });
    let shifted = RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([texture(x + 1, y), texture(y, x + 1), texture(x + 4, y)])
    });
    let mut mask = GrayImage::new(w, h);
    for x in 4..8 {
        for y in 3..7 {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    let input = StereoInput::new(
        CameraInput::new(&img, mask.clone()),
        CameraInput::new(&shifted, mask),
    );

    let mut matcher = matcher(3, w, h)?;
    let first = matcher.apply(&input)?;
    let second = matcher.apply(&input)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn all_background_masks_stay_background() -> Result<()> {
    init_logging();

    let (w, h) = (10, 8);
    let mut matcher = StereoSegmMatcher::new(Params {
        max_outer_iterations: 3,
        resegm_passes_per_loop: 4,
        ..Params::with_disparity_range(0, 3)
    })?;
    matcher.initialize(&[full_roi(w, h), full_roi(w, h)], LEFT)?;
    let output = matcher.apply(&textured_pair(w, h, 1))?;

    for head in output.heads.iter() {
        assert!(head.mask.pixels().all(|p| p[0] == 0));
    }
    Ok(())
}

#[test]
fn precomputed_features_are_reused() -> Result<()> {
    init_logging();

    let (w, h) = (12, 8);
    let input = textured_pair(w, h, 2);
    let mut matcher = matcher(3, w, h)?;

    let expected = matcher.apply(&input)?;

    let bytes = matcher.calc_features(&input)?.to_bytes()?;
    matcher.set_next_features(FeaturePacket::from_bytes(&bytes)?);
    assert_eq!(matcher.apply(&input)?, expected);

    // A packet for another disparity range is ignored and recomputed.
    let other = StereoSegmMatcher::new(Params::with_disparity_range(0, 5))?;
    matcher.set_next_features(other.calc_features(&input)?);
    assert_eq!(matcher.apply(&input)?, expected);
    Ok(())
}

#[test]
fn association_counts_follow_labels() -> Result<()> {
    init_logging();

    let (w, h) = (16, 10);
    let mut input = textured_pair(w, h, 2);
    for head in input.heads.iter_mut() {
        for x in 5..10 {
            for y in 3..7 {
                head.mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    // The right ROI drops a column so some left matches fall outside it.
    let mut rois = [full_roi(w, h), full_roi(w, h)];
    for y in 0..h {
        rois[RIGHT].put_pixel(6, y, Luma([0]));
    }

    let mut matcher = StereoSegmMatcher::new(Params {
        max_outer_iterations: 3,
        ..Params::with_disparity_range(0, 3)
    })?;
    matcher.initialize(&rois, LEFT)?;
    let output = matcher.apply(&input)?;

    let report = matcher.last_report().ok_or(Error::NotInitialized("last_report"))?;
    assert!(!report.rounds.is_empty());

    for cam in [LEFT, RIGHT].iter().copied() {
        let other_roi = &rois[1 - cam];
        let mut expected = vec![0u16; (w * h) as usize];
        let disparity = &output.heads[cam].disparity;
        for y in 0..h as usize {
            for x in 0..w as usize {
                let d = disparity.get(x, y);
                if d == OCCLUDED_LABEL || d == DONT_CARE_LABEL {
                    continue;
                }
                let xm = if cam == LEFT {
                    x as i64 - d as i64
                } else {
                    x as i64 + d as i64
                };
                if xm < 0 || xm >= w as i64 || other_roi.get_pixel(xm as u32, y as u32)[0] == 0 {
                    continue;
                }
                expected[y * w as usize + xm as usize] += 1;
            }
        }
        assert_eq!(matcher.association_counts(cam)?, &expected[..], "camera {}", cam);
    }
    Ok(())
}

#[test]
fn misuse_is_reported() -> Result<()> {
    let (w, h) = (6, 4);
    let input = textured_pair(w, h, 0);

    let mut matcher = StereoSegmMatcher::new(Params::with_disparity_range(0, 2))?;
    assert!(matches!(matcher.apply(&input), Err(Error::NotInitialized(_))));
    assert!(matches!(
        matcher.association_counts(LEFT),
        Err(Error::NotInitialized(_))
    ));

    assert!(matches!(
        matcher.initialize(&[full_roi(w, h)], LEFT),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        matcher.initialize(&[full_roi(w, h), GrayImage::new(w, h)], LEFT),
        Err(Error::Roi { camera: 1, .. })
    ));
    assert!(matches!(matcher.apply(&input), Err(Error::NotInitialized(_))));

    matcher.initialize(&[full_roi(w, h), full_roi(w, h)], LEFT)?;

    let bigger = textured_pair(w + 2, h, 0);
    assert!(matches!(matcher.apply(&bigger), Err(Error::Input { .. })));

    let empty = StereoInput::new(
        CameraInput::new(&GrayImage::new(0, 0), GrayImage::new(0, 0)),
        CameraInput::new(&GrayImage::new(0, 0), GrayImage::new(0, 0)),
    );
    assert!(matches!(
        matcher.apply(&empty),
        Err(Error::Input { camera: 0, .. })
    ));

    assert!(matches!(
        ColorImage::new(w as usize, h as usize, 5, vec![0; (w * h * 5) as usize]),
        Err(Error::Channels(5))
    ));

    assert!(matches!(
        StereoSegmMatcher::new(Params::with_disparity_range(0, 300)),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        StereoSegmMatcher::new(Params::with_disparity_range(1 << 31, 1 << 31)),
        Err(Error::Config(_))
    ));
    Ok(())
}

#[test]
fn far_disparities_are_all_occluded() -> Result<()> {
    init_logging();

    let far = OCCLUDED_LABEL as usize - 1;
    let (w, h) = (8, 6);
    let mut matcher = StereoSegmMatcher::new(Params::with_disparity_range(far - 1, far))?;
    matcher.initialize(&[full_roi(w, h), full_roi(w, h)], RIGHT)?;
    let output = matcher.apply(&textured_pair(w, h, 1))?;

    for head in output.heads.iter() {
        assert!(head.disparity.as_slice().iter().all(|&d| d == OCCLUDED_LABEL));
    }
    Ok(())
}
