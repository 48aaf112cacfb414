//! Sampling of the shared geometry and the per-branch augmentation flags.

use crate::config::{DatasetConfig, Preprocess};
use crate::types::{BranchParams, GeometryParams};
use rand::Rng;

/// Size the source is expected to have after resizing, used to bound the crop offset.
///
/// Only the `*_and_crop` modes predict a new size; every other mode keeps the input size.
pub fn resize_target(cfg: &DatasetConfig, size: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    match cfg.preprocess {
        Preprocess::ResizeAndCrop => (cfg.load_size, cfg.load_size),
        Preprocess::ScaleWidthAndCrop => {
            let new_h = u64::from(cfg.load_size) * u64::from(h) / u64::from(w.max(1));
            (cfg.load_size, new_h as u32)
        }
        Preprocess::ScaleShortAndCrop => {
            let ratio = f64::from(cfg.load_size) / f64::from(w.min(h).max(1));
            (
                (f64::from(w) * ratio).round_ties_even() as u32,
                (f64::from(h) * ratio).round_ties_even() as u32,
            )
        }
        _ => (w, h),
    }
}

/// Draw one geometry set for an image of `size` (the source half).
pub fn sample_geometry(
    cfg: &DatasetConfig,
    size: (u32, u32),
    rng: &mut dyn rand::RngCore,
) -> GeometryParams {
    let (new_w, new_h) = resize_target(cfg, size);
    let x = rng.random_range(0..=new_w.saturating_sub(cfg.crop_size));
    let y = rng.random_range(0..=new_h.saturating_sub(cfg.crop_size));
    let flip_horizontal = rng.random::<f64>() > 0.5;
    let flip_vertical = rng.random::<f64>() > 0.5;
    let max_rotation = cfg.rotate.min(i32::MAX as u32) as i32;
    let rotation_degrees = rng.random_range(-max_rotation..=max_rotation);
    GeometryParams {
        crop_offset: (x, y),
        flip_horizontal,
        flip_vertical,
        rotation_degrees,
    }
}

/// Bernoulli trial matching `random() < p`.
#[inline]
pub(crate) fn coin(p: f64, rng: &mut dyn rand::RngCore) -> bool {
    rng.random::<f64>() < p
}

/// Build both branch parameter sets from one geometry draw.
///
/// Geometry is copied by value into each branch; flags are drawn per branch in the
/// order grayscale, blur, distort (source before target each time), then the
/// target's white-background flag.
pub fn sample_branches(
    cfg: &DatasetConfig,
    geometry: GeometryParams,
    rng: &mut dyn rand::RngCore,
) -> (BranchParams, BranchParams) {
    let probs = &cfg.augment;
    let mut source = BranchParams::new(geometry);
    let mut target = BranchParams::new(geometry);
    source.grayscale = coin(probs.grayscale_a, rng);
    target.grayscale = coin(probs.grayscale_b, rng);
    source.blur = coin(probs.blur_a, rng);
    target.blur = coin(probs.blur_b, rng);
    source.distort = coin(probs.distort_a, rng);
    target.distort = coin(probs.distort_b, rng);
    target.white_bk = coin(probs.white_bk_a, rng);
    (source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cfg(preprocess: Preprocess, load: u32, crop: u32) -> DatasetConfig {
        DatasetConfig {
            preprocess,
            load_size: load,
            crop_size: crop,
            rotate: 10,
            ..DatasetConfig::default()
        }
    }

    #[test]
    fn resize_targets_follow_mode() {
        let c = cfg(Preprocess::ResizeAndCrop, 286, 256);
        assert_eq!(resize_target(&c, (600, 400)), (286, 286));
        let c = cfg(Preprocess::ScaleWidthAndCrop, 300, 256);
        assert_eq!(resize_target(&c, (600, 401)), (300, 200));
        let c = cfg(Preprocess::ScaleShortAndCrop, 100, 64);
        assert_eq!(resize_target(&c, (300, 200)), (150, 100));
        let c = cfg(Preprocess::ScaleWidth, 100, 64);
        assert_eq!(resize_target(&c, (300, 200)), (300, 200));
        let c = cfg(Preprocess::None, 100, 64);
        assert_eq!(resize_target(&c, (33, 17)), (33, 17));
    }

    #[test]
    fn crop_offsets_and_rotation_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for (mode, size) in [
            (Preprocess::ResizeAndCrop, (512, 512)),
            (Preprocess::ScaleWidthAndCrop, (640, 200)),
            (Preprocess::ScaleShortAndCrop, (90, 300)),
            (Preprocess::Crop, (100, 50)),
        ] {
            let c = cfg(mode, 160, 128);
            let (tw, th) = resize_target(&c, size);
            for _ in 0..200 {
                let g = sample_geometry(&c, size, &mut rng);
                assert!(g.crop_offset.0 <= tw.saturating_sub(128));
                assert!(g.crop_offset.1 <= th.saturating_sub(128));
                assert!((-10..=10).contains(&g.rotation_degrees));
            }
        }
    }

    #[test]
    fn zero_rotation_budget_never_rotates() {
        let c = DatasetConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(sample_geometry(&c, (300, 300), &mut rng).rotation_degrees, 0);
        }
    }

    #[test]
    fn branches_share_geometry_by_value() {
        let mut c = DatasetConfig::default();
        c.augment.grayscale_a = 1.0;
        c.augment.blur_b = 1.0;
        let mut rng = StdRng::seed_from_u64(3);
        let geometry = sample_geometry(&c, (400, 300), &mut rng);
        let (mut source, target) = sample_branches(&c, geometry, &mut rng);
        assert_eq!(source.geometry, target.geometry);
        assert!(source.grayscale && !target.grayscale);
        assert!(!source.blur && target.blur);
        source.geometry.crop_offset = (999, 999);
        assert_eq!(target.geometry, geometry);
    }
}
