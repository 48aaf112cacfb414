//! Integration tests for end-to-end paired_dataset workflows.
//!
//! These tests build small on-disk datasets and check that:
//! 1. Combined files split into aligned source/target tensors
//! 2. Configuration problems surface before any file is touched
//! 3. Repetition, caching and seeding behave across the whole loader

use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
use paired_dataset::{DatasetConfig, PairedDataset, PairedDatasetError, Preprocess};
use std::fs;
use std::path::{Path, PathBuf};

/// Create `<root>/<phase>` and return it.
fn phase_dir(root: &Path, phase: &str) -> anyhow::Result<PathBuf> {
    let dir = root.join(phase);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn config(root: &Path) -> DatasetConfig {
    DatasetConfig {
        dataroot: root.to_path_buf(),
        ..DatasetConfig::default()
    }
}

/// Side-by-side image whose halves are distinct gradients.
fn combined_gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        if x < w / 2 {
            Rgb([(x * 2 % 256) as u8, (y * 2 % 256) as u8, 40])
        } else {
            Rgb([90, (x % 256) as u8, (y * 3 % 256) as u8])
        }
    })
}

#[test]
fn workflow_combined_file_to_aligned_tensors() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    let img = combined_gradient(256, 128);
    img.save(dir.join("pair.png"))?;

    let cfg = DatasetConfig {
        load_size: 128,
        crop_size: 128,
        preprocess: Preprocess::ResizeAndCrop,
        no_flip: true,
        ..config(tmp.path())
    };
    let ds = PairedDataset::new(cfg)?;
    let sample = ds.get_sample(0)?;
    assert_eq!(sample.source.shape(), [3, 128, 128]);
    assert_eq!(sample.target.shape(), [3, 128, 128]);
    let (lo, hi) = sample.source.min_max();
    assert!(lo >= -1.0 && hi <= 1.0);

    let whole = DynamicImage::ImageRgb8(img);
    let left = whole.crop_imm(0, 0, 128, 128).to_rgb8();
    let right = whole.crop_imm(128, 0, 128, 128).to_rgb8();
    assert_eq!(sample.source.to_image().to_rgb8(), left);
    assert_eq!(sample.target.to_image().to_rgb8(), right);
    Ok(())
}

#[test]
fn workflow_load_smaller_than_crop_is_fatal() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    combined_gradient(64, 32).save(dir.join("pair.png"))?;
    let cfg = DatasetConfig {
        load_size: 64,
        crop_size: 128,
        ..config(tmp.path())
    };
    let err = PairedDataset::new(cfg).unwrap_err();
    assert!(matches!(err, PairedDatasetError::Configuration { .. }));
    Ok(())
}

#[test]
fn workflow_repeat_concatenates_sorted_listing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    for name in ["e", "c", "a", "d", "b"] {
        combined_gradient(16, 8).save(dir.join(format!("{name}.png")))?;
    }
    let cfg = DatasetConfig {
        load_size: 8,
        crop_size: 8,
        repeat_dataset_count: 3,
        ..config(tmp.path())
    };
    let ds = PairedDataset::new(cfg)?;
    assert_eq!(ds.len(), 15);
    let names: Vec<_> = ds
        .paths()
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    let once = ["a", "b", "c", "d", "e"];
    let expected: Vec<_> = once.iter().cycle().take(15).map(|s| s.to_string()).collect();
    assert_eq!(names, expected);
    // Repeated entries resolve to the same file.
    assert_eq!(ds.get_sample(2)?.source_path, ds.get_sample(7)?.source_path);
    Ok(())
}

#[test]
fn workflow_transparent_source_flattens_to_white() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    let img = RgbaImage::from_pixel(16, 8, Rgba([10, 20, 30, 0]));
    img.save(dir.join("alpha.png"))?;

    let mut cfg = DatasetConfig {
        load_size: 8,
        crop_size: 8,
        no_flip: true,
        ..config(tmp.path())
    };
    cfg.augment.white_bk_a = 1.0;
    let ds = PairedDataset::new(cfg)?;
    let sample = ds.get_sample(0)?;
    assert!(sample.source.data.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    // Target is coerced to RGB without compositing, so the stored color survives.
    let target = sample.target.to_image().to_rgb8();
    assert!(target.pixels().all(|p| p.0 == [10, 20, 30]));
    Ok(())
}

#[test]
fn workflow_odd_width_gives_target_the_extra_column() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    combined_gradient(17, 6).save(dir.join("odd.png"))?;
    let cfg = DatasetConfig {
        load_size: 8,
        crop_size: 8,
        preprocess: Preprocess::Crop,
        no_flip: true,
        ..config(tmp.path())
    };
    let ds = PairedDataset::new(cfg)?;
    let sample = ds.get_sample(0)?;
    // Source is 8x6 and never cropped; target is 9x6 and cropped to 8 wide.
    assert_eq!(sample.source.shape(), [3, 6, 8]);
    assert_eq!(sample.target.shape(), [3, 6, 8]);
    Ok(())
}

#[test]
fn workflow_shared_geometry_keeps_identical_halves_identical() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    let half = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
    let combined = RgbImage::from_fn(64, 32, |x, y| *half.get_pixel(x % 32, y));
    combined.save(dir.join("twin.png"))?;

    let cfg = DatasetConfig {
        load_size: 40,
        crop_size: 32,
        rotate: 20,
        flip_x: true,
        seed: Some(17),
        ..config(tmp.path())
    };
    let ds = PairedDataset::new(cfg)?;
    for index in 0..ds.len() {
        let sample = ds.get_sample(index)?;
        assert_eq!(sample.source, sample.target);
    }
    Ok(())
}

#[test]
fn workflow_seed_makes_samples_reproducible() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    for i in 0..3 {
        combined_gradient(96, 48).save(dir.join(format!("{i}.png")))?;
    }
    let mut cfg = DatasetConfig {
        load_size: 40,
        crop_size: 32,
        rotate: 15,
        seed: Some(42),
        ..config(tmp.path())
    };
    cfg.augment.grayscale_a = 0.5;
    cfg.augment.blur_b = 0.5;
    cfg.augment.distort_a = 0.5;
    cfg.augment.distort_b = 0.5;

    let first = PairedDataset::new(cfg.clone())?;
    let second = PairedDataset::new(cfg)?;
    for index in (0..3).rev() {
        let a = first.get_sample(index)?;
        let b = second.get_sample(index)?;
        assert_eq!(a.source, b.source);
        assert_eq!(a.target, b.target);
    }
    Ok(())
}

#[test]
fn workflow_cache_holds_at_most_cache_num_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    for i in 0..3 {
        combined_gradient(16, 8).save(dir.join(format!("{i}.png")))?;
    }
    let cfg = DatasetConfig {
        load_size: 8,
        crop_size: 8,
        cache_num: 2,
        ..config(tmp.path())
    };
    let ds = PairedDataset::new(cfg)?;
    for index in 0..ds.len() {
        ds.get_sample(index)?;
    }
    assert_eq!(ds.cache().len(), 2);
    // Cached files still load after they disappear from disk; uncached ones do not.
    fs::remove_file(&ds.paths()[0])?;
    fs::remove_file(&ds.paths()[2])?;
    assert!(ds.get_sample(0).is_ok());
    assert!(matches!(
        ds.get_sample(2),
        Err(PairedDatasetError::Io { .. })
    ));
    Ok(())
}

#[test]
fn workflow_single_channel_branches() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = phase_dir(tmp.path(), "train")?;
    combined_gradient(32, 16).save(dir.join("pair.png"))?;
    let cfg = DatasetConfig {
        load_size: 16,
        crop_size: 16,
        input_nc: 1,
        ..config(tmp.path())
    };
    let ds = PairedDataset::new(cfg)?;
    let sample = ds.get_sample(0)?;
    assert_eq!(sample.source.shape(), [1, 16, 16]);
    assert_eq!(sample.target.shape(), [3, 16, 16]);
    let gray = sample.source.to_image();
    assert_eq!(gray.dimensions(), (16, 16));
    Ok(())
}

#[test]
fn workflow_missing_phase_dir_is_reported() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = DatasetConfig {
        phase: "test".to_string(),
        ..config(tmp.path())
    };
    assert!(matches!(
        PairedDataset::new(cfg),
        Err(PairedDatasetError::NotADirectory { .. })
    ));
}
