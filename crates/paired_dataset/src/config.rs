//! Dataset configuration: defaults, TOML loading, env overrides, validation.

use crate::types::{Branch, DatasetResult, PairedDatasetError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_CONFIG_NAME: &str = "paired-dataset.toml";

/// How images are brought to training size before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocess {
    Resize,
    #[default]
    ResizeAndCrop,
    Crop,
    ScaleWidth,
    ScaleWidthAndCrop,
    ScaleShort,
    ScaleShortAndCrop,
    None,
}

/// Resize step selected by a [`Preprocess`] mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeKind {
    Square,
    ScaleWidth,
    ScaleShort,
    /// Snap both sides to a multiple of 4.
    MultipleOf4,
    Keep,
}

impl Preprocess {
    pub const ALL: [Preprocess; 8] = [
        Preprocess::Resize,
        Preprocess::ResizeAndCrop,
        Preprocess::Crop,
        Preprocess::ScaleWidth,
        Preprocess::ScaleWidthAndCrop,
        Preprocess::ScaleShort,
        Preprocess::ScaleShortAndCrop,
        Preprocess::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preprocess::Resize => "resize",
            Preprocess::ResizeAndCrop => "resize_and_crop",
            Preprocess::Crop => "crop",
            Preprocess::ScaleWidth => "scale_width",
            Preprocess::ScaleWidthAndCrop => "scale_width_and_crop",
            Preprocess::ScaleShort => "scale_short",
            Preprocess::ScaleShortAndCrop => "scale_short_and_crop",
            Preprocess::None => "none",
        }
    }

    pub fn resize_kind(&self) -> ResizeKind {
        match self {
            Preprocess::Resize | Preprocess::ResizeAndCrop => ResizeKind::Square,
            Preprocess::ScaleWidth | Preprocess::ScaleWidthAndCrop => ResizeKind::ScaleWidth,
            Preprocess::ScaleShort | Preprocess::ScaleShortAndCrop => ResizeKind::ScaleShort,
            Preprocess::None => ResizeKind::MultipleOf4,
            Preprocess::Crop => ResizeKind::Keep,
        }
    }

    pub fn crops(&self) -> bool {
        matches!(
            self,
            Preprocess::ResizeAndCrop
                | Preprocess::Crop
                | Preprocess::ScaleWidthAndCrop
                | Preprocess::ScaleShortAndCrop
        )
    }
}

impl fmt::Display for Preprocess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preprocess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preprocess::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| format!("unknown preprocess mode '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    AtoB,
    BtoA,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "AtoB" => Ok(Direction::AtoB),
            "BtoA" => Ok(Direction::BtoA),
            other => Err(format!("unknown direction '{other}' (expected AtoB or BtoA)")),
        }
    }
}

/// Per-branch augmentation probabilities. Suffix `_a` is the source half, `_b` the target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchProbabilities {
    pub grayscale_a: f64,
    pub grayscale_b: f64,
    pub blur_a: f64,
    pub blur_b: f64,
    pub distort_a: f64,
    pub distort_b: f64,
    pub white_bk_a: f64,
}

impl BranchProbabilities {
    /// Configured (blur, distort) probabilities for one branch.
    pub fn for_branch(&self, branch: Branch) -> (f64, f64) {
        match branch {
            Branch::Source => (self.blur_a, self.distort_a),
            Branch::Target => (self.blur_b, self.distort_b),
        }
    }

    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("augment.grayscale_a", self.grayscale_a),
            ("augment.grayscale_b", self.grayscale_b),
            ("augment.blur_a", self.blur_a),
            ("augment.blur_b", self.blur_b),
            ("augment.distort_a", self.distort_a),
            ("augment.distort_b", self.distort_b),
            ("augment.white_bk_a", self.white_bk_a),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Root holding one subdirectory per phase.
    pub dataroot: PathBuf,
    pub phase: String,
    /// Cap on the number of files taken from the sorted listing.
    pub max_dataset_size: Option<usize>,
    /// Concatenate the sorted listing this many times.
    pub repeat_dataset_count: usize,
    pub load_size: u32,
    pub crop_size: u32,
    pub preprocess: Preprocess,
    pub no_flip: bool,
    /// Also honor the sampled vertical flip.
    pub flip_x: bool,
    /// Max absolute rotation in degrees.
    pub rotate: u32,
    pub direction: Direction,
    pub input_nc: u32,
    pub output_nc: u32,
    /// Max number of files whose bytes are kept in memory.
    pub cache_num: usize,
    pub augment: BranchProbabilities,
    /// Seed for reproducible per-index sampling.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dataroot: PathBuf::from("datasets/facades"),
            phase: "train".to_string(),
            max_dataset_size: None,
            repeat_dataset_count: 1,
            load_size: 286,
            crop_size: 256,
            preprocess: Preprocess::ResizeAndCrop,
            no_flip: false,
            flip_x: false,
            rotate: 0,
            direction: Direction::AtoB,
            input_nc: 3,
            output_nc: 3,
            cache_num: 0,
            augment: BranchProbabilities::default(),
            seed: None,
        }
    }
}

impl DatasetConfig {
    /// Resolve a config from `PAIRED_DATASET_CONFIG`, then `paired-dataset.toml`, then defaults.
    pub fn load() -> DatasetResult<Self> {
        let path = std::env::var("PAIRED_DATASET_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_NAME));
        let mut cfg = if path.exists() {
            Self::from_toml_path(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_toml_path(path: &Path) -> DatasetResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| PairedDatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| PairedDatasetError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        fn parse<T: FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok()?.trim().parse().ok()
        }
        if let Some(seed) = parse("PAIRED_DATASET_SEED") {
            self.seed = Some(seed);
        }
        if let Some(cache_num) = parse("PAIRED_DATASET_CACHE_NUM") {
            self.cache_num = cache_num;
        }
    }

    /// Directory scanned for combined images.
    pub fn phase_dir(&self) -> PathBuf {
        self.dataroot.join(&self.phase)
    }

    /// Channel counts for (source, target), swapped for `BtoA`.
    pub fn branch_channels(&self) -> (u32, u32) {
        match self.direction {
            Direction::AtoB => (self.input_nc, self.output_nc),
            Direction::BtoA => (self.output_nc, self.input_nc),
        }
    }

    pub fn validate(&self) -> DatasetResult<()> {
        if self.crop_size == 0 {
            return Err(PairedDatasetError::config("crop_size", "must be positive"));
        }
        if self.load_size < self.crop_size {
            return Err(PairedDatasetError::config(
                "load_size",
                format!(
                    "load_size {} is smaller than crop_size {}",
                    self.load_size, self.crop_size
                ),
            ));
        }
        if self.repeat_dataset_count == 0 {
            return Err(PairedDatasetError::config(
                "repeat_dataset_count",
                "must be at least 1",
            ));
        }
        for (field, nc) in [("input_nc", self.input_nc), ("output_nc", self.output_nc)] {
            if nc != 1 && nc != 3 {
                return Err(PairedDatasetError::config(
                    field,
                    format!("channel count {nc} is not 1 or 3"),
                ));
            }
        }
        for (field, p) in self.augment.named() {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(PairedDatasetError::config(
                    field,
                    format!("probability {p} outside [0, 1]"),
                ));
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> String {
        let a = &self.augment;
        format!(
            "root={} phase={} preprocess={} load={} crop={} no_flip={} flip_x={} rotate={} direction={:?} nc={}/{} repeat={} cache={} gray={:.2}/{:.2} blur={:.2}/{:.2} distort={:.2}/{:.2} white_bk_a={:.2} seed={}",
            self.dataroot.display(),
            self.phase,
            self.preprocess,
            self.load_size,
            self.crop_size,
            self.no_flip,
            self.flip_x,
            self.rotate,
            self.direction,
            self.input_nc,
            self.output_nc,
            self.repeat_dataset_count,
            self.cache_num,
            a.grayscale_a,
            a.grayscale_b,
            a.blur_a,
            a.blur_b,
            a.distort_a,
            a.distort_b,
            a.white_bk_a,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}
