//! Core types, error definitions, and data structures for paired_dataset.

use image::{DynamicImage, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, PairedDatasetError>;

#[derive(Debug, Error)]
pub enum PairedDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid configuration for {field}: {reason}")]
    Configuration { field: &'static str, reason: String },
    #[error("config parse error at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("combined image {path} is {width}x{height}; need at least 2 columns and 1 row to split")]
    TooSmall {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    #[error("dataset root {path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0}")]
    Other(String),
}

impl PairedDatasetError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        PairedDatasetError::Configuration {
            field,
            reason: reason.into(),
        }
    }
}

/// Which half of a combined image a parameter set or tensor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    /// Left half, domain A.
    Source,
    /// Right half, domain B.
    Target,
}

/// Spatial parameters shared verbatim by both branches of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryParams {
    /// Top-left corner of the crop window in resized coordinates.
    pub crop_offset: (u32, u32),
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Counter-clockwise rotation in degrees; 0 disables rotation.
    pub rotation_degrees: i32,
}

/// Geometry plus the per-branch augmentation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchParams {
    pub geometry: GeometryParams,
    pub grayscale: bool,
    pub blur: bool,
    pub distort: bool,
    /// Recorded for the target branch only; the pipeline never reads it.
    pub white_bk: bool,
}

impl BranchParams {
    pub fn new(geometry: GeometryParams) -> Self {
        Self {
            geometry,
            grayscale: false,
            blur: false,
            distort: false,
            white_bk: false,
        }
    }
}

/// Normalized image in CHW layout with values in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Vec<f32>,
    pub channels: usize,
    pub height: u32,
    pub width: u32,
}

impl ImageTensor {
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height as usize, self.width as usize]
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            })
    }

    /// Map the tensor back to 8-bit pixels (used for previews).
    ///
    /// A tensor whose `data` is shorter than its declared shape maps to an empty image.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_image(&self) -> DynamicImage {
        let plane = self.height as usize * self.width as usize;
        let denorm = |v: &f32| ((v + 1.0) * 127.5).round().clamp(0.0, 255.0) as u8;
        if self.channels == 1 {
            return self
                .data
                .get(..plane)
                .and_then(|gray| {
                    GrayImage::from_raw(self.width, self.height, gray.iter().map(denorm).collect())
                })
                .map(DynamicImage::ImageLuma8)
                .unwrap_or_else(|| DynamicImage::new_luma8(0, 0));
        }
        let planes = (
            self.data.get(..plane),
            self.data.get(plane..2 * plane),
            self.data.get(2 * plane..3 * plane),
        );
        let (Some(r), Some(g), Some(b)) = planes else {
            return DynamicImage::new_rgb8(0, 0);
        };
        let mut img = RgbImage::new(self.width, self.height);
        for (i, pixel) in img.pixels_mut().enumerate() {
            pixel.0 = [denorm(&r[i]), denorm(&g[i]), denorm(&b[i])];
        }
        DynamicImage::ImageRgb8(img)
    }
}

/// One training example derived from a single combined file.
#[derive(Debug, Clone)]
pub struct Sample {
    pub source: ImageTensor,
    pub target: ImageTensor,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairSummary {
    pub root: PathBuf,
    pub total: usize,
    pub decoded: usize,
    pub failed: usize,
    /// Combined images whose width is odd (the target half gets the extra column).
    pub odd_width: usize,
    pub with_alpha: usize,
    pub failures: Vec<PathBuf>,
}
