//! Image augmentation and transformation pipeline.

use crate::codec::{self, WHITE};
use crate::config::{BranchProbabilities, DatasetConfig, Preprocess, ResizeKind};
use crate::params::coin;
use crate::types::{Branch, BranchParams, ImageTensor};
use image::{DynamicImage, GenericImageView};
use imageproc::filter::median_filter;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sigma of the Gaussian blur variant.
pub const GAUSSIAN_BLUR_SIGMA: f32 = 2.0;
/// Median blur kernel is `2 * radius + 1` wide.
pub const MEDIAN_BLUR_RADIUS: u32 = 1;
/// `none` preprocessing snaps sides to this multiple.
pub const SIZE_MULTIPLE: u32 = 4;

/// Photometric perturbations applied when a branch's distort flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distortion {
    Brightness,
    Contrast,
    Saturation,
    /// Additive shift of the 8-bit hue channel.
    Hue,
    Sharpness,
}

/// Distortions in application order, each with its factor range around 1.0.
pub const DISTORTIONS: [(Distortion, f32); 5] = [
    (Distortion::Brightness, 0.1),
    (Distortion::Contrast, 0.1),
    (Distortion::Saturation, 0.1),
    (Distortion::Hue, 0.1),
    (Distortion::Sharpness, 0.1),
];

impl Distortion {
    pub fn apply(self, img: DynamicImage, factor: f32) -> DynamicImage {
        match self {
            Distortion::Brightness => with_pixels(img, |buf, _, _, _| {
                for v in buf.iter_mut() {
                    *v = blend(0.0, f32::from(*v), factor);
                }
            }),
            Distortion::Contrast => with_pixels(img, |buf, channels, _, _| {
                let mean = mean_luma(buf, channels);
                for v in buf.iter_mut() {
                    *v = blend(mean, f32::from(*v), factor);
                }
            }),
            Distortion::Saturation => with_pixels(img, |buf, channels, _, _| {
                if channels != 3 {
                    return;
                }
                for px in buf.chunks_exact_mut(3) {
                    let l = f32::from(codec::luma_of([px[0], px[1], px[2]]));
                    for v in px.iter_mut() {
                        *v = blend(l, f32::from(*v), factor);
                    }
                }
            }),
            Distortion::Hue => with_pixels(img, |buf, channels, _, _| {
                if channels != 3 {
                    return;
                }
                for px in buf.chunks_exact_mut(3) {
                    let [h, s, v] = rgb_to_hsv([px[0], px[1], px[2]]);
                    px.copy_from_slice(&hsv_to_rgb([shift_hue(h, factor), s, v]));
                }
            }),
            Distortion::Sharpness => with_pixels(img, |buf, channels, w, h| {
                let smooth = smooth_3x3(buf, channels, w, h);
                for (v, s) in buf.iter_mut().zip(smooth) {
                    *v = blend(f32::from(s), f32::from(*v), factor);
                }
            }),
        }
    }
}

/// Run `op` over the raw interleaved bytes of a luma or RGB image.
fn with_pixels(img: DynamicImage, op: impl FnOnce(&mut [u8], usize, u32, u32)) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(mut gray) => {
            let (w, h) = gray.dimensions();
            op(&mut *gray, 1, w, h);
            DynamicImage::ImageLuma8(gray)
        }
        other => {
            let mut rgb = other.to_rgb8();
            let (w, h) = rgb.dimensions();
            op(&mut *rgb, 3, w, h);
            DynamicImage::ImageRgb8(rgb)
        }
    }
}

/// Add `factor` to an 8-bit hue, truncating and wrapping at 256.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shift_hue(h: u8, factor: f32) -> u8 {
    ((f32::from(h) + factor) as u32 % 256) as u8
}

/// `degenerate + factor * (value - degenerate)`, rounded and clamped to 8 bits.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(degenerate: f32, value: f32, factor: f32) -> u8 {
    (degenerate + factor * (value - degenerate))
        .round()
        .clamp(0.0, 255.0) as u8
}

fn mean_luma(buf: &[u8], channels: usize) -> f32 {
    if buf.is_empty() {
        return 0.0;
    }
    let (sum, n) = if channels == 3 {
        buf.chunks_exact(3).fold((0u64, 0u64), |(s, n), px| {
            (s + u64::from(codec::luma_of([px[0], px[1], px[2]])), n + 1)
        })
    } else {
        (buf.iter().map(|v| u64::from(*v)).sum(), buf.len() as u64)
    };
    (sum as f64 / n as f64).round() as f32
}

/// 3x3 smoothing with weights [1 1 1; 1 5 1; 1 1 1] / 13; border pixels are copied.
fn smooth_3x3(buf: &[u8], channels: usize, w: u32, h: u32) -> Vec<u8> {
    let (w, h) = (w as usize, h as usize);
    let mut out = buf.to_vec();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            for c in 0..channels {
                let mut acc = 0u32;
                for dy in 0..3 {
                    for dx in 0..3 {
                        let idx = ((y + dy - 1) * w + (x + dx - 1)) * channels + c;
                        let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                        acc += weight * u32::from(buf[idx]);
                    }
                }
                out[(y * w + x) * channels + c] = ((acc + 6) / 13) as u8;
            }
        }
    }
    out
}

/// RGB to 8-bit HSV (each channel scaled to 0..=255).
fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|v| f32::from(v) / 255.0);
    let maxc = r.max(g).max(b);
    let minc = r.min(g).min(b);
    if maxc == minc {
        return [0, 0, rgb[0].max(rgb[1]).max(rgb[2])];
    }
    let span = maxc - minc;
    let s = span / maxc;
    let rc = (maxc - r) / span;
    let gc = (maxc - g) / span;
    let bc = (maxc - b) / span;
    let h = if r == maxc {
        bc - gc
    } else if g == maxc {
        2.0 + rc - bc
    } else {
        4.0 + gc - rc
    };
    let h = (h / 6.0).rem_euclid(1.0);
    [
        (h * 255.0) as u8,
        (s * 255.0) as u8,
        rgb[0].max(rgb[1]).max(rgb[2]),
    ]
}

fn hsv_to_rgb(hsv: [u8; 3]) -> [u8; 3] {
    let v = f32::from(hsv[2]);
    if hsv[1] == 0 {
        return [hsv[2]; 3];
    }
    let s = f32::from(hsv[1]) / 255.0;
    let h = f32::from(hsv[0]) / 255.0 * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [r, g, b].map(|c| c.round().clamp(0.0, 255.0) as u8)
}

fn snap_to_multiple(side: u32, base: u32) -> u32 {
    let snapped = (f64::from(side) / f64::from(base)).round_ties_even() as u32 * base;
    snapped.max(base)
}

/// Deterministic preprocessing settings plus the randomized per-branch stages.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    pub preprocess: Preprocess,
    pub load_size: u32,
    pub crop_size: u32,
    pub no_flip: bool,
    pub flip_x: bool,
    pub probabilities: BranchProbabilities,
    /// Set once the first image needed snapping under `none`; shared by clones.
    size_notice_emitted: Arc<AtomicBool>,
}

impl TransformPipeline {
    pub fn from_config(cfg: &DatasetConfig) -> Self {
        Self {
            preprocess: cfg.preprocess,
            load_size: cfg.load_size,
            crop_size: cfg.crop_size,
            no_flip: cfg.no_flip,
            flip_x: cfg.flip_x,
            probabilities: cfg.augment,
            size_notice_emitted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "preprocess={} load={} crop={} flip={} flip_x={} blur_p={:.2}/{:.2} distort_p={:.2}/{:.2}",
            self.preprocess,
            self.load_size,
            self.crop_size,
            !self.no_flip,
            self.flip_x,
            self.probabilities.blur_a,
            self.probabilities.blur_b,
            self.probabilities.distort_a,
            self.probabilities.distort_b,
        )
    }

    pub fn size_notice_emitted(&self) -> bool {
        self.size_notice_emitted.load(Ordering::Relaxed)
    }

    /// Transform one half into a normalized tensor.
    ///
    /// `native_gray` requests a single-channel output and converts up front; it is
    /// independent of the randomized grayscale flag in `params`.
    pub fn apply(
        &self,
        img: DynamicImage,
        params: &BranchParams,
        branch: Branch,
        native_gray: bool,
        rng: &mut dyn rand::RngCore,
    ) -> ImageTensor {
        let (blur_prob, distort_prob) = self.probabilities.for_branch(branch);
        let mut img = if native_gray {
            codec::to_grayscale(&img)
        } else {
            img
        };
        let geometry = &params.geometry;
        if geometry.rotation_degrees != 0 {
            img = codec::rotate(&img, geometry.rotation_degrees, WHITE);
        }
        img = self.resize(img);
        if self.preprocess.crops() {
            img = self.crop(img, geometry.crop_offset);
        }
        if !self.no_flip {
            if geometry.flip_horizontal {
                img = codec::flip_horizontal(&img);
            }
            if self.flip_x && geometry.flip_vertical {
                img = codec::flip_vertical(&img);
            }
        }
        img = maybe_blur(img, params.blur, blur_prob, rng);
        if params.distort {
            img = distort(img, distort_prob, rng);
        }
        if params.grayscale && !native_gray {
            img = codec::to_grayscale_rgb(&img);
        }
        debug!(
            ?branch,
            width = img.width(),
            height = img.height(),
            rotation = geometry.rotation_degrees,
            "transformed branch"
        );
        to_tensor(&img, native_gray)
    }

    fn resize(&self, img: DynamicImage) -> DynamicImage {
        let (ow, oh) = img.dimensions();
        match self.preprocess.resize_kind() {
            ResizeKind::Square => codec::resize(&img, self.load_size, self.load_size),
            ResizeKind::ScaleWidth => {
                if ow == self.load_size && oh >= self.crop_size {
                    return img;
                }
                let scaled = f64::from(self.load_size) * f64::from(oh) / f64::from(ow.max(1));
                let h = scaled.max(f64::from(self.crop_size)) as u32;
                codec::resize(&img, self.load_size, h)
            }
            ResizeKind::ScaleShort => {
                let short = ow.min(oh);
                if short == self.load_size {
                    return img;
                }
                let ratio = f64::from(self.load_size) / f64::from(short.max(1));
                let w = (f64::from(ow) * ratio).round_ties_even() as u32;
                let h = (f64::from(oh) * ratio).round_ties_even() as u32;
                codec::resize(&img, w, h)
            }
            ResizeKind::MultipleOf4 => {
                let w = snap_to_multiple(ow, SIZE_MULTIPLE);
                let h = snap_to_multiple(oh, SIZE_MULTIPLE);
                if (w, h) == (ow, oh) {
                    return img;
                }
                if !self.size_notice_emitted.swap(true, Ordering::Relaxed) {
                    warn!(
                        "image size needs to be a multiple of {SIZE_MULTIPLE}: loaded ({ow}, {oh}), adjusted to ({w}, {h}); all such images will be adjusted"
                    );
                }
                codec::resize(&img, w, h)
            }
            ResizeKind::Keep => img,
        }
    }

    /// Crop `crop_size` along each side that exceeds it; shorter sides are kept whole.
    fn crop(&self, img: DynamicImage, offset: (u32, u32)) -> DynamicImage {
        let (ow, oh) = img.dimensions();
        let size = self.crop_size;
        if ow <= size && oh <= size {
            return img;
        }
        let (x, w) = if ow > size {
            (offset.0.min(ow - size), size)
        } else {
            (0, ow)
        };
        let (y, h) = if oh > size {
            (offset.1.min(oh - size), size)
        } else {
            (0, oh)
        };
        codec::crop_region(&img, x, y, w, h)
    }
}

/// Blur needs the flag and a second draw at the same probability.
pub(crate) fn maybe_blur(
    img: DynamicImage,
    flag: bool,
    prob: f64,
    rng: &mut dyn rand::RngCore,
) -> DynamicImage {
    if !flag || !coin(prob, rng) {
        return img;
    }
    if rng.random_bool(0.5) {
        img.blur(GAUSSIAN_BLUR_SIGMA)
    } else {
        match img {
            DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(median_filter(
                &gray,
                MEDIAN_BLUR_RADIUS,
                MEDIAN_BLUR_RADIUS,
            )),
            other => DynamicImage::ImageRgb8(median_filter(
                &other.to_rgb8(),
                MEDIAN_BLUR_RADIUS,
                MEDIAN_BLUR_RADIUS,
            )),
        }
    }
}

/// Each distortion is kept independently with probability `prob`, in table order.
pub(crate) fn distort(
    mut img: DynamicImage,
    prob: f64,
    rng: &mut dyn rand::RngCore,
) -> DynamicImage {
    for (op, range) in DISTORTIONS {
        if coin(prob, rng) {
            let factor = rng.random_range(1.0 - range..=1.0 + range);
            img = op.apply(img, factor);
        }
    }
    img
}

/// Scale to [0, 1] then map to [-1, 1], CHW.
pub fn to_tensor(img: &DynamicImage, single_channel: bool) -> ImageTensor {
    let (width, height) = img.dimensions();
    let normalize = |v: u8| (f32::from(v) / 255.0 - 0.5) / 0.5;
    if single_channel {
        let gray = codec::to_grayscale(img);
        let data = gray.as_bytes().iter().map(|v| normalize(*v)).collect();
        return ImageTensor {
            data,
            channels: 1,
            height,
            width,
        };
    }
    let rgb = img.to_rgb8();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = normalize(pixel[0]);
        data[plane + i] = normalize(pixel[1]);
        data[2 * plane + i] = normalize(pixel[2]);
    }
    ImageTensor {
        data,
        channels: 3,
        height,
        width,
    }
}
