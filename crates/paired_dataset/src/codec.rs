//! Decoding and primitive pixel operations on combined A|B images.

use crate::types::{DatasetResult, PairedDatasetError};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma, LumaA, Rgb, RgbImage, Rgba};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use std::path::Path;

/// Background used for alpha flattening and rotation fill.
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Bicubic resampling for every resize in the pipeline.
pub const RESAMPLE: FilterType = FilterType::CatmullRom;

pub fn decode(bytes: &[u8], path: &Path) -> DatasetResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|source| PairedDatasetError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Split at `width / 2`; the right half keeps the odd column.
pub fn split_halves(img: &DynamicImage) -> (DynamicImage, DynamicImage) {
    let (w, h) = img.dimensions();
    let w2 = w / 2;
    let left = img.crop_imm(0, 0, w2, h);
    let right = img.crop_imm(w2, 0, w - w2, h);
    (left, right)
}

pub fn has_alpha(img: &DynamicImage) -> bool {
    img.color().has_alpha()
}

/// ITU-R 601 luma of an 8-bit RGB triple.
#[inline]
pub(crate) fn luma_of(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(u32::from);
    ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
}

#[inline]
fn blend_over(c: u8, a: u8, bg: u8) -> u8 {
    let (c, a, bg) = (u32::from(c), u32::from(a), u32::from(bg));
    ((c * a + bg * (255 - a) + 127) / 255) as u8
}

/// Composite any alpha channel over an opaque `background`.
///
/// Luma+alpha images come back as luma, everything else with alpha comes back as RGB.
/// Images without alpha are returned untouched. Palette images are expanded by the
/// decoder, so a transparent palette arrives here as an alpha image.
pub fn flatten_alpha(img: DynamicImage, background: Rgb<u8>) -> DynamicImage {
    if !has_alpha(&img) {
        return img;
    }
    match img {
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            let la = img.to_luma_alpha8();
            let bg = luma_of(background.0);
            let out = GrayImage::from_fn(la.width(), la.height(), |x, y| {
                let LumaA([l, a]) = *la.get_pixel(x, y);
                Luma([blend_over(l, a, bg)])
            });
            DynamicImage::ImageLuma8(out)
        }
        _ => {
            let rgba = img.to_rgba8();
            let out = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
                Rgb([
                    blend_over(r, a, background[0]),
                    blend_over(g, a, background[1]),
                    blend_over(b, a, background[2]),
                ])
            });
            DynamicImage::ImageRgb8(out)
        }
    }
}

/// Force 8-bit RGB; any alpha is dropped, not composited.
pub fn to_rgb(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) => img.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

pub fn to_grayscale(img: &DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) => img.clone(),
        other => DynamicImage::ImageLuma8(luma_601(&other.to_rgb8())),
    }
}

/// Gray content replicated across three channels.
pub fn to_grayscale_rgb(img: &DynamicImage) -> DynamicImage {
    let gray = match img {
        DynamicImage::ImageLuma8(g) => g.clone(),
        other => luma_601(&other.to_rgb8()),
    };
    DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8())
}

pub(crate) fn luma_601(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([luma_of(rgb.get_pixel(x, y).0)])
    })
}

pub fn crop_region(img: &DynamicImage, x: u32, y: u32, width: u32, height: u32) -> DynamicImage {
    img.crop_imm(x, y, width, height)
}

pub fn resize(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    img.resize_exact(width.max(1), height.max(1), RESAMPLE)
}

/// Rotate counter-clockwise by `degrees` about the center, keeping the canvas size.
/// Exposed corners take `fill`.
pub fn rotate(img: &DynamicImage, degrees: i32, fill: Rgb<u8>) -> DynamicImage {
    let (w, h) = img.dimensions();
    if degrees == 0 || w == 0 || h == 0 {
        return img.clone();
    }
    // rotate_about_center turns clockwise for positive theta.
    let theta = -(degrees as f32).to_radians();
    match img {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(rotate_about_center(
            gray,
            theta,
            Interpolation::Nearest,
            Luma([luma_of(fill.0)]),
        )),
        other => DynamicImage::ImageRgb8(rotate_about_center(
            &other.to_rgb8(),
            theta,
            Interpolation::Nearest,
            fill,
        )),
    }
}

pub fn flip_horizontal(img: &DynamicImage) -> DynamicImage {
    img.fliph()
}

pub fn flip_vertical(img: &DynamicImage) -> DynamicImage {
    img.flipv()
}
