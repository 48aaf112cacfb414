//! Enumerating combined image files, building the (repeated) index list, and
//! summarizing a dataset root.

use crate::codec;
use crate::types::{DatasetResult, PairSummary, PairedDatasetError};
use image::GenericImageView;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "ppm", "bmp", "tif", "tiff"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively list image files under `dir`, sorted, truncated to `max_size`.
pub fn make_dataset(dir: &Path, max_size: Option<usize>) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PairedDatasetError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| PairedDatasetError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    if let Some(max) = max_size {
        paths.truncate(max);
    }
    Ok(paths)
}

/// Concatenate the ordered list with itself `count` times; 0 and 1 leave it as is.
pub fn repeat_paths(paths: Vec<PathBuf>, count: usize) -> Vec<PathBuf> {
    if count <= 1 {
        return paths;
    }
    let mut out = Vec::with_capacity(paths.len() * count);
    for _ in 0..count {
        out.extend(paths.iter().cloned());
    }
    out
}

/// Decode every image under `root` and count what a loader would run into.
pub fn summarize_pairs(root: &Path) -> DatasetResult<PairSummary> {
    let paths = make_dataset(root, None)?;
    let checks: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let res = std::fs::read(path)
                .map_err(|source| PairedDatasetError::Io {
                    path: path.clone(),
                    source,
                })
                .and_then(|bytes| codec::decode(&bytes, path));
            (path, res)
        })
        .collect();

    let mut summary = PairSummary {
        root: root.to_path_buf(),
        total: paths.len(),
        ..PairSummary::default()
    };
    for (path, res) in checks {
        match res {
            Ok(img) => {
                summary.decoded += 1;
                if img.width() % 2 == 1 {
                    summary.odd_width += 1;
                }
                if codec::has_alpha(&img) {
                    summary.with_alpha += 1;
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "undecodable pair");
                summary.failed += 1;
                summary.failures.push(path.clone());
            }
        }
    }
    info!(
        root = %root.display(),
        total = summary.total,
        failed = summary.failed,
        "summarized pairs"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn repeat_concatenates_in_order() {
        let paths: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("{i}.png"))).collect();
        let repeated = repeat_paths(paths.clone(), 3);
        assert_eq!(repeated.len(), 15);
        for (chunk, _) in repeated.chunks(5).zip(0..) {
            assert_eq!(chunk, paths.as_slice());
        }
        assert_eq!(repeat_paths(paths.clone(), 1), paths);
    }

    #[test]
    fn lists_images_recursively_sorted_and_capped() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path();
        fs::create_dir_all(root.join("nested"))?;
        for name in ["b.png", "a.JPG", "notes.txt", "nested/c.bmp"] {
            fs::write(root.join(name), b"x")?;
        }
        let all = make_dataset(root, None)?;
        let names: Vec<_> = all
            .iter()
            .map(|p| p.strip_prefix(root).map(Path::to_path_buf))
            .collect::<Result<_, _>>()?;
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.JPG"),
                PathBuf::from("b.png"),
                PathBuf::from("nested/c.bmp")
            ]
        );
        assert_eq!(make_dataset(root, Some(2))?.len(), 2);
        Ok(())
    }

    #[test]
    fn summary_counts_odd_alpha_and_broken_files() -> anyhow::Result<()> {
        use image::{Rgb, RgbImage, Rgba, RgbaImage};
        let tmp = tempfile::tempdir()?;
        let root = tmp.path();
        RgbImage::from_pixel(8, 4, Rgb([1, 2, 3])).save(root.join("even.png"))?;
        RgbImage::from_pixel(9, 4, Rgb([1, 2, 3])).save(root.join("odd.png"))?;
        RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 0])).save(root.join("alpha.png"))?;
        fs::write(root.join("broken.png"), b"nope")?;

        let summary = summarize_pairs(root)?;
        assert_eq!(summary.total, 4);
        assert_eq!(summary.decoded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.odd_width, 1);
        assert_eq!(summary.with_alpha, 1);
        assert_eq!(summary.failures, vec![root.join("broken.png")]);
        Ok(())
    }

    #[test]
    fn missing_root_is_reported() {
        let err = make_dataset(Path::new("/no/such/dataset/root"), None).unwrap_err();
        assert!(matches!(err, PairedDatasetError::NotADirectory { .. }));
    }
}
