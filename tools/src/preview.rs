//! Writing de-normalized sample previews to disk.

use anyhow::Context;
use paired_dataset::{ImageTensor, PairedDataset};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// What was written for one dataset index.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRecord {
    pub index: usize,
    pub file: PathBuf,
    pub source_shape: [usize; 3],
    pub target_shape: [usize; 3],
    pub source_range: (f32, f32),
    pub target_range: (f32, f32),
    pub source_png: PathBuf,
    pub target_png: PathBuf,
}

fn save(tensor: &ImageTensor, path: &Path) -> anyhow::Result<()> {
    tensor
        .to_image()
        .save(path)
        .with_context(|| format!("writing preview {}", path.display()))
}

/// Draw `count` samples starting at `start` and write `<index>_A.png` / `<index>_B.png`.
pub fn write_previews(
    dataset: &PairedDataset,
    start: usize,
    count: usize,
    out_dir: &Path,
) -> anyhow::Result<Vec<PreviewRecord>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating preview dir {}", out_dir.display()))?;
    let end = start.saturating_add(count).min(dataset.len());
    let mut records = Vec::with_capacity(end.saturating_sub(start));
    for index in start..end {
        let sample = dataset
            .get_sample(index)
            .with_context(|| format!("loading sample {index}"))?;
        let source_png = out_dir.join(format!("{index:05}_A.png"));
        let target_png = out_dir.join(format!("{index:05}_B.png"));
        save(&sample.source, &source_png)?;
        save(&sample.target, &target_png)?;
        records.push(PreviewRecord {
            index,
            file: sample.source_path,
            source_shape: sample.source.shape(),
            target_shape: sample.target.shape(),
            source_range: sample.source.min_max(),
            target_range: sample.target.min_max(),
            source_png,
            target_png,
        });
    }
    Ok(records)
}
