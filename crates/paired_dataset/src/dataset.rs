//! Index -> `Sample` loader over a directory of combined A|B images.

use crate::aug::TransformPipeline;
use crate::cache::ByteCache;
use crate::codec::{self, WHITE};
use crate::config::DatasetConfig;
use crate::index::{make_dataset, repeat_paths};
use crate::params::{coin, sample_branches, sample_geometry};
use crate::types::{Branch, DatasetResult, PairedDatasetError, Sample};
use image::GenericImageView;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paired dataset backed by a sorted (optionally repeated) file list.
///
/// `get_sample` takes `&self`; the byte cache and the resize notice are the only
/// shared state, so one dataset can serve many worker threads.
#[derive(Debug)]
pub struct PairedDataset {
    cfg: DatasetConfig,
    paths: Vec<PathBuf>,
    cache: ByteCache,
    pipeline: TransformPipeline,
}

impl PairedDataset {
    /// Validate `cfg` and index `<dataroot>/<phase>`.
    pub fn new(cfg: DatasetConfig) -> DatasetResult<Self> {
        cfg.validate()?;
        let dir = cfg.phase_dir();
        let paths = make_dataset(&dir, cfg.max_dataset_size)?;
        Ok(Self::from_paths(cfg, paths))
    }

    /// Build over an explicit file list; validation still applies.
    pub fn with_paths(cfg: DatasetConfig, paths: Vec<PathBuf>) -> DatasetResult<Self> {
        cfg.validate()?;
        Ok(Self::from_paths(cfg, paths))
    }

    fn from_paths(cfg: DatasetConfig, paths: Vec<PathBuf>) -> Self {
        let unique = paths.len();
        let paths = repeat_paths(paths, cfg.repeat_dataset_count);
        let pipeline = TransformPipeline::from_config(&cfg);
        info!(
            root = %cfg.phase_dir().display(),
            files = unique,
            samples = paths.len(),
            pipeline = %pipeline.describe(),
            "paired dataset ready"
        );
        Self {
            cache: ByteCache::new(cfg.cache_num),
            cfg,
            paths,
            pipeline,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> &ByteCache {
        &self.cache
    }

    /// Channel count of the source tensor (after the direction swap).
    pub fn input_nc(&self) -> u32 {
        self.cfg.branch_channels().0
    }

    /// Channel count of the target tensor (after the direction swap).
    pub fn output_nc(&self) -> u32 {
        self.cfg.branch_channels().1
    }

    /// Produce sample `index`, seeded per index when the config carries a seed.
    pub fn get_sample(&self, index: usize) -> DatasetResult<Sample> {
        match self.cfg.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed ^ index as u64);
                self.get_sample_with_rng(index, &mut rng)
            }
            None => self.get_sample_with_rng(index, &mut rand::rng()),
        }
    }

    pub fn get_sample_with_rng(
        &self,
        index: usize,
        rng: &mut dyn rand::RngCore,
    ) -> DatasetResult<Sample> {
        let path = self
            .paths
            .get(index)
            .ok_or(PairedDatasetError::IndexOutOfRange {
                index,
                len: self.paths.len(),
            })?;
        let bytes = self.cache.get(path)?;
        let combined = codec::decode(&bytes, path)?;
        let (width, height) = combined.dimensions();
        if width < 2 || height == 0 {
            return Err(PairedDatasetError::TooSmall {
                path: path.clone(),
                width,
                height,
            });
        }
        let (mut source, target) = codec::split_halves(&combined);

        if coin(self.cfg.augment.white_bk_a, rng) {
            source = codec::flatten_alpha(source, WHITE);
        }
        let source = codec::to_rgb(&source);
        let target = codec::to_rgb(&target);

        let geometry = sample_geometry(&self.cfg, source.dimensions(), rng);
        let (source_params, target_params) = sample_branches(&self.cfg, geometry, rng);
        debug!(index, ?source_params, ?target_params, "sampled params");

        let (source_nc, target_nc) = self.cfg.branch_channels();
        let source =
            self.pipeline
                .apply(source, &source_params, Branch::Source, source_nc == 1, rng);
        let target =
            self.pipeline
                .apply(target, &target_params, Branch::Target, target_nc == 1, rng);
        Ok(Sample {
            source,
            target,
            source_path: path.clone(),
            target_path: path.clone(),
        })
    }

    /// Path of the combined file behind `index`.
    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }
}
