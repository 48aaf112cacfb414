//! Batch iteration producing stacked Burn tensors.

use crate::dataset::PairedDataset;
use crate::types::{DatasetResult, ImageTensor, PairedDatasetError, Sample};
use rand::{seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub(crate) const DEFAULT_LOG_EVERY_SAMPLES: usize = 1000;

/// Ordering and error policy for a `BatchIter`.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub shuffle: bool,
    pub drop_last: bool,
    /// Seed for the shuffle order; falls back to the dataset seed.
    pub seed: Option<u64>,
    /// Skip samples that fail to load instead of failing the batch.
    pub permissive_errors: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            shuffle: false,
            drop_last: false,
            seed: None,
            permissive_errors: permissive_from_env(),
        }
    }
}

fn permissive_from_env() -> bool {
    std::env::var("PAIRED_DATASET_PERMISSIVE")
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .map(|v| !(v == "0" || v == "false" || v == "off"))
        .unwrap_or(true)
}

pub struct PairedBatch<B: burn::tensor::backend::Backend> {
    /// `[batch, input_nc, height, width]`
    pub source: burn::tensor::Tensor<B, 4>,
    /// `[batch, output_nc, height, width]`
    pub target: burn::tensor::Tensor<B, 4>,
    pub paths: Vec<String>,
}

pub struct BatchIter {
    dataset: Arc<PairedDataset>,
    order: Vec<usize>,
    cursor: usize,
    opts: BatchOptions,
    processed_samples: usize,
    processed_batches: usize,
    skipped_errors: usize,
    started: Instant,
    total_load_time: Duration,
    last_logged_samples: usize,
    source_buf: Vec<f32>,
    target_buf: Vec<f32>,
}

impl BatchIter {
    pub fn new(dataset: Arc<PairedDataset>, opts: BatchOptions) -> DatasetResult<Self> {
        if opts.batch_size == 0 {
            return Err(PairedDatasetError::Configuration {
                field: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if opts.shuffle {
            let mut rng = match opts.seed.or(dataset.config().seed) {
                Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
                None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
            };
            order.shuffle(&mut rng);
        }
        Ok(Self {
            dataset,
            order,
            cursor: 0,
            opts,
            processed_samples: 0,
            processed_batches: 0,
            skipped_errors: 0,
            started: Instant::now(),
            total_load_time: Duration::ZERO,
            last_logged_samples: 0,
            source_buf: Vec::new(),
            target_buf: Vec::new(),
        })
    }

    /// Dataset indices in visiting order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn skipped_errors(&self) -> usize {
        self.skipped_errors
    }

    pub fn next_batch<B: burn::tensor::backend::Backend>(
        &mut self,
        device: &B::Device,
    ) -> DatasetResult<Option<PairedBatch<B>>> {
        let batch_size = self.opts.batch_size;
        loop {
            if self.cursor >= self.order.len() {
                return Ok(None);
            }
            let end = (self.cursor + batch_size).min(self.order.len());
            if self.opts.drop_last && end - self.cursor < batch_size {
                self.cursor = self.order.len();
                return Ok(None);
            }
            let slice = &self.order[self.cursor..end];
            self.cursor = end;

            let t_load = Instant::now();
            let dataset = &self.dataset;
            let loaded: Vec<(usize, DatasetResult<Sample>)> = slice
                .par_iter()
                .map(|&idx| (idx, dataset.get_sample(idx)))
                .collect();
            self.total_load_time += t_load.elapsed();

            let mut samples = Vec::with_capacity(loaded.len());
            for (idx, res) in loaded {
                match res {
                    Ok(s) => samples.push(s),
                    Err(e) if self.opts.permissive_errors => {
                        warn!(index = idx, error = %e, "skipping sample");
                        self.skipped_errors += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
            if samples.is_empty() {
                continue;
            }
            if self.opts.drop_last && samples.len() < batch_size {
                continue;
            }
            let batch = self.assemble::<B>(&samples, device)?;
            self.processed_samples += samples.len();
            self.processed_batches += 1;
            self.maybe_log_progress();
            return Ok(Some(batch));
        }
    }

    fn assemble<B: burn::tensor::backend::Backend>(
        &mut self,
        samples: &[Sample],
        device: &B::Device,
    ) -> DatasetResult<PairedBatch<B>> {
        let source_shape = uniform_shape(samples.iter().map(|s| &s.source))?;
        let target_shape = uniform_shape(samples.iter().map(|s| &s.target))?;
        self.source_buf.clear();
        self.target_buf.clear();
        let mut paths = Vec::with_capacity(samples.len());
        for sample in samples {
            self.source_buf.extend_from_slice(&sample.source.data);
            self.target_buf.extend_from_slice(&sample.target.data);
            paths.push(sample.source_path.display().to_string());
        }
        let n = samples.len();
        let [sc, sh, sw] = source_shape;
        let [tc, th, tw] = target_shape;
        let source = burn::tensor::Tensor::<B, 1>::from_floats(self.source_buf.as_slice(), device)
            .reshape([n, sc, sh, sw]);
        let target = burn::tensor::Tensor::<B, 1>::from_floats(self.target_buf.as_slice(), device)
            .reshape([n, tc, th, tw]);
        Ok(PairedBatch {
            source,
            target,
            paths,
        })
    }

    fn maybe_log_progress(&mut self) {
        if self.processed_samples - self.last_logged_samples < DEFAULT_LOG_EVERY_SAMPLES {
            return;
        }
        let secs = self.started.elapsed().as_secs_f32().max(0.001);
        let avg_load_ms =
            self.total_load_time.as_secs_f64() * 1000.0 / self.processed_batches.max(1) as f64;
        info!(
            batches = self.processed_batches,
            samples = self.processed_samples,
            skipped = self.skipped_errors,
            rate = self.processed_samples as f32 / secs,
            avg_load_ms,
            "batch progress"
        );
        self.last_logged_samples = self.processed_samples;
    }
}

fn uniform_shape<'a>(mut tensors: impl Iterator<Item = &'a ImageTensor>) -> DatasetResult<[usize; 3]> {
    let Some(first) = tensors.next() else {
        return Err(PairedDatasetError::Other("empty batch".to_string()));
    };
    let shape = first.shape();
    if tensors.any(|t| t.shape() != shape) {
        return Err(PairedDatasetError::Other(
            "batch contains varying image sizes; use a cropping preprocess mode".to_string(),
        ));
    }
    Ok(shape)
}

impl burn::data::dataset::Dataset<Sample> for PairedDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        match self.get_sample(index) {
            Ok(sample) => Some(sample),
            Err(e) => {
                warn!(index, error = %e, "sample unavailable");
                None
            }
        }
    }

    fn len(&self) -> usize {
        PairedDataset::len(self)
    }
}
