use clap::{ArgAction, Args};
use paired_dataset::{DatasetConfig, DatasetResult, Direction, Preprocess};
use std::path::PathBuf;

/// Dataset options shared across the paired-image binaries.
///
/// Every flag is optional; unset flags keep the value from the config file (or the
/// built-in default when no file is given).
#[derive(Debug, Clone, Default, Args)]
pub struct DatasetArgs {
    /// TOML file with a full `DatasetConfig`; falls back to PAIRED_DATASET_CONFIG.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Root holding one subdirectory per phase.
    #[arg(long)]
    pub dataroot: Option<PathBuf>,
    #[arg(long)]
    pub phase: Option<String>,
    #[arg(long)]
    pub max_dataset_size: Option<usize>,
    #[arg(long)]
    pub repeat_dataset_count: Option<usize>,
    #[arg(long)]
    pub load_size: Option<u32>,
    #[arg(long)]
    pub crop_size: Option<u32>,
    /// One of resize, resize_and_crop, crop, scale_width, scale_width_and_crop,
    /// scale_short, scale_short_and_crop, none.
    #[arg(long)]
    pub preprocess: Option<Preprocess>,
    /// `--no-flip true|false`; overrides the config file either way.
    #[arg(long, action = ArgAction::Set)]
    pub no_flip: Option<bool>,
    /// `--flip-x true|false`; overrides the config file either way.
    #[arg(long, action = ArgAction::Set)]
    pub flip_x: Option<bool>,
    /// Max absolute rotation in degrees.
    #[arg(long)]
    pub rotate: Option<u32>,
    /// AtoB or BtoA.
    #[arg(long)]
    pub direction: Option<Direction>,
    #[arg(long)]
    pub input_nc: Option<u32>,
    #[arg(long)]
    pub output_nc: Option<u32>,
    #[arg(long)]
    pub cache_num: Option<usize>,
    #[arg(long)]
    pub grayscale_a: Option<f64>,
    #[arg(long)]
    pub grayscale_b: Option<f64>,
    #[arg(long)]
    pub blur_a: Option<f64>,
    #[arg(long)]
    pub blur_b: Option<f64>,
    #[arg(long)]
    pub distort_a: Option<f64>,
    #[arg(long)]
    pub distort_b: Option<f64>,
    #[arg(long)]
    pub white_bk_a: Option<f64>,
    #[arg(long)]
    pub seed: Option<u64>,
}

impl DatasetArgs {
    /// Base config (file or defaults) with the CLI flags layered on top.
    pub fn resolve(&self) -> DatasetResult<DatasetConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let mut cfg = DatasetConfig::from_toml_path(path)?;
                cfg.apply_env_overrides();
                cfg
            }
            None => DatasetConfig::load()?,
        };
        self.apply_to(&mut cfg);
        Ok(cfg)
    }

    pub fn apply_to(&self, cfg: &mut DatasetConfig) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        set(&mut cfg.dataroot, &self.dataroot);
        set(&mut cfg.phase, &self.phase);
        if self.max_dataset_size.is_some() {
            cfg.max_dataset_size = self.max_dataset_size;
        }
        set(&mut cfg.repeat_dataset_count, &self.repeat_dataset_count);
        set(&mut cfg.load_size, &self.load_size);
        set(&mut cfg.crop_size, &self.crop_size);
        set(&mut cfg.preprocess, &self.preprocess);
        set(&mut cfg.no_flip, &self.no_flip);
        set(&mut cfg.flip_x, &self.flip_x);
        set(&mut cfg.rotate, &self.rotate);
        set(&mut cfg.direction, &self.direction);
        set(&mut cfg.input_nc, &self.input_nc);
        set(&mut cfg.output_nc, &self.output_nc);
        set(&mut cfg.cache_num, &self.cache_num);
        let probs = &mut cfg.augment;
        set(&mut probs.grayscale_a, &self.grayscale_a);
        set(&mut probs.grayscale_b, &self.grayscale_b);
        set(&mut probs.blur_a, &self.blur_a);
        set(&mut probs.blur_b, &self.blur_b);
        set(&mut probs.distort_a, &self.distort_a);
        set(&mut probs.distort_b, &self.distort_b);
        set(&mut probs.white_bk_a, &self.white_bk_a);
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
    }
}

/// Log filter used when RUST_LOG is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the fmt subscriber, honoring RUST_LOG.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
