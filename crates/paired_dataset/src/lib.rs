//! Paired-image loading and augmentation for image-to-image training.
//!
//! This crate provides utilities for:
//! - Indexing directories of combined side-by-side A|B images
//! - Sampling one shared geometry per pair with per-branch photometric flags
//! - Applying the transform pipeline and normalizing to CHW tensors
//! - Burn-compatible batch iteration

// Module declarations
pub mod aug;
pub mod cache;
pub mod codec;
pub mod config;
pub mod dataset;
pub mod index;
pub mod params;
pub mod types;

#[cfg(feature = "burn-runtime")]
pub mod batch;

// Re-export public API
pub use aug::{to_tensor, Distortion, TransformPipeline};
pub use cache::ByteCache;
pub use config::{BranchProbabilities, DatasetConfig, Direction, Preprocess};
pub use dataset::PairedDataset;
pub use index::{make_dataset, repeat_paths, summarize_pairs};
pub use params::{sample_branches, sample_geometry};
pub use types::*;

#[cfg(feature = "burn-runtime")]
pub use batch::{BatchIter, BatchOptions, PairedBatch};
