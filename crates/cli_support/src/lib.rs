//! Shared CLI plumbing for the paired-dataset tools.

pub mod common;

pub use common::{init_tracing, DatasetArgs};
