pub mod preview;

pub use preview::{write_previews, PreviewRecord};
