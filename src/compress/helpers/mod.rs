//! Low-level helpers shared by the compression stages

pub mod dedup;
pub mod flate;
pub mod pixels;

pub use dedup::{optimize, OptimizeStats};
