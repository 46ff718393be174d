pub mod args;

pub use args::{format_megabytes, Args};
