pub mod defaults;
pub mod settings;

pub use settings::CompressionSettings;
