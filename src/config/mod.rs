//! Configuration module

pub mod settings;

pub use settings::{ConfigError, Settings, DEFAULT_CAST_NAMESPACE};
