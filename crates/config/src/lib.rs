// Configuration loading

pub mod credentials;
pub mod settings;

pub use settings::{ConfigError, Settings};
