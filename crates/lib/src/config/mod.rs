//! Configuration: error taxonomy for invalid projects, ordered configuration
//! layers, and discovery of the SDK location.

mod error;
pub mod layers;
pub mod sdk;

pub use error::ConfigError;
pub use layers::{ConfigLayer, ConfigLayers, ResolvedConfig, parse_override};
pub use sdk::{parse_properties, resolve_sdk_path};
