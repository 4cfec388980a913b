//! Names and format tags shared across the crate.

/// Application name, used for cache and data directories.
pub const APP_NAME: &str = "brick";

/// Descriptor file name looked up at the project root and in module directories.
pub const DESCRIPTOR_FILENAME: &str = "brick.toml";

/// Properties file holding machine-local settings such as the SDK location.
pub const LOCAL_PROPERTIES_FILENAME: &str = "local.properties";

/// Key in `local.properties` naming the SDK directory.
pub const SDK_DIR_PROPERTY: &str = "sdk.dir";

/// Environment variables consulted for the SDK location, in order.
pub const SDK_ENV_VARS: &[&str] = &["BRICK_SDK_HOME", "BRICK_SDK"];

/// Environment variable overriding the artifact cache location.
pub const CACHE_DIR_ENV: &str = "BRICK_CACHE_DIR";

/// Directory (inside the project build dir) holding engine state.
pub const STATE_DIR: &str = ".brick";

/// Schema tag written into the build state file.
///
/// Bump whenever the on-disk fingerprint format changes; stores carrying a
/// different tag are discarded on load.
pub const STATE_SCHEMA: &str = "brick-state/1";

/// Variant selected when none is requested.
pub const DEFAULT_VARIANT: &str = "debug";
