use std::collections::HashMap;

pub type EnvMap = HashMap<String, String>;

#[cfg(feature = "cli")]
mod loader;

#[cfg(feature = "cli")]
pub use loader::overlay_env_file;
