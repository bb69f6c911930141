use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::env::EnvMap;

/// Overlays the variables of a dotenv file on `env`, later keys winning.
/// Returns the path that was read.
pub fn overlay_env_file(path: &Path, env: &mut EnvMap) -> Result<PathBuf> {
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("reading env file {}", path.display()))?;

    let mut loaded = 0usize;
    for entry in entries {
        let (key, value) = entry.with_context(|| format!("parsing env file {}", path.display()))?;
        env.insert(key, value);
        loaded += 1;
    }
    debug!(path = %path.display(), loaded, "overlaid env file");

    Ok(path.to_path_buf())
}
