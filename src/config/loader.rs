use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::overrides::UserConfigOverride;

pub const CONFIG_FILE_NAME: &str = "synthetics-ci.json";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyntheticsConfig {
    pub api_key: Option<String>,
    pub app_key: Option<String>,
    /// Backend site, e.g. `example.com` for `https://api.example.com/`.
    pub site: Option<String>,
    /// Full API base URL; wins over `site`.
    pub base_url: Option<String>,
    pub env_file: Option<String>,
    pub public_ids: Vec<String>,
    pub files: Vec<String>,
    /// Selects tests by search when no public ids are given.
    pub test_search_query: Option<String>,
    /// Locations every test runs from, replacing the global ones.
    pub locations: Vec<String>,
    /// `KEY=VALUE` pairs added to the global variables.
    pub variable_strings: Vec<String>,
    #[serde(alias = "global")]
    pub default_test_overrides: UserConfigOverride,
    pub fail_on_timeout: Option<bool>,
    pub fail_on_critical_errors: Option<bool>,
    pub fail_on_missing_tests: Option<bool>,
    /// Milliseconds.
    pub polling_timeout: Option<u64>,
    pub csv_output: Option<String>,
    pub mobile_application_id: Option<String>,
    pub mobile_application_version_file_path: Option<String>,
    pub version_name: Option<String>,
    pub latest: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SyntheticsConfig,
    pub path: PathBuf,
    pub dir: PathBuf,
}

/// Loads `target` if it is a file, or the config file inside `target` if it
/// is a directory. A missing file is not an error.
pub fn load_config(target: &Path) -> Result<Option<LoadedConfig>> {
    let resolved = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()?.join(target)
    };

    let (file_path, dir) = if resolved.is_dir() {
        (resolved.join(CONFIG_FILE_NAME), resolved)
    } else {
        let dir = match resolved.parent() {
            Some(parent) => parent.to_path_buf(),
            None => std::env::current_dir()?,
        };
        (resolved, dir)
    };

    if !file_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&file_path)
        .with_context(|| format!("reading config {}", file_path.display()))?;

    let config: SyntheticsConfig = serde_json::from_str(&contents)
        .with_context(|| format!("parsing config {}", file_path.display()))?;

    Ok(Some(LoadedConfig {
        config,
        path: file_path,
        dir,
    }))
}
