use std::path::PathBuf;

use anyhow::Result;

use crate::env::{overlay_env_file, EnvMap};

use super::{loader::LoadedConfig, resolve_relative};

#[derive(Debug, Clone)]
pub struct EnvironmentContext {
    pub base_dir: PathBuf,
    pub config_dir: PathBuf,
    /// Process environment overlaid with the env file, if any.
    pub env: EnvMap,
    pub env_files: Vec<PathBuf>,
}

/// Builds the environment snapshot every other setting is read from.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    base_dir: PathBuf,
    config_dir: PathBuf,
    config: Option<LoadedConfig>,
    explicit_env: Option<PathBuf>,
    process_env: EnvMap,
}

impl EnvironmentBuilder {
    pub fn new(
        base_dir: PathBuf,
        config_dir: PathBuf,
        config: Option<LoadedConfig>,
        explicit_env: Option<PathBuf>,
    ) -> Self {
        Self {
            base_dir,
            config_dir,
            config,
            explicit_env,
            process_env: std::env::vars().collect(),
        }
    }

    pub fn with_process_env(mut self, env: EnvMap) -> Self {
        self.process_env = env;
        self
    }

    pub fn build(&self) -> Result<EnvironmentContext> {
        let mut env = self.process_env.clone();
        let mut env_files = Vec::new();

        let env_path = match (&self.explicit_env, &self.config) {
            (Some(explicit), _) => Some(explicit.clone()),
            (None, Some(cfg)) => cfg
                .config
                .env_file
                .as_deref()
                .map(|file| resolve_relative(&self.config_dir, file)),
            (None, None) => None,
        };

        if let Some(env_path) = env_path {
            let loaded = overlay_env_file(&env_path, &mut env)?;
            env_files.push(loaded);
        }

        Ok(EnvironmentContext {
            base_dir: self.base_dir.clone(),
            config_dir: self.config_dir.clone(),
            env,
            env_files,
        })
    }
}
