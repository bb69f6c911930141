mod discovery;
mod environment;
mod loader;
mod settings;

use std::path::{Path, PathBuf};

pub use discovery::{find_test_files, load_trigger_configs, TEST_FILE_SUFFIX};
pub use environment::{EnvironmentBuilder, EnvironmentContext};
pub use loader::{load_config, LoadedConfig, SyntheticsConfig, CONFIG_FILE_NAME};
pub use settings::{
    parse_variables, resolve_api_settings, resolve_public_ids, resolve_run_config,
    resolve_search_query, resolve_upload_config, ApiSettings, RunTestsArgs, UploadApplicationArgs,
    API_KEY_VAR, APP_KEY_VAR, DEFAULT_SITE, SITE_VAR,
};

pub(crate) fn resolve_relative(base: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}
