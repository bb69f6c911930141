//! Resolution of effective settings. Precedence: command line, then the
//! environment snapshot, then the config file, then defaults.

use std::{collections::BTreeMap, path::Path, time::Duration};

use tracing::warn;

use crate::{
    api::{ApiClient, ApiCredentials},
    batch::{RunConfig, TriggerConfig},
    env::EnvMap,
    error::{CiError, CiErrorCode},
    mobile::UploadApplicationConfig,
};

use super::{discovery::resolve_app_path, loader::SyntheticsConfig, resolve_relative};

pub const API_KEY_VAR: &str = "SYNTHETICS_API_KEY";
pub const APP_KEY_VAR: &str = "SYNTHETICS_APP_KEY";
pub const SITE_VAR: &str = "SYNTHETICS_SITE";
pub const DEFAULT_SITE: &str = "datadoghq.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub credentials: ApiCredentials,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn resolve_api_settings(config: &SyntheticsConfig, env: &EnvMap) -> Result<ApiSettings, CiError> {
    let api_key = non_empty(env.get(API_KEY_VAR))
        .or_else(|| non_empty(config.api_key.as_ref()))
        .ok_or_else(|| CiError::new(CiErrorCode::MissingApiKey, format!("Missing {API_KEY_VAR}")))?;
    let app_key = non_empty(env.get(APP_KEY_VAR))
        .or_else(|| non_empty(config.app_key.as_ref()))
        .ok_or_else(|| CiError::new(CiErrorCode::MissingAppKey, format!("Missing {APP_KEY_VAR}")))?;

    let base_url = match non_empty(config.base_url.as_ref()) {
        Some(url) if !env.contains_key(SITE_VAR) => url,
        _ => {
            let site = non_empty(env.get(SITE_VAR))
                .or_else(|| non_empty(config.site.as_ref()))
                .unwrap_or_else(|| DEFAULT_SITE.to_string());
            ApiClient::base_url_for_site(&site)
        }
    };

    Ok(ApiSettings {
        base_url,
        credentials: ApiCredentials { api_key, app_key },
    })
}

/// `run-tests` values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunTestsArgs {
    pub public_ids: Vec<String>,
    pub files: Vec<String>,
    pub fail_on_timeout: Option<bool>,
    pub fail_on_critical_errors: Option<bool>,
    pub fail_on_missing_tests: Option<bool>,
    pub polling_timeout_ms: Option<u64>,
    /// `KEY=VALUE` pairs.
    pub variables: Vec<String>,
    pub locations: Vec<String>,
    pub search: Option<String>,
}

/// Parses `KEY=VALUE` pairs. The value keeps any further `=`; entries without
/// a key are skipped.
pub fn parse_variables(pairs: &[String]) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                variables.insert(key.trim().to_string(), value.to_string());
            }
            _ => warn!(variable = %pair, "ignoring variable, expected KEY=VALUE"),
        }
    }
    variables
}

pub fn resolve_run_config(config: &SyntheticsConfig, args: &RunTestsArgs, base_dir: &Path) -> RunConfig {
    let defaults = RunConfig::default();
    let mut global = config.default_test_overrides.clone();
    resolve_app_path(base_dir, &mut global);

    let variable_strings = if args.variables.is_empty() {
        &config.variable_strings
    } else {
        &args.variables
    };
    let variables = parse_variables(variable_strings);
    if !variables.is_empty() {
        global
            .base
            .variables
            .get_or_insert_with(BTreeMap::new)
            .extend(variables);
    }

    let locations = if args.locations.is_empty() {
        &config.locations
    } else {
        &args.locations
    };
    if !locations.is_empty() {
        global.base.locations = Some(locations.clone());
    }

    let polling_timeout = args
        .polling_timeout_ms
        .or(config.polling_timeout)
        .or(global.base.polling_timeout)
        .map(Duration::from_millis)
        .unwrap_or(defaults.polling_timeout);

    RunConfig {
        global,
        fail_on_timeout: args
            .fail_on_timeout
            .or(config.fail_on_timeout)
            .unwrap_or(defaults.fail_on_timeout),
        fail_on_critical_errors: args
            .fail_on_critical_errors
            .or(config.fail_on_critical_errors)
            .unwrap_or(defaults.fail_on_critical_errors),
        fail_on_missing_tests: args
            .fail_on_missing_tests
            .or(config.fail_on_missing_tests)
            .unwrap_or(defaults.fail_on_missing_tests),
        polling_timeout,
        ..defaults
    }
}

/// Public ids from the command line win over the ones in the config file.
pub fn resolve_public_ids(config: &SyntheticsConfig, args: &RunTestsArgs) -> Vec<TriggerConfig> {
    let ids = if args.public_ids.is_empty() {
        &config.public_ids
    } else {
        &args.public_ids
    };
    ids.iter().map(TriggerConfig::new).collect()
}

/// Query selecting tests when no public ids are given.
pub fn resolve_search_query(config: &SyntheticsConfig, args: &RunTestsArgs) -> Option<String> {
    args.search
        .as_ref()
        .or(config.test_search_query.as_ref())
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
}

/// `upload-application` values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct UploadApplicationArgs {
    pub mobile_application_id: Option<String>,
    pub mobile_application_version_file_path: Option<String>,
    pub version_name: Option<String>,
    pub latest: bool,
}

pub fn resolve_upload_config(
    config: &SyntheticsConfig,
    args: &UploadApplicationArgs,
    base_dir: &Path,
) -> UploadApplicationConfig {
    let file_path = args
        .mobile_application_version_file_path
        .clone()
        .or_else(|| config.mobile_application_version_file_path.clone())
        .map(|path| resolve_relative(base_dir, &path).display().to_string());

    UploadApplicationConfig {
        mobile_application_id: args
            .mobile_application_id
            .clone()
            .or_else(|| config.mobile_application_id.clone()),
        mobile_application_version_file_path: file_path,
        version_name: args
            .version_name
            .clone()
            .or_else(|| config.version_name.clone()),
        latest: args.latest || config.latest.unwrap_or(false),
    }
}
