//! Layering of configuration overrides into the payload sent for each test.
//!
//! Layers are merged field by field: the more specific layer wins whenever it
//! sets a field, maps and lists are replaced wholesale. Merging always builds
//! a new value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::{ExecutionRule, MobileApplication, ReferenceType, ServerTest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuthCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSettings {
    /// Append to the test's cookies instead of replacing them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
    pub value: String,
}

/// Either a raw cookie header, which replaces the original cookies, or
/// settings that say whether to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cookies {
    Raw(String),
    Settings(CookieSettings),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub count: u32,
    /// Milliseconds between attempts.
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BaseConfigOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_insecure_certificates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Cookies>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_step_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_rule: Option<ExecutionRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url_substitution_regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, String>>,
}

macro_rules! most_specific {
    ($base:expr, $specific:expr, { $($field:ident),* $(,)? }) => {
        BaseConfigOverride {
            $($field: $specific.$field.clone().or_else(|| $base.$field.clone()),)*
        }
    };
}

impl BaseConfigOverride {
    pub fn merged_with(&self, specific: &BaseConfigOverride) -> BaseConfigOverride {
        most_specific!(self, specific, {
            allow_insecure_certificates,
            basic_auth,
            body,
            body_type,
            cookies,
            default_step_timeout,
            device_ids,
            execution_rule,
            follow_redirects,
            headers,
            locations,
            polling_timeout,
            retry,
            start_url,
            start_url_substitution_regex,
            variables,
        })
    }
}

/// Overrides as users write them, globally or per test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfigOverride {
    #[serde(flatten)]
    pub base: BaseConfigOverride,
    /// Id of an application version already known to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_application_version: Option<String>,
    /// Local binary to upload before the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_application_version_file_path: Option<String>,
}

impl UserConfigOverride {
    pub fn merged_with(&self, specific: &UserConfigOverride) -> UserConfigOverride {
        UserConfigOverride {
            base: self.base.merged_with(&specific.base),
            mobile_application_version: specific
                .mobile_application_version
                .clone()
                .or_else(|| self.mobile_application_version.clone()),
            mobile_application_version_file_path: specific
                .mobile_application_version_file_path
                .clone()
                .or_else(|| self.mobile_application_version_file_path.clone()),
        }
    }
}

/// Overrides as the backend receives them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigOverride {
    #[serde(flatten)]
    pub base: BaseConfigOverride,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_application: Option<MobileApplication>,
}

impl From<&UserConfigOverride> for ServerConfigOverride {
    fn from(value: &UserConfigOverride) -> Self {
        Self {
            base: value.base.clone(),
            mobile_application: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPayload {
    #[serde(rename = "public_id")]
    pub public_id: String,
    pub execution_rule: ExecutionRule,
    #[serde(flatten)]
    pub config: ServerConfigOverride,
}

/// Application reference candidates for one mobile test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MobileBinding<'a> {
    pub application_id: &'a str,
    /// File name of a binary uploaded during this run.
    pub uploaded_reference: Option<&'a str>,
    pub version_id: Option<&'a str>,
}

/// A just-uploaded binary takes precedence over an explicit version id.
pub fn override_mobile_config(
    config: &ServerConfigOverride,
    application_id: &str,
    temporary_reference: Option<&str>,
    version_id: Option<&str>,
) -> ServerConfigOverride {
    let reference = match (temporary_reference, version_id) {
        (Some(file_name), _) => Some((file_name, ReferenceType::Temporary)),
        (None, Some(version)) => Some((version, ReferenceType::Version)),
        (None, None) => None,
    };

    let mut merged = config.clone();
    if let Some((reference_id, reference_type)) = reference {
        merged.mobile_application = Some(MobileApplication {
            application_id: application_id.to_string(),
            reference_id: reference_id.to_string(),
            reference_type,
        });
    }
    merged
}

pub fn merge(
    global: &UserConfigOverride,
    per_test: &UserConfigOverride,
    mobile: Option<&MobileBinding<'_>>,
) -> ServerConfigOverride {
    let user = global.merged_with(per_test);
    bind_mobile(ServerConfigOverride::from(&user), mobile)
}

fn bind_mobile(
    config: ServerConfigOverride,
    mobile: Option<&MobileBinding<'_>>,
) -> ServerConfigOverride {
    match mobile {
        Some(binding) => override_mobile_config(
            &config,
            binding.application_id,
            binding.uploaded_reference,
            binding.version_id,
        ),
        None => config,
    }
}

pub fn execution_rule(test: &ServerTest, config: &UserConfigOverride) -> ExecutionRule {
    let test_rule = test.options.ci.as_ref().map(|ci| ci.execution_rule);
    match (config.base.execution_rule, test_rule) {
        (Some(configured), Some(from_test)) => configured.strictest(from_test),
        (Some(configured), None) => configured,
        (None, Some(from_test)) => from_test,
        (None, None) => ExecutionRule::Blocking,
    }
}

/// `config` is the already merged user override for this test.
pub fn build_test_payload(
    test: &ServerTest,
    config: &UserConfigOverride,
    mobile: Option<&MobileBinding<'_>>,
) -> TestPayload {
    let mut server_config = bind_mobile(ServerConfigOverride::from(config), mobile);
    server_config.base.execution_rule = None;

    TestPayload {
        public_id: test.public_id.clone(),
        execution_rule: execution_rule(test, config),
        config: server_config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CiOptions, TestOptions};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mobile_test() -> ServerTest {
        ServerTest {
            public_id: "mob-ile-tst".to_string(),
            test_type: "mobile".to_string(),
            options: TestOptions {
                mobile_application: Some(MobileApplication {
                    application_id: "mobileAppUuid".to_string(),
                    reference_id: "versionUuid".to_string(),
                    reference_type: ReferenceType::Latest,
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn mobile_block(reference_id: &str, reference_type: ReferenceType) -> Option<MobileApplication> {
        Some(MobileApplication {
            application_id: "mobileAppUuid".to_string(),
            reference_id: reference_id.to_string(),
            reference_type,
        })
    }

    #[test]
    fn temporary_reference_from_file_path() {
        let merged = override_mobile_config(
            &ServerConfigOverride::default(),
            "mobileAppUuid",
            Some("fileName"),
            None,
        );
        assert_eq!(
            merged.mobile_application,
            mobile_block("fileName", ReferenceType::Temporary)
        );
    }

    #[test]
    fn version_reference() {
        let merged = override_mobile_config(
            &ServerConfigOverride::default(),
            "mobileAppUuid",
            None,
            Some("newAndroidVersionId"),
        );
        assert_eq!(
            merged.mobile_application,
            mobile_block("newAndroidVersionId", ReferenceType::Version)
        );
    }

    #[test]
    fn temporary_takes_precedence_over_version() {
        let merged = override_mobile_config(
            &ServerConfigOverride::default(),
            "mobileAppUuid",
            Some("fileName"),
            Some("androidVersionId"),
        );
        assert_eq!(
            merged.mobile_application,
            mobile_block("fileName", ReferenceType::Temporary)
        );
    }

    #[test]
    fn no_reference_leaves_config_untouched() {
        let config = ServerConfigOverride {
            base: BaseConfigOverride {
                body: Some("{}".to_string()),
                ..Default::default()
            },
            mobile_application: None,
        };
        assert_eq!(override_mobile_config(&config, "mobileAppUuid", None, None), config);
    }

    #[test]
    fn most_specific_layer_wins_and_maps_are_replaced() {
        let global = UserConfigOverride {
            base: BaseConfigOverride {
                headers: Some(BTreeMap::from([
                    ("Authorization".to_string(), "global".to_string()),
                    ("X-Global".to_string(), "1".to_string()),
                ])),
                locations: Some(vec!["aws:eu-west-1".to_string()]),
                follow_redirects: Some(true),
                ..Default::default()
            },
            mobile_application_version: Some("globalVersion".to_string()),
            ..Default::default()
        };
        let per_test = UserConfigOverride {
            base: BaseConfigOverride {
                headers: Some(BTreeMap::from([(
                    "Authorization".to_string(),
                    "test".to_string(),
                )])),
                follow_redirects: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = global.merged_with(&per_test);

        assert_eq!(
            merged.base.headers,
            Some(BTreeMap::from([("Authorization".to_string(), "test".to_string())]))
        );
        assert_eq!(merged.base.follow_redirects, Some(false));
        assert_eq!(merged.base.locations, Some(vec!["aws:eu-west-1".to_string()]));
        assert_eq!(merged.mobile_application_version.as_deref(), Some("globalVersion"));
    }

    #[test]
    fn merge_binds_uploaded_reference_over_layered_version() {
        let global = UserConfigOverride {
            mobile_application_version: Some("versionFromGlobal".to_string()),
            ..Default::default()
        };
        let per_test = UserConfigOverride {
            base: BaseConfigOverride {
                start_url: Some("https://staging.example.com".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let binding = MobileBinding {
            application_id: "mobileAppUuid",
            uploaded_reference: Some("fileName"),
            version_id: Some("versionFromGlobal"),
        };

        let merged = merge(&global, &per_test, Some(&binding));

        assert_eq!(
            merged.mobile_application,
            mobile_block("fileName", ReferenceType::Temporary)
        );
        assert_eq!(merged.base.start_url.as_deref(), Some("https://staging.example.com"));
    }

    #[test]
    fn execution_rule_takes_strictest_when_both_set() {
        let mut test = mobile_test();
        test.options.ci = Some(CiOptions {
            execution_rule: ExecutionRule::NonBlocking,
        });
        let blocking = UserConfigOverride {
            base: BaseConfigOverride {
                execution_rule: Some(ExecutionRule::Blocking),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(execution_rule(&test, &blocking), ExecutionRule::NonBlocking);
        assert_eq!(
            execution_rule(&test, &UserConfigOverride::default()),
            ExecutionRule::NonBlocking
        );

        test.options.ci = None;
        assert_eq!(execution_rule(&test, &blocking), ExecutionRule::Blocking);
        assert_eq!(
            execution_rule(&test, &UserConfigOverride::default()),
            ExecutionRule::Blocking
        );
    }

    #[test]
    fn test_payload_serializes_flat_camel_case() {
        let config = UserConfigOverride {
            base: BaseConfigOverride {
                execution_rule: Some(ExecutionRule::NonBlocking),
                cookies: Some(Cookies::Settings(CookieSettings {
                    append: Some(true),
                    value: "a=b".to_string(),
                })),
                ..Default::default()
            },
            mobile_application_version_file_path: Some("app.apk".to_string()),
            ..Default::default()
        };
        let binding = MobileBinding {
            application_id: "mobileAppUuid",
            uploaded_reference: Some("fileName"),
            version_id: None,
        };

        let payload = build_test_payload(&mobile_test(), &config, Some(&binding));

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "public_id": "mob-ile-tst",
                "executionRule": "non_blocking",
                "cookies": {"append": true, "value": "a=b"},
                "mobileApplication": {
                    "applicationId": "mobileAppUuid",
                    "referenceId": "fileName",
                    "referenceType": "temporary"
                }
            })
        );
    }

    #[test]
    fn user_override_parses_from_test_file_shape() {
        let config: UserConfigOverride = serde_json::from_value(json!({
            "cookies": "name1=value1;",
            "headers": {"X-Env": "ci"},
            "retry": {"count": 2, "interval": 300},
            "mobileApplicationVersionFilePath": "./build/app.ipa"
        }))
        .unwrap();

        assert_eq!(config.base.cookies, Some(Cookies::Raw("name1=value1;".to_string())));
        assert_eq!(
            config.base.retry,
            Some(RetryConfig {
                count: 2,
                interval: 300
            })
        );
        assert_eq!(
            config.mobile_application_version_file_path.as_deref(),
            Some("./build/app.ipa")
        );
    }
}
