//! CI and git tags attached to a triggered batch.
//!
//! Values come from `SYNTHETICS_GIT_*` and `SYNTHETICS_CI_*` variables of the
//! environment snapshot. Empty values are dropped.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::env::EnvMap;

pub const GIT_BRANCH: &str = "git.branch";
pub const GIT_REPOSITORY_URL: &str = "git.repository_url";
pub const GIT_SHA: &str = "git.commit.sha";
pub const GIT_TAG: &str = "git.tag";
pub const GIT_COMMIT_MESSAGE: &str = "git.commit.message";
pub const GIT_COMMIT_AUTHOR_NAME: &str = "git.commit.author.name";
pub const GIT_COMMIT_AUTHOR_EMAIL: &str = "git.commit.author.email";
pub const GIT_COMMIT_AUTHOR_DATE: &str = "git.commit.author.date";
pub const GIT_COMMIT_COMMITTER_NAME: &str = "git.commit.committer.name";
pub const GIT_COMMIT_COMMITTER_EMAIL: &str = "git.commit.committer.email";
pub const GIT_COMMIT_COMMITTER_DATE: &str = "git.commit.committer.date";

pub const CI_JOB_NAME: &str = "ci.job.name";
pub const CI_JOB_URL: &str = "ci.job.url";
pub const CI_PIPELINE_ID: &str = "ci.pipeline.id";
pub const CI_PIPELINE_NAME: &str = "ci.pipeline.name";
pub const CI_PIPELINE_NUMBER: &str = "ci.pipeline.number";
pub const CI_PIPELINE_URL: &str = "ci.pipeline.url";
pub const CI_PROVIDER_NAME: &str = "ci.provider.name";
pub const CI_STAGE_NAME: &str = "ci.stage.name";
pub const CI_WORKSPACE_PATH: &str = "ci.workspace_path";

const GIT_VARIABLES: &[(&str, &str)] = &[
    ("SYNTHETICS_GIT_REPOSITORY_URL", GIT_REPOSITORY_URL),
    ("SYNTHETICS_GIT_BRANCH", GIT_BRANCH),
    ("SYNTHETICS_GIT_TAG", GIT_TAG),
    ("SYNTHETICS_GIT_COMMIT_SHA", GIT_SHA),
    ("SYNTHETICS_GIT_COMMIT_MESSAGE", GIT_COMMIT_MESSAGE),
    ("SYNTHETICS_GIT_COMMIT_AUTHOR_NAME", GIT_COMMIT_AUTHOR_NAME),
    ("SYNTHETICS_GIT_COMMIT_AUTHOR_EMAIL", GIT_COMMIT_AUTHOR_EMAIL),
    ("SYNTHETICS_GIT_COMMIT_AUTHOR_DATE", GIT_COMMIT_AUTHOR_DATE),
    ("SYNTHETICS_GIT_COMMIT_COMMITTER_NAME", GIT_COMMIT_COMMITTER_NAME),
    ("SYNTHETICS_GIT_COMMIT_COMMITTER_EMAIL", GIT_COMMIT_COMMITTER_EMAIL),
    ("SYNTHETICS_GIT_COMMIT_COMMITTER_DATE", GIT_COMMIT_COMMITTER_DATE),
];

const CI_VARIABLES: &[(&str, &str)] = &[
    ("SYNTHETICS_CI_JOB_NAME", CI_JOB_NAME),
    ("SYNTHETICS_CI_JOB_URL", CI_JOB_URL),
    ("SYNTHETICS_CI_PIPELINE_ID", CI_PIPELINE_ID),
    ("SYNTHETICS_CI_PIPELINE_NAME", CI_PIPELINE_NAME),
    ("SYNTHETICS_CI_PIPELINE_NUMBER", CI_PIPELINE_NUMBER),
    ("SYNTHETICS_CI_PIPELINE_URL", CI_PIPELINE_URL),
    ("SYNTHETICS_CI_PROVIDER_NAME", CI_PROVIDER_NAME),
    ("SYNTHETICS_CI_STAGE_NAME", CI_STAGE_NAME),
    ("SYNTHETICS_CI_WORKSPACE_PATH", CI_WORKSPACE_PATH),
];

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub ci: Tags,
    pub git: Tags,
}

impl Metadata {
    pub fn from_env(env: &EnvMap) -> Self {
        Self {
            ci: ci_tags(env),
            git: git_tags(env),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ci.is_empty() && self.git.is_empty()
    }
}

fn collect(env: &EnvMap, variables: &[(&str, &str)]) -> Tags {
    variables
        .iter()
        .filter_map(|(variable, tag)| {
            env.get(*variable)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(|value| (tag.to_string(), value.to_string()))
        })
        .collect()
}

/// A tag replaces the branch.
pub fn git_tags(env: &EnvMap) -> Tags {
    let mut tags = collect(env, GIT_VARIABLES);
    if tags.contains_key(GIT_TAG) {
        tags.remove(GIT_BRANCH);
    }
    tags
}

pub fn ci_tags(env: &EnvMap) -> Tags {
    collect(env, CI_VARIABLES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_git_tags() {
        let snapshot = env(&[
            ("SYNTHETICS_GIT_REPOSITORY_URL", "git@example.com:org/app.git"),
            ("SYNTHETICS_GIT_BRANCH", "main"),
            ("SYNTHETICS_GIT_COMMIT_SHA", "cafebabe"),
            ("SYNTHETICS_GIT_COMMIT_AUTHOR_NAME", "Sam"),
            ("SYNTHETICS_GIT_COMMIT_AUTHOR_EMAIL", ""),
            ("UNRELATED", "value"),
        ]);

        assert_eq!(
            git_tags(&snapshot),
            tags(&[
                (GIT_REPOSITORY_URL, "git@example.com:org/app.git"),
                (GIT_BRANCH, "main"),
                (GIT_SHA, "cafebabe"),
                (GIT_COMMIT_AUTHOR_NAME, "Sam"),
            ])
        );
    }

    #[test]
    fn tag_replaces_branch() {
        let snapshot = env(&[
            ("SYNTHETICS_GIT_BRANCH", "main"),
            ("SYNTHETICS_GIT_TAG", "v1.2.0"),
        ]);
        assert_eq!(git_tags(&snapshot), tags(&[(GIT_TAG, "v1.2.0")]));
    }

    #[test]
    fn reads_ci_tags() {
        let snapshot = env(&[
            ("SYNTHETICS_CI_JOB_NAME", "e2e"),
            ("SYNTHETICS_CI_PIPELINE_ID", "  "),
            ("SYNTHETICS_CI_PIPELINE_NUMBER", "42"),
            ("SYNTHETICS_CI_PROVIDER_NAME", "buildkite"),
        ]);
        assert_eq!(
            ci_tags(&snapshot),
            tags(&[
                (CI_JOB_NAME, "e2e"),
                (CI_PIPELINE_NUMBER, "42"),
                (CI_PROVIDER_NAME, "buildkite"),
            ])
        );
    }

    #[test]
    fn empty_environment_has_no_metadata() {
        let metadata = Metadata::from_env(&EnvMap::new());
        assert!(metadata.is_empty());
        assert_eq!(serde_json::to_value(&metadata).unwrap(), serde_json::json!({"ci": {}, "git": {}}));
    }
}
