use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use walkdir::{DirEntry, WalkDir};

use crate::{
    batch::{TestFile, TriggerConfig},
    overrides::UserConfigOverride,
};

use super::resolve_relative;

pub const TEST_FILE_SUFFIX: &str = ".synthetics.json";

const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn is_test_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.ends_with(TEST_FILE_SUFFIX))
}

fn walk_test_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
    {
        let entry = entry.with_context(|| format!("scanning {}", dir.display()))?;
        if is_test_file(&entry) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Test files named by `files` (files or directories, relative to
/// `base_dir`), or every test file under `base_dir` when `files` is empty.
pub fn find_test_files(base_dir: &Path, files: &[String]) -> Result<Vec<PathBuf>> {
    if files.is_empty() {
        return walk_test_files(base_dir);
    }

    let mut found = Vec::new();
    for file in files {
        let path = resolve_relative(base_dir, file);
        if path.is_dir() {
            found.extend(walk_test_files(&path)?);
        } else if path.is_file() {
            found.push(path);
        } else {
            anyhow::bail!("test file {} does not exist", path.display());
        }
    }
    found.dedup();
    Ok(found)
}

/// Reads trigger configs from test files. Relative binary paths are resolved
/// against `base_dir`.
pub fn load_trigger_configs(base_dir: &Path, paths: &[PathBuf]) -> Result<Vec<TriggerConfig>> {
    let mut triggers = Vec::new();
    for path in paths {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading test file {}", path.display()))?;
        let file: TestFile = serde_json::from_str(&contents)
            .with_context(|| format!("parsing test file {}", path.display()))?;
        triggers.extend(file.tests.into_iter().map(|mut trigger| {
            resolve_app_path(base_dir, &mut trigger.config);
            trigger
        }));
    }
    Ok(triggers)
}

pub(crate) fn resolve_app_path(base_dir: &Path, config: &mut UserConfigOverride) {
    if let Some(path) = config.mobile_application_version_file_path.as_mut() {
        *path = resolve_relative(base_dir, path).display().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write_file(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn finds_test_files_and_skips_vendored_dirs() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write_file(&root.join("e2e/login.synthetics.json"), r#"{"tests": []}"#);
        write_file(&root.join("e2e/api/checkout.synthetics.json"), r#"{"tests": []}"#);
        write_file(&root.join("e2e/notes.json"), "{}");
        write_file(&root.join("node_modules/pkg/x.synthetics.json"), r#"{"tests": []}"#);

        let found = find_test_files(root, &[])?;
        assert_eq!(
            found,
            vec![
                root.join("e2e/api/checkout.synthetics.json"),
                root.join("e2e/login.synthetics.json"),
            ]
        );
        Ok(())
    }

    #[test]
    fn explicit_files_and_directories() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        write_file(&root.join("a.synthetics.json"), r#"{"tests": []}"#);
        write_file(&root.join("suite/b.synthetics.json"), r#"{"tests": []}"#);
        write_file(&root.join("other.synthetics.json"), r#"{"tests": []}"#);

        let found = find_test_files(root, &["a.synthetics.json".to_string(), "suite".to_string()])?;
        assert_eq!(
            found,
            vec![root.join("a.synthetics.json"), root.join("suite/b.synthetics.json")]
        );

        let err = find_test_files(root, &["missing.synthetics.json".to_string()]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        Ok(())
    }

    #[test]
    fn loads_triggers_and_resolves_binary_paths() -> Result<()> {
        let temp = tempdir()?;
        let root = temp.path();
        let file = root.join("mobile.synthetics.json");
        write_file(
            &file,
            r#"{"tests": [
  {"id": "abc-def-ghi", "config": {"mobileApplicationVersionFilePath": "build/app.apk"}},
  {"id": "jkl-mno-pqr", "suite": "smoke"}
]}"#,
        );

        let triggers = load_trigger_configs(root, &[file])?;
        assert_eq!(triggers.len(), 2);
        assert_eq!(
            triggers[0].config.mobile_application_version_file_path,
            Some(root.join("build/app.apk").display().to_string())
        );
        assert_eq!(triggers[1].suite.as_deref(), Some("smoke"));
        Ok(())
    }

    #[test]
    fn invalid_test_file_names_the_path() -> Result<()> {
        let temp = tempdir()?;
        let file = temp.path().join("broken.synthetics.json");
        write_file(&file, "not json");

        let err = load_trigger_configs(temp.path(), &[file]).unwrap_err();
        assert!(format!("{err:#}").contains("broken.synthetics.json"));
        Ok(())
    }
}
