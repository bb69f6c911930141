use std::{collections::HashMap, future::Future};

use tokio::sync::OnceCell;

use crate::{
    api::{ServerTest, UploadJobStatus},
    error::{CiError, CiErrorCode, SyntheticsResult},
    overrides::UserConfigOverride,
};

/// One upload per (binary path, application) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppUploadKey {
    pub app_path: String,
    pub app_id: String,
}

impl AppUploadKey {
    pub fn new(app_path: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            app_path: app_path.into(),
            app_id: app_id.into(),
        }
    }

    /// Key for a test that needs its binary uploaded, if it does.
    pub fn for_test(config: &UserConfigOverride, test: &ServerTest) -> Option<Self> {
        let app_path = config.mobile_application_version_file_path.as_deref()?;
        let app_id = test.mobile_application_id()?;
        Some(Self::new(app_path, app_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub file_name: String,
    pub validation: UploadJobStatus,
}

/// Ledger of the uploads of one run, keyed by [`AppUploadKey`].
///
/// The cache only keeps books: callers hand it the upload future and it
/// guarantees the future for a key runs at most once.
#[derive(Debug, Default)]
pub struct AppUploadCache {
    keys: Vec<AppUploadKey>,
    entries: HashMap<AppUploadKey, OnceCell<UploadedArtifact>>,
}

impl AppUploadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_keys<'a, I>(&mut self, tests: I)
    where
        I: IntoIterator<Item = (&'a UserConfigOverride, &'a ServerTest)>,
    {
        for (config, test) in tests {
            if let Some(key) = AppUploadKey::for_test(config, test) {
                if !self.entries.contains_key(&key) {
                    self.entries.insert(key.clone(), OnceCell::new());
                    self.keys.push(key);
                }
            }
        }
    }

    /// Unique keys in first-seen order.
    pub fn apps_to_upload(&self) -> &[AppUploadKey] {
        &self.keys
    }

    /// Returns `false` when the key is unknown or already has an artifact.
    pub fn record_upload_result(&self, key: &AppUploadKey, artifact: UploadedArtifact) -> bool {
        match self.entries.get(key) {
            Some(cell) => cell.set(artifact).is_ok(),
            None => false,
        }
    }

    pub fn lookup(&self, key: &AppUploadKey) -> Option<&UploadedArtifact> {
        self.entries.get(key).and_then(|cell| cell.get())
    }

    pub fn file_name(&self, app_path: &str, app_id: &str) -> Option<&str> {
        self.lookup(&AppUploadKey::new(app_path, app_id))
            .map(|artifact| artifact.file_name.as_str())
    }

    /// Runs `upload` unless the key already has an artifact; concurrent
    /// callers for the same key wait for the first one. A failed upload
    /// leaves the key empty.
    pub async fn get_or_upload<F, Fut>(
        &self,
        key: &AppUploadKey,
        upload: F,
    ) -> SyntheticsResult<&UploadedArtifact>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyntheticsResult<UploadedArtifact>>,
    {
        match self.entries.get(key) {
            Some(cell) => cell.get_or_try_init(upload).await,
            None => unregistered(key),
        }
    }
}

fn unregistered<T>(key: &AppUploadKey) -> SyntheticsResult<T> {
    Err(CiError::new(
        CiErrorCode::InvalidConfig,
        format!(
            "mobile application {} ({}) was not registered for upload",
            key.app_path, key.app_id
        ),
    )
    .into())
}
