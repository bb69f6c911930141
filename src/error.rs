use std::{fmt, path::PathBuf};

use thiserror::Error;

/// User-attributable failures. The run ends non-zero and nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiErrorCode {
    InvalidMobileApp,
    InvalidMobileAppUploadParameters,
    MissingApiKey,
    MissingAppKey,
    MissingMobileApplicationId,
    MissingMobileApplicationPath,
    MissingMobileVersionName,
    MissingTests,
    NoTestsToRun,
    InvalidConfig,
}

impl CiErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiErrorCode::InvalidMobileApp => "INVALID_MOBILE_APP",
            CiErrorCode::InvalidMobileAppUploadParameters => "INVALID_MOBILE_APP_UPLOAD_PARAMETERS",
            CiErrorCode::MissingApiKey => "MISSING_API_KEY",
            CiErrorCode::MissingAppKey => "MISSING_APP_KEY",
            CiErrorCode::MissingMobileApplicationId => "MISSING_MOBILE_APPLICATION_ID",
            CiErrorCode::MissingMobileApplicationPath => "MISSING_MOBILE_APPLICATION_PATH",
            CiErrorCode::MissingMobileVersionName => "MISSING_MOBILE_VERSION_NAME",
            CiErrorCode::MissingTests => "MISSING_TESTS",
            CiErrorCode::NoTestsToRun => "NO_TESTS_TO_RUN",
            CiErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }
}

impl fmt::Display for CiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unexpected backend or environment failures, reported apart from user errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalErrorCode {
    UnknownMobileAppUploadFailure,
    MobileAppUploadTimeout,
    UnavailableTestConfig,
    TriggerTestsFailed,
    PollResultsFailed,
}

impl CriticalErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriticalErrorCode::UnknownMobileAppUploadFailure => "UNKNOWN_MOBILE_APP_UPLOAD_FAILURE",
            CriticalErrorCode::MobileAppUploadTimeout => "MOBILE_APP_UPLOAD_TIMEOUT",
            CriticalErrorCode::UnavailableTestConfig => "UNAVAILABLE_TEST_CONFIG",
            CriticalErrorCode::TriggerTestsFailed => "TRIGGER_TESTS_FAILED",
            CriticalErrorCode::PollResultsFailed => "POLL_RESULTS_FAILED",
        }
    }
}

impl fmt::Display for CriticalErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CiError {
    pub code: CiErrorCode,
    pub message: String,
}

impl CiError {
    pub fn new(code: CiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct CriticalError {
    pub code: CriticalErrorCode,
    pub message: String,
}

impl CriticalError {
    pub fn new(code: CriticalErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Raw failure of one backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EndpointError {
    pub message: String,
    /// `None` when the request never produced a response.
    pub status_code: Option<u16>,
    transient: bool,
}

impl EndpointError {
    pub fn new(message: impl Into<String>, status_code: Option<u16>) -> Self {
        let transient = match status_code {
            None => true,
            Some(code) => code == 429 || code >= 500,
        };
        Self {
            message: message.into(),
            status_code,
            transient,
        }
    }

    /// The request could not even be built; retrying cannot help.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            transient: false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }

    /// Network failures, throttling and server errors are worth another try.
    pub fn is_transient(&self) -> bool {
        self.transient
    }
}

impl From<reqwest::Error> for EndpointError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return Self::local(err.to_string());
        }
        if err.is_decode() {
            return Self {
                message: err.to_string(),
                status_code: err.status().map(|s| s.as_u16()),
                transient: false,
            };
        }
        let status_code = err.status().map(|s| s.as_u16());
        Self::new(err.to_string(), status_code)
    }
}

#[derive(Debug, Error)]
pub enum SyntheticsError {
    #[error(transparent)]
    Ci(#[from] CiError),
    #[error(transparent)]
    Critical(#[from] CriticalError),
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("file not found: {}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run aborted")]
    Aborted,
}

impl SyntheticsError {
    pub fn is_critical(&self) -> bool {
        matches!(self, SyntheticsError::Critical(_))
    }

    pub fn ci_code(&self) -> Option<CiErrorCode> {
        match self {
            SyntheticsError::Ci(err) => Some(err.code),
            _ => None,
        }
    }

    pub fn critical_code(&self) -> Option<CriticalErrorCode> {
        match self {
            SyntheticsError::Critical(err) => Some(err.code),
            _ => None,
        }
    }
}

pub type SyntheticsResult<T> = Result<T, SyntheticsError>;
