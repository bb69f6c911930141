pub mod api;
pub mod batch;
pub mod clock;
#[cfg(feature = "cli")]
pub mod config;
pub mod env;
pub mod error;
pub mod metadata;
pub mod mobile;
pub mod overrides;
pub mod report;
#[cfg(feature = "cli")]
pub mod reporter;
pub mod retry;
