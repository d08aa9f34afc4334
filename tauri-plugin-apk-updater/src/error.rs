//! Unified error type definition

use thiserror::Error;

/// Plugin error type
///
/// Only invalid arguments reject a command outright; everything else is
/// folded into the structured result records by the command layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid argument (empty URL, bad filename, empty path)
    #[error("{0}")]
    Validation(String),

    /// APK file does not exist at the given path
    #[error("APK file not found: {0}")]
    FileNotFound(String),

    /// No download record matches the handle
    #[error("Download not found")]
    DownloadNotFound,

    /// HTTP transfer error
    #[error("Network error: {0}")]
    Network(String),

    /// Filesystem error while writing the download
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// The install intent could not be raised
    #[error("Installation failed: {0}")]
    InstallFailed(String),

    /// Operation only exists on Android
    #[error("APK installation is only supported on Android")]
    UnsupportedPlatform,

    /// Wrapped OS/platform failure
    #[error("Platform error: {0}")]
    Platform(String),

    #[cfg(mobile)]
    #[error("Plugin invoke error: {0}")]
    PluginInvoke(#[from] tauri::plugin::mobile::PluginInvokeError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(not(target_os = "android"))]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
