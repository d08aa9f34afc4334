//! Abstract Traits over the OS collaborators

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AppInfo, DownloadCompleteEvent, DownloadProgressEvent, DownloadRequest, DownloadSnapshot,
    InstallPermissionStatus, PermissionResult,
};

/// Download manager Trait
///
/// Platform implementation:
/// - Android: `AndroidDownloadService` (system `DownloadManager` via the bridge)
/// - Desktop: `NativeDownloadService` (reqwest streaming transfer)
#[async_trait]
pub trait DownloadService: Send + Sync {
    /// Submit a download; returns the opaque handle for the transfer
    async fn enqueue(&self, request: DownloadRequest) -> Result<i64>;

    /// Current status row for a handle; `None` when no record matches
    async fn query(&self, handle: i64) -> Result<Option<DownloadSnapshot>>;

    /// Cancel the transfer and delete its file; `true` if a record was removed
    async fn remove(&self, handle: i64) -> Result<bool>;

    /// Resolve once the service observes a terminal state for the handle
    ///
    /// Must error (or never resolve) when the record is removed.
    async fn wait_complete(&self, handle: i64) -> Result<()>;
}

/// Package installer Trait
///
/// Platform implementation:
/// - Android: `AndroidPackageInstaller` (install intent via the bridge)
/// - Desktop: `NativePackageInstaller` (reports the unsupported platform)
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Whether the app may install packages from this source
    async fn can_install(&self) -> Result<InstallPermissionStatus>;

    /// Prompt for the install capability; may involve an OS settings
    /// round trip before resolving
    async fn request_install_permission(&self) -> Result<PermissionResult>;

    /// Raise the OS install UI for the file
    ///
    /// Success means the intent was raised, not that installation
    /// succeeded; the outcome is owned by the OS UI.
    async fn install(&self, path: &Path) -> Result<()>;

    /// Package identifier and version of the hosting app
    async fn app_info(&self) -> Result<AppInfo>;
}

/// Sink for download lifecycle notifications
#[async_trait]
pub trait DownloadListener: Send + Sync {
    async fn on_progress(&self, event: DownloadProgressEvent);

    /// Delivered exactly once per download
    async fn on_complete(&self, event: DownloadCompleteEvent);
}
