//! Download lifecycle façade
//!
//! Owns the single tracked download: validation, the poll monitor, the
//! completion waiter, and the one-shot completion guard. The actual
//! transfer is the download service's problem.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::{Error, Result};
use crate::models::{
    AppInfo, DownloadCompleteEvent, DownloadOptions, DownloadProgressEvent, DownloadRequest,
    DownloadSnapshot, DownloadState, DownloadStatus, InstallPermissionStatus, PermissionResult,
    progress_percent,
};
use crate::traits::{DownloadListener, DownloadService, PackageInstaller};

const DEFAULT_FILENAME: &str = "update.apk";
const DEFAULT_NOTIFICATION_TITLE: &str = "Downloading Update...";
const DOWNLOAD_DESCRIPTION: &str = "Downloading app update";

const FIRST_POLL_DELAY: Duration = Duration::from_millis(100);
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STALLED_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// The one tracked download; replaced wholesale when a new one starts
struct ActiveDownload {
    handle: i64,
    monitor: JoinHandle<()>,
    waiter: JoinHandle<()>,
}

impl ActiveDownload {
    fn abort(&self) {
        self.monitor.abort();
        self.waiter.abort();
    }
}

/// Ports shared with the monitor and waiter tasks
struct Shared {
    downloads: Arc<dyn DownloadService>,
    installer: Arc<dyn PackageInstaller>,
    listener: Arc<dyn DownloadListener>,
}

impl Shared {
    /// Idempotent completion routine; both the broadcast waiter and the
    /// poll monitor funnel into it, the `completed` swap picks one winner.
    async fn handle_complete(&self, handle: i64, completed: &AtomicBool) {
        if completed.swap(true, Ordering::SeqCst) {
            debug!("[Updater] Completion of download {handle} already handled, skipping");
            return;
        }

        let event = self.build_complete_event(handle).await;
        if event.success {
            info!(
                "[Updater] Download {handle} complete, installed: {:?}",
                event.installed
            );
        } else {
            warn!(
                "[Updater] Download {handle} failed: {}",
                event.error.as_deref().unwrap_or("unknown")
            );
        }
        self.listener.on_complete(event).await;
    }

    async fn build_complete_event(&self, handle: i64) -> DownloadCompleteEvent {
        let snapshot = match self.downloads.query(handle).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return DownloadCompleteEvent::failure("Download not found"),
            Err(e) => return DownloadCompleteEvent::failure(e.to_string()),
        };

        if snapshot.state == DownloadState::Successful {
            let installed = self.auto_install(handle, snapshot.local_path.as_deref()).await;
            DownloadCompleteEvent {
                success: true,
                file_path: snapshot.local_path,
                installed: Some(installed),
                error: None,
            }
        } else {
            let error = match snapshot.reason {
                Some(reason) => format!("Download failed: {reason}"),
                None => "Download failed".to_string(),
            };
            DownloadCompleteEvent::failure(error)
        }
    }

    /// Hand the finished file straight to the installer; the outcome only
    /// lands in the event's `installed` field, it never fails the download.
    async fn auto_install(&self, handle: i64, local_path: Option<&str>) -> bool {
        let Some(path) = local_path else {
            warn!("[Updater] Download {handle} finished without a local path");
            return false;
        };
        match self.install_file(path).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[Updater] Auto-install after download {handle} failed: {e}");
                false
            }
        }
    }

    async fn install_file(&self, path: &str) -> Result<()> {
        let path = resolve_apk_path(path)?;
        self.installer.install(&path).await
    }

    /// Poll loop: progress events while active, completion on terminal,
    /// silent stop when the record vanishes or the query errors.
    async fn monitor(self: Arc<Self>, handle: i64, completed: Arc<AtomicBool>) {
        sleep(FIRST_POLL_DELAY).await;
        loop {
            let snapshot = match self.downloads.query(handle).await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    debug!("[Updater] Download {handle} has no record, monitor stopping");
                    return;
                }
                Err(e) => {
                    debug!("[Updater] Status query for download {handle} failed: {e}");
                    return;
                }
            };

            if snapshot.state.is_active() {
                self.listener.on_progress(progress_event(&snapshot)).await;
                sleep(ACTIVE_POLL_INTERVAL).await;
            } else if snapshot.state.is_terminal() {
                self.handle_complete(handle, &completed).await;
                return;
            } else {
                // paused or an unknown code, back off without emitting
                sleep(STALLED_POLL_INTERVAL).await;
            }
        }
    }

    /// Completion-broadcast path, racing the monitor for the same guard
    async fn wait_broadcast(self: Arc<Self>, handle: i64, completed: Arc<AtomicBool>) {
        match self.downloads.wait_complete(handle).await {
            Ok(()) => self.handle_complete(handle, &completed).await,
            Err(e) => debug!("[Updater] Completion wait for download {handle} ended: {e}"),
        }
    }
}

fn progress_event(snapshot: &DownloadSnapshot) -> DownloadProgressEvent {
    DownloadProgressEvent {
        progress: progress_percent(snapshot.bytes_downloaded, snapshot.total_size),
        bytes_downloaded: snapshot.bytes_downloaded,
        total_size: snapshot.total_size,
    }
}

/// Resolve a frontend-supplied path to a local file
fn resolve_apk_path(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("File path is required".to_string()));
    }
    let local = trimmed.strip_prefix("file://").unwrap_or(trimmed);
    let resolved = PathBuf::from(local);
    if resolved.is_file() {
        Ok(resolved)
    } else {
        Err(Error::FileNotFound(local.to_string()))
    }
}

/// APK 更新门面
///
/// 单活跃下载，后启动者接管（last start wins）；句柄与一次性完成标记
/// 是仅有的可变状态。
pub struct ApkUpdater {
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveDownload>>,
}

impl ApkUpdater {
    #[must_use]
    pub fn new(
        downloads: Arc<dyn DownloadService>,
        installer: Arc<dyn PackageInstaller>,
        listener: Arc<dyn DownloadListener>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                downloads,
                installer,
                listener,
            }),
            active: Mutex::new(None),
        }
    }

    /// Submit a download and start watching it
    ///
    /// Returns once the service accepts the request; the transfer itself
    /// runs OS-side. A still-running previous download keeps transferring
    /// but loses its tracking, so its completion never reaches the listener.
    pub async fn start_download(&self, options: DownloadOptions) -> Result<()> {
        if options.url.trim().is_empty() {
            return Err(Error::Validation("URL is required".to_string()));
        }

        let filename = options
            .filename
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(Error::Validation(format!("Invalid filename: {filename}")));
        }

        let request = DownloadRequest {
            url: options.url,
            filename,
            show_notification: options.show_notification.unwrap_or(true),
            notification_title: options
                .notification_title
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_TITLE.to_string()),
            description: DOWNLOAD_DESCRIPTION.to_string(),
        };

        let handle = self.shared.downloads.enqueue(request).await?;
        info!("[Updater] Download {handle} enqueued");

        // fresh one-shot guard per download, shared by both producers
        let completed = Arc::new(AtomicBool::new(false));
        let waiter = tokio::spawn(
            Arc::clone(&self.shared).wait_broadcast(handle, Arc::clone(&completed)),
        );
        let monitor = tokio::spawn(Arc::clone(&self.shared).monitor(handle, completed));

        let previous = self.active_guard().replace(ActiveDownload {
            handle,
            monitor,
            waiter,
        });
        if let Some(previous) = previous {
            debug!(
                "[Updater] Download {} replaced by {handle}",
                previous.handle
            );
            previous.abort();
        }
        Ok(())
    }

    /// Status of the tracked download; never errors, failures are
    /// structured records with a reason
    pub async fn download_status(&self) -> DownloadStatus {
        let Some(handle) = self.active_guard().as_ref().map(|active| active.handle) else {
            return DownloadStatus::unavailable("No active download");
        };
        match self.shared.downloads.query(handle).await {
            Ok(Some(snapshot)) => DownloadStatus::from_snapshot(&snapshot),
            Ok(None) => DownloadStatus::unavailable("Download not found"),
            Err(e) => DownloadStatus::unavailable(e.to_string()),
        }
    }

    /// Cancel the tracked download; `false` (and no service call) when
    /// nothing is tracked
    pub async fn cancel_download(&self) -> bool {
        let Some(active) = self.active_guard().take() else {
            return false;
        };
        active.abort();
        match self.shared.downloads.remove(active.handle).await {
            Ok(removed) => info!(
                "[Updater] Download {} cancelled (record removed: {removed})",
                active.handle
            ),
            Err(e) => warn!(
                "[Updater] Failed to remove download {}: {e}",
                active.handle
            ),
        }
        true
    }

    /// Raise the OS install UI for an APK on disk
    pub async fn install_apk(&self, path: &str) -> Result<()> {
        self.shared.install_file(path).await
    }

    pub async fn can_install(&self) -> Result<InstallPermissionStatus> {
        self.shared.installer.can_install().await
    }

    pub async fn request_install_permission(&self) -> Result<PermissionResult> {
        self.shared.installer.request_install_permission().await
    }

    pub async fn app_info(&self) -> Result<AppInfo> {
        self.shared.installer.app_info().await
    }

    /// Stop watching; idempotent, leaves the OS-side transfer alone
    /// (that is `cancel_download`'s job)
    pub fn cleanup(&self) {
        if let Some(active) = self.active_guard().take() {
            debug!("[Updater] Cleanup, dropping download {}", active.handle);
            active.abort();
        }
    }

    fn active_guard(&self) -> std::sync::MutexGuard<'_, Option<ActiveDownload>> {
        // guards are never held across await points, poisoning is benign
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "test_utils.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
pub(crate) mod test_utils;

#[cfg(test)]
#[path = "updater_tests.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests;
