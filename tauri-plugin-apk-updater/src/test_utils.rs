//! 测试辅助模块
//!
//! 提供可编排的 mock 端口与便捷的构造方法。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::models::{
    AppInfo, DownloadCompleteEvent, DownloadProgressEvent, DownloadRequest, DownloadSnapshot,
    DownloadState, InstallPermissionStatus, PermissionResult,
};
use crate::traits::{DownloadListener, DownloadService, PackageInstaller};
use crate::updater::ApkUpdater;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===== Snapshot factories =====

pub(crate) fn pending_snapshot() -> DownloadSnapshot {
    DownloadSnapshot {
        state: DownloadState::Pending,
        bytes_downloaded: 0,
        total_size: -1,
        local_path: None,
        reason: None,
    }
}

pub(crate) fn running_snapshot(bytes: i64, total: i64) -> DownloadSnapshot {
    DownloadSnapshot {
        state: DownloadState::Running,
        bytes_downloaded: bytes,
        total_size: total,
        local_path: None,
        reason: None,
    }
}

pub(crate) fn stalled_snapshot(state: DownloadState, bytes: i64, total: i64) -> DownloadSnapshot {
    DownloadSnapshot {
        state,
        bytes_downloaded: bytes,
        total_size: total,
        local_path: None,
        reason: None,
    }
}

pub(crate) fn successful_snapshot(bytes: i64, path: &str) -> DownloadSnapshot {
    DownloadSnapshot {
        state: DownloadState::Successful,
        bytes_downloaded: bytes,
        total_size: bytes,
        local_path: Some(path.to_string()),
        reason: None,
    }
}

pub(crate) fn failed_snapshot(reason: Option<&str>) -> DownloadSnapshot {
    DownloadSnapshot {
        state: DownloadState::Failed,
        bytes_downloaded: 0,
        total_size: -1,
        local_path: None,
        reason: reason.map(str::to_string),
    }
}

// ===== MockDownloadService =====

/// Scriptable download service: tests set snapshots by hand and trigger
/// the completion broadcast when they choose.
pub(crate) struct MockDownloadService {
    next_handle: AtomicI64,
    snapshots: Mutex<HashMap<i64, DownloadSnapshot>>,
    broadcasts: Mutex<HashMap<i64, watch::Sender<bool>>>,
    pub enqueue_count: AtomicUsize,
    pub removed: Mutex<Vec<i64>>,
    /// When set, every `query` errors (for exercising the silent-stop path)
    pub query_fails: AtomicBool,
}

impl MockDownloadService {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicI64::new(1),
            snapshots: Mutex::new(HashMap::new()),
            broadcasts: Mutex::new(HashMap::new()),
            enqueue_count: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
            query_fails: AtomicBool::new(false),
        }
    }

    pub fn set_snapshot(&self, handle: i64, snapshot: DownloadSnapshot) {
        lock(&self.snapshots).insert(handle, snapshot);
    }

    /// Drop the status row but keep the broadcast channel, as if the OS
    /// lost the record between the broadcast and the follow-up query
    pub fn clear_snapshot(&self, handle: i64) {
        lock(&self.snapshots).remove(&handle);
    }

    /// Fire the completion broadcast for a handle
    pub fn trigger_complete(&self, handle: i64) {
        if let Some(sender) = lock(&self.broadcasts).get(&handle) {
            // send_replace so the value sticks even before the waiter subscribes
            sender.send_replace(true);
        }
    }

    pub fn enqueues(&self) -> usize {
        self.enqueue_count.load(Ordering::SeqCst)
    }

    pub fn removed_handles(&self) -> Vec<i64> {
        lock(&self.removed).clone()
    }
}

#[async_trait]
impl DownloadService for MockDownloadService {
    async fn enqueue(&self, _request: DownloadRequest) -> Result<i64> {
        self.enqueue_count.fetch_add(1, Ordering::SeqCst);
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        lock(&self.snapshots).insert(handle, pending_snapshot());
        let (sender, _) = watch::channel(false);
        lock(&self.broadcasts).insert(handle, sender);
        Ok(handle)
    }

    async fn query(&self, handle: i64) -> Result<Option<DownloadSnapshot>> {
        if self.query_fails.load(Ordering::SeqCst) {
            return Err(Error::Platform("status query failed".to_string()));
        }
        Ok(lock(&self.snapshots).get(&handle).cloned())
    }

    async fn remove(&self, handle: i64) -> Result<bool> {
        lock(&self.removed).push(handle);
        lock(&self.broadcasts).remove(&handle);
        Ok(lock(&self.snapshots).remove(&handle).is_some())
    }

    async fn wait_complete(&self, handle: i64) -> Result<()> {
        let mut receiver = lock(&self.broadcasts)
            .get(&handle)
            .map(watch::Sender::subscribe)
            .ok_or(Error::DownloadNotFound)?;
        receiver
            .wait_for(|done| *done)
            .await
            .map_err(|_| Error::DownloadNotFound)?;
        Ok(())
    }
}

// ===== MockPackageInstaller =====

pub(crate) struct MockPackageInstaller {
    pub can_install: AtomicBool,
    pub granted: AtomicBool,
    pub install_fails: AtomicBool,
    pub install_calls: Mutex<Vec<PathBuf>>,
}

impl MockPackageInstaller {
    pub fn new() -> Self {
        Self {
            can_install: AtomicBool::new(true),
            granted: AtomicBool::new(true),
            install_fails: AtomicBool::new(false),
            install_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn install_count(&self) -> usize {
        lock(&self.install_calls).len()
    }
}

#[async_trait]
impl PackageInstaller for MockPackageInstaller {
    async fn can_install(&self) -> Result<InstallPermissionStatus> {
        let can_install = self.can_install.load(Ordering::SeqCst);
        Ok(InstallPermissionStatus {
            can_install,
            reason: (!can_install).then(|| "Installation permission not granted".to_string()),
        })
    }

    async fn request_install_permission(&self) -> Result<PermissionResult> {
        Ok(PermissionResult {
            granted: self.granted.load(Ordering::SeqCst),
        })
    }

    async fn install(&self, path: &Path) -> Result<()> {
        lock(&self.install_calls).push(path.to_path_buf());
        if self.install_fails.load(Ordering::SeqCst) {
            Err(Error::InstallFailed("mock refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn app_info(&self) -> Result<AppInfo> {
        Ok(AppInfo {
            success: true,
            package_name: Some("com.example.app".to_string()),
            version_name: Some("1.2.3".to_string()),
            version_code: Some(1_002_003),
            error: None,
        })
    }
}

// ===== RecordingListener =====

pub(crate) struct RecordingListener {
    pub progress: Mutex<Vec<DownloadProgressEvent>>,
    pub completions: Mutex<Vec<DownloadCompleteEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self {
            progress: Mutex::new(Vec::new()),
            completions: Mutex::new(Vec::new()),
        }
    }

    pub fn completion_events(&self) -> Vec<DownloadCompleteEvent> {
        lock(&self.completions).clone()
    }

    pub fn progress_events(&self) -> Vec<DownloadProgressEvent> {
        lock(&self.progress).clone()
    }
}

#[async_trait]
impl DownloadListener for RecordingListener {
    async fn on_progress(&self, event: DownloadProgressEvent) {
        lock(&self.progress).push(event);
    }

    async fn on_complete(&self, event: DownloadCompleteEvent) {
        lock(&self.completions).push(event);
    }
}

// ===== Fixture =====

pub(crate) struct Fixture {
    pub updater: ApkUpdater,
    pub downloads: Arc<MockDownloadService>,
    pub installer: Arc<MockPackageInstaller>,
    pub listener: Arc<RecordingListener>,
}

pub(crate) fn fixture() -> Fixture {
    let downloads = Arc::new(MockDownloadService::new());
    let installer = Arc::new(MockPackageInstaller::new());
    let listener = Arc::new(RecordingListener::new());
    let updater = ApkUpdater::new(
        Arc::clone(&downloads) as Arc<dyn DownloadService>,
        Arc::clone(&installer) as Arc<dyn PackageInstaller>,
        Arc::clone(&listener) as Arc<dyn DownloadListener>,
    );
    Fixture {
        updater,
        downloads,
        installer,
        listener,
    }
}
