//! Desktop stand-in for the OS download manager
//!
//! Re-implements the enqueue/query/remove/wait contract with a reqwest
//! streaming transfer into the app cache directory. APK installation has
//! no desktop counterpart, so the installer port only reports that.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::models::{
    AppInfo, DownloadRequest, DownloadSnapshot, DownloadState, InstallPermissionStatus,
    PermissionResult,
};
use crate::traits::{DownloadService, PackageInstaller};

const UNSUPPORTED_REASON: &str = "APK installation is only supported on Android";

/// One tracked transfer
struct Row {
    snapshot: DownloadSnapshot,
    done: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    client: reqwest::Client,
    download_dir: PathBuf,
    next_handle: AtomicI64,
    rows: Mutex<HashMap<i64, Row>>,
}

/// 桌面端下载服务（reqwest 流式传输）
pub struct NativeDownloadService {
    inner: Arc<Inner>,
}

impl NativeDownloadService {
    #[must_use]
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                download_dir,
                next_handle: AtomicI64::new(1),
                rows: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[async_trait]
impl DownloadService for NativeDownloadService {
    async fn enqueue(&self, request: DownloadRequest) -> Result<i64> {
        // the OS manager rejects non-HTTP URIs synchronously; so do we
        if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
            return Err(Error::Validation(format!(
                "Only http/https URLs can be downloaded: {}",
                request.url
            )));
        }

        let handle = self.inner.next_handle.fetch_add(1, Ordering::SeqCst);
        let destination = self.inner.download_dir.join(&request.filename);
        let (done, _) = watch::channel(false);

        let mut rows = self.inner.rows.lock().await;
        rows.insert(
            handle,
            Row {
                snapshot: DownloadSnapshot {
                    state: DownloadState::Pending,
                    bytes_downloaded: 0,
                    total_size: -1,
                    local_path: None,
                    reason: None,
                },
                done,
                task: None,
            },
        );
        let task = tokio::spawn(run_transfer(
            Arc::clone(&self.inner),
            handle,
            request.url,
            destination,
        ));
        if let Some(row) = rows.get_mut(&handle) {
            row.task = Some(task);
        }
        info!("[Download] Transfer {handle} enqueued");
        Ok(handle)
    }

    async fn query(&self, handle: i64) -> Result<Option<DownloadSnapshot>> {
        let rows = self.inner.rows.lock().await;
        Ok(rows.get(&handle).map(|row| row.snapshot.clone()))
    }

    async fn remove(&self, handle: i64) -> Result<bool> {
        let Some(row) = self.inner.rows.lock().await.remove(&handle) else {
            return Ok(false);
        };
        if let Some(task) = row.task {
            task.abort();
            // wait for the transfer to actually stop so its file handle is
            // closed before the delete (open handles block deletion on
            // Windows)
            let _ = task.await;
        }
        // the OS manager deletes the file on remove; best effort here
        if let Some(path) = row.snapshot.local_path {
            if let Err(e) = std::fs::remove_file(&path) {
                debug!("[Download] Could not delete {path}: {e}");
            }
        }
        info!("[Download] Transfer {handle} removed");
        Ok(true)
    }

    async fn wait_complete(&self, handle: i64) -> Result<()> {
        let mut receiver = {
            let rows = self.inner.rows.lock().await;
            rows.get(&handle)
                .map(|row| row.done.subscribe())
                .ok_or(Error::DownloadNotFound)?
        };
        // sender dropped = record removed, the wait fails as required
        receiver
            .wait_for(|done| *done)
            .await
            .map_err(|_| Error::DownloadNotFound)?;
        Ok(())
    }
}

async fn run_transfer(inner: Arc<Inner>, handle: i64, url: String, destination: PathBuf) {
    let outcome = transfer(&inner, handle, &url, &destination).await;

    let mut rows = inner.rows.lock().await;
    let Some(row) = rows.get_mut(&handle) else {
        // removed mid-flight
        return;
    };
    match outcome {
        Ok(bytes) => {
            row.snapshot.state = DownloadState::Successful;
            row.snapshot.bytes_downloaded = bytes;
            // servers that omit Content-Length leave the total unknown
            // until the stream ends
            if row.snapshot.total_size <= 0 {
                row.snapshot.total_size = bytes;
            }
            row.snapshot.local_path = Some(destination.display().to_string());
            info!("[Download] Transfer {handle} finished ({bytes} bytes)");
        }
        Err(e) => {
            row.snapshot.state = DownloadState::Failed;
            row.snapshot.reason = Some(e.to_string());
            warn!("[Download] Transfer {handle} failed: {e}");
        }
    }
    let _ = row.done.send(true);
}

async fn transfer(inner: &Inner, handle: i64, url: &str, destination: &Path) -> Result<i64> {
    let response = inner.client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Network(format!("HTTP {}", response.status().as_u16())));
    }
    let total_size = response
        .content_length()
        .and_then(|len| i64::try_from(len).ok())
        .unwrap_or(-1);

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(destination)?;

    {
        let mut rows = inner.rows.lock().await;
        if let Some(row) = rows.get_mut(&handle) {
            row.snapshot.state = DownloadState::Running;
            row.snapshot.total_size = total_size;
            row.snapshot.local_path = Some(destination.display().to_string());
        }
    }

    let mut stream = response.bytes_stream();
    let mut written: i64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        written += i64::try_from(chunk.len()).unwrap_or(0);

        let mut rows = inner.rows.lock().await;
        if let Some(row) = rows.get_mut(&handle) {
            row.snapshot.bytes_downloaded = written;
        }
    }
    file.sync_all()?;
    Ok(written)
}

/// 桌面端安装器：仅用于统一回答“仅 Android 支持”
pub struct NativePackageInstaller {
    package_name: String,
    version_name: Option<String>,
}

impl NativePackageInstaller {
    #[must_use]
    pub fn new(package_name: String, version_name: Option<String>) -> Self {
        Self {
            package_name,
            version_name,
        }
    }
}

/// `major * 1_000_000 + minor * 1_000 + patch`, the Android version-code
/// convention Tauri derives from a semver version
fn version_code(version_name: &str) -> Option<i64> {
    let mut parts = version_name.split(['.', '-', '+']);
    let major: i64 = parts.next()?.parse().ok()?;
    let minor: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    let patch: i64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
    Some(major * 1_000_000 + minor * 1_000 + patch)
}

#[async_trait]
impl PackageInstaller for NativePackageInstaller {
    async fn can_install(&self) -> Result<InstallPermissionStatus> {
        Ok(InstallPermissionStatus {
            can_install: false,
            reason: Some(UNSUPPORTED_REASON.to_string()),
        })
    }

    async fn request_install_permission(&self) -> Result<PermissionResult> {
        Ok(PermissionResult { granted: false })
    }

    async fn install(&self, _path: &Path) -> Result<()> {
        Err(Error::UnsupportedPlatform)
    }

    async fn app_info(&self) -> Result<AppInfo> {
        Ok(AppInfo {
            success: true,
            package_name: Some(self.package_name.clone()),
            version_name: self.version_name.clone(),
            version_code: self.version_name.as_deref().and_then(version_code),
            error: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(url: &str) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            filename: "update.apk".to_string(),
            show_notification: true,
            notification_title: "Downloading Update...".to_string(),
            description: "Downloading app update".to_string(),
        }
    }

    /// One-shot HTTP fixture: answers a single connection with `response`
    async fn serve_once(response: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut head = [0u8; 1024];
                let _ = stream.read(&mut head).await;
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            }
        });
        addr
    }

    fn http_ok(body: &[u8]) -> Vec<u8> {
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        response
    }

    #[tokio::test]
    async fn download_lands_bytes_on_disk() {
        let body = vec![0xAB_u8; 4096];
        let addr = serve_once(http_ok(&body)).await;
        let dir = tempfile::tempdir().unwrap();
        let service = NativeDownloadService::new(dir.path().to_path_buf());

        let handle = service
            .enqueue(request(&format!("http://{addr}/app.apk")))
            .await
            .unwrap();
        service.wait_complete(handle).await.unwrap();

        let snapshot = service.query(handle).await.unwrap().unwrap();
        assert_eq!(snapshot.state, DownloadState::Successful);
        assert_eq!(snapshot.bytes_downloaded, 4096);
        assert_eq!(snapshot.total_size, 4096);

        let path = snapshot.local_path.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn http_error_status_marks_the_transfer_failed() {
        let addr = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let service = NativeDownloadService::new(dir.path().to_path_buf());

        let handle = service
            .enqueue(request(&format!("http://{addr}/app.apk")))
            .await
            .unwrap();
        service.wait_complete(handle).await.unwrap();

        let snapshot = service.query(handle).await.unwrap().unwrap();
        assert_eq!(snapshot.state, DownloadState::Failed);
        assert!(snapshot.reason.unwrap().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn non_http_scheme_is_rejected_at_enqueue() {
        let dir = tempfile::tempdir().unwrap();
        let service = NativeDownloadService::new(dir.path().to_path_buf());

        let err = service
            .enqueue(request("ftp://example.com/app.apk"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(service.query(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_aborts_the_transfer_and_deletes_the_file() {
        // claims a huge body, sends a trickle, then stalls
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut head = [0u8; 1024];
                let _ = stream.read(&mut head).await;
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 10000000\r\n\r\n",
                    )
                    .await;
                let _ = stream.write_all(&[0u8; 1024]).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let service = NativeDownloadService::new(dir.path().to_path_buf());
        let handle = service
            .enqueue(request(&format!("http://{addr}/app.apk")))
            .await
            .unwrap();

        // wait for the row to report Running so the file exists
        let mut running = false;
        for _ in 0..50 {
            if let Some(snapshot) = service.query(handle).await.unwrap() {
                if snapshot.state == DownloadState::Running {
                    running = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(running);

        assert!(service.remove(handle).await.unwrap());
        assert!(service.query(handle).await.unwrap().is_none());
        assert!(!dir.path().join("update.apk").exists());
        assert!(service.wait_complete(handle).await.is_err());

        // removing again finds nothing
        assert!(!service.remove(handle).await.unwrap());
    }

    #[tokio::test]
    async fn installer_reports_the_unsupported_platform() {
        let installer = NativePackageInstaller::new("com.example.app".to_string(), None);

        let status = installer.can_install().await.unwrap();
        assert!(!status.can_install);
        assert_eq!(status.reason.as_deref(), Some(UNSUPPORTED_REASON));

        assert!(!installer.request_install_permission().await.unwrap().granted);
        assert!(matches!(
            installer.install(Path::new("/tmp/update.apk")).await,
            Err(Error::UnsupportedPlatform)
        ));
    }

    #[tokio::test]
    async fn app_info_derives_the_android_version_code() {
        let installer =
            NativePackageInstaller::new("com.example.app".to_string(), Some("1.2.3".to_string()));
        let info = installer.app_info().await.unwrap();
        assert!(info.success);
        assert_eq!(info.package_name.as_deref(), Some("com.example.app"));
        assert_eq!(info.version_name.as_deref(), Some("1.2.3"));
        assert_eq!(info.version_code, Some(1_002_003));
    }

    #[test]
    fn version_code_handles_odd_versions() {
        assert_eq!(version_code("2.0.0"), Some(2_000_000));
        assert_eq!(version_code("0.4.17"), Some(4_017));
        assert_eq!(version_code("1.2.3-beta.1"), Some(1_002_003));
        assert_eq!(version_code("not-a-version"), None);
    }
}
