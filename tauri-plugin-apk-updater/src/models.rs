//! Wire records crossing the plugin boundary
//!
//! All records are flat and immutable; `status` is serialized as the numeric
//! `DownloadManager` status code so existing frontend code keeps working.

use serde::{Deserialize, Serialize};

// ===== Download state =====

/// Android `DownloadManager` status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum DownloadState {
    Pending,
    Running,
    Paused,
    Successful,
    Failed,
    /// A code this plugin does not know about; carried through untouched
    Unknown(i64),
}

impl DownloadState {
    /// The transfer will not progress further
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }

    /// The transfer is queued or moving bytes
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl From<i64> for DownloadState {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Pending,
            2 => Self::Running,
            4 => Self::Paused,
            8 => Self::Successful,
            16 => Self::Failed,
            other => Self::Unknown(other),
        }
    }
}

impl From<DownloadState> for i64 {
    fn from(state: DownloadState) -> Self {
        match state {
            DownloadState::Pending => 1,
            DownloadState::Running => 2,
            DownloadState::Paused => 4,
            DownloadState::Successful => 8,
            DownloadState::Failed => 16,
            DownloadState::Unknown(other) => other,
        }
    }
}

/// Integer percentage in [0, 100]; 0 when the total is unknown
#[must_use]
pub fn progress_percent(bytes_downloaded: i64, total_size: i64) -> i32 {
    if total_size <= 0 {
        return 0;
    }
    let pct = bytes_downloaded.saturating_mul(100) / total_size;
    i32::try_from(pct.clamp(0, 100)).unwrap_or(100)
}

// ===== Status / result records =====

/// Snapshot of the tracked download, shaped for the frontend
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStatus {
    pub success: bool,
    pub bytes_downloaded: i64,
    pub total_size: i64,
    pub progress: i32,
    pub status: DownloadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DownloadStatus {
    /// Failure record for "no record to report on"
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            bytes_downloaded: 0,
            total_size: 0,
            progress: 0,
            status: DownloadState::Failed,
            file_path: None,
            reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn from_snapshot(snapshot: &DownloadSnapshot) -> Self {
        Self {
            success: true,
            bytes_downloaded: snapshot.bytes_downloaded,
            total_size: snapshot.total_size,
            progress: progress_percent(snapshot.bytes_downloaded, snapshot.total_size),
            status: snapshot.state,
            file_path: snapshot.local_path.clone(),
            reason: None,
        }
    }
}

/// Install-from-this-source capability
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPermissionStatus {
    pub can_install: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Version info of the hosting app
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDownloadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResult {
    pub granted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResult {
    pub cancelled: bool,
}

// ===== Events =====

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgressEvent {
    pub progress: i32,
    pub bytes_downloaded: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCompleteEvent {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadCompleteEvent {
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            file_path: None,
            installed: None,
            error: Some(error.into()),
        }
    }
}

// ===== Download requests =====

/// Raw options as received from the frontend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOptions {
    pub url: String,
    pub filename: Option<String>,
    pub show_notification: Option<bool>,
    pub notification_title: Option<String>,
}

/// Options with defaults resolved, handed to the download service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    pub show_notification: bool,
    pub notification_title: String,
    pub description: String,
}

/// Service-level status row for one handle
#[derive(Debug, Clone)]
pub struct DownloadSnapshot {
    pub state: DownloadState,
    pub bytes_downloaded: i64,
    /// −1 or 0 when the service does not know the size yet
    pub total_size: i64,
    pub local_path: Option<String>,
    pub reason: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_zero_when_total_unknown() {
        assert_eq!(progress_percent(500, 0), 0);
        assert_eq!(progress_percent(500, -1), 0);
        assert_eq!(progress_percent(0, 0), 0);
    }

    #[test]
    fn progress_stays_within_bounds() {
        assert_eq!(progress_percent(0, 2000), 0);
        assert_eq!(progress_percent(1000, 2000), 50);
        assert_eq!(progress_percent(2000, 2000), 100);
        // more bytes than announced (server lied about Content-Length)
        assert_eq!(progress_percent(3000, 2000), 100);
        assert_eq!(progress_percent(-5, 2000), 0);
    }

    #[test]
    fn progress_truncates_toward_zero() {
        assert_eq!(progress_percent(1999, 2000), 99);
        assert_eq!(progress_percent(1, 2000), 0);
    }

    #[test]
    fn download_state_maps_os_codes() {
        assert_eq!(DownloadState::from(1), DownloadState::Pending);
        assert_eq!(DownloadState::from(2), DownloadState::Running);
        assert_eq!(DownloadState::from(4), DownloadState::Paused);
        assert_eq!(DownloadState::from(8), DownloadState::Successful);
        assert_eq!(DownloadState::from(16), DownloadState::Failed);
        assert_eq!(DownloadState::from(32), DownloadState::Unknown(32));
        assert_eq!(i64::from(DownloadState::Unknown(32)), 32);
    }

    #[test]
    fn download_state_predicates() {
        assert!(DownloadState::Successful.is_terminal());
        assert!(DownloadState::Failed.is_terminal());
        assert!(!DownloadState::Running.is_terminal());
        assert!(DownloadState::Pending.is_active());
        assert!(DownloadState::Running.is_active());
        assert!(!DownloadState::Paused.is_active());
        assert!(!DownloadState::Unknown(32).is_active());
    }

    #[test]
    fn download_status_serializes_camel_case_with_numeric_status() {
        let status = DownloadStatus {
            success: true,
            bytes_downloaded: 1000,
            total_size: 2000,
            progress: 50,
            status: DownloadState::Running,
            file_path: Some("/data/update.apk".into()),
            reason: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["bytesDownloaded"], 1000);
        assert_eq!(json["totalSize"], 2000);
        assert_eq!(json["progress"], 50);
        assert_eq!(json["status"], 2);
        assert_eq!(json["filePath"], "/data/update.apk");
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn unavailable_status_carries_reason_not_file_path() {
        let status = DownloadStatus::unavailable("No active download");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["status"], 16);
        assert_eq!(json["progress"], 0);
        assert_eq!(json["reason"], "No active download");
        assert!(json.get("filePath").is_none());
    }

    #[test]
    fn complete_event_omits_absent_fields() {
        let event = DownloadCompleteEvent {
            success: false,
            file_path: None,
            installed: None,
            error: Some("Download failed".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Download failed");
        assert!(json.get("filePath").is_none());
        assert!(json.get("installed").is_none());
    }

    #[test]
    fn download_options_accept_camel_case_keys() {
        let options: DownloadOptions = serde_json::from_str(
            r#"{
                "url": "https://example.com/app.apk",
                "filename": "u.apk",
                "showNotification": false,
                "notificationTitle": "T"
            }"#,
        )
        .unwrap();
        assert_eq!(options.url, "https://example.com/app.apk");
        assert_eq!(options.filename.as_deref(), Some("u.apk"));
        assert_eq!(options.show_notification, Some(false));
        assert_eq!(options.notification_title.as_deref(), Some("T"));
    }

    #[test]
    fn snapshot_to_status_derives_progress() {
        let snapshot = DownloadSnapshot {
            state: DownloadState::Running,
            bytes_downloaded: 512,
            total_size: 1024,
            local_path: Some("/cache/update.apk".into()),
            reason: None,
        };
        let status = DownloadStatus::from_snapshot(&snapshot);
        assert!(status.success);
        assert_eq!(status.progress, 50);
        assert_eq!(status.file_path.as_deref(), Some("/cache/update.apk"));
    }
}
