//! Command 层：把门面结果映射为结构化响应
//!
//! 只有参数缺失会让命令 reject，其余失败一律折叠进
//! `success: false` 的结果记录（与前端既有约定一致）。

use log::warn;
use tauri::{AppHandle, Runtime, command};

use crate::ApkUpdaterExt;
use crate::error::{Error, Result};
use crate::models::{
    AppInfo, CancelResult, DownloadOptions, DownloadStatus, InstallPermissionStatus, InstallResult,
    PermissionResult, StartDownloadResult,
};

/// 启动 APK 下载
#[command]
pub async fn start_apk_download<R: Runtime>(
    app: AppHandle<R>,
    url: String,
    filename: Option<String>,
    show_notification: Option<bool>,
    notification_title: Option<String>,
) -> Result<StartDownloadResult> {
    if url.trim().is_empty() {
        return Err(Error::Validation("URL is required".to_string()));
    }

    let options = DownloadOptions {
        url,
        filename,
        show_notification,
        notification_title,
    };
    match app.apk_updater().start_download(options).await {
        Ok(()) => Ok(StartDownloadResult {
            success: true,
            message: Some("Download started".to_string()),
            error: None,
        }),
        Err(e) => Ok(StartDownloadResult {
            success: false,
            message: None,
            error: Some(format!("Download failed: {e}")),
        }),
    }
}

/// 查询当前下载状态
#[command]
pub async fn get_download_status<R: Runtime>(app: AppHandle<R>) -> Result<DownloadStatus> {
    Ok(app.apk_updater().download_status().await)
}

/// 是否具备“安装未知来源应用”能力
#[command]
pub async fn can_install_apks<R: Runtime>(app: AppHandle<R>) -> Result<InstallPermissionStatus> {
    match app.apk_updater().can_install().await {
        Ok(status) => Ok(status),
        Err(e) => Ok(InstallPermissionStatus {
            can_install: false,
            reason: Some(e.to_string()),
        }),
    }
}

/// 请求安装权限（可能经历一次系统设置页往返）
#[command]
pub async fn request_install_permission<R: Runtime>(app: AppHandle<R>) -> Result<PermissionResult> {
    match app.apk_updater().request_install_permission().await {
        Ok(result) => Ok(result),
        Err(e) => {
            warn!("[Command] Install permission request failed: {e}");
            Ok(PermissionResult { granted: false })
        }
    }
}

/// 取消当前下载
#[command]
pub async fn cancel_download<R: Runtime>(app: AppHandle<R>) -> Result<CancelResult> {
    Ok(CancelResult {
        cancelled: app.apk_updater().cancel_download().await,
    })
}

/// 唤起系统安装器
#[command]
pub async fn install_apk<R: Runtime>(app: AppHandle<R>, file_path: String) -> Result<InstallResult> {
    if file_path.trim().is_empty() {
        return Err(Error::Validation("File path is required".to_string()));
    }

    match app.apk_updater().install_apk(&file_path).await {
        Ok(()) => Ok(InstallResult {
            success: true,
            message: Some("Installation intent launched".to_string()),
            error: None,
        }),
        Err(e) => {
            warn!("[Command] Install of {file_path} failed: {e}");
            Ok(InstallResult {
                success: false,
                message: None,
                error: Some(format!("Failed to launch installation: {e}")),
            })
        }
    }
}

/// 查询宿主应用的包名与版本
#[command]
pub async fn get_app_info<R: Runtime>(app: AppHandle<R>) -> Result<AppInfo> {
    match app.apk_updater().app_info().await {
        Ok(info) => Ok(info),
        Err(e) => Ok(AppInfo {
            success: false,
            package_name: None,
            version_name: None,
            version_code: None,
            error: Some(format!("Failed to get app info: {e}")),
        }),
    }
}
