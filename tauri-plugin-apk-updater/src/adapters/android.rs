//! Android 移动端桥接适配器
//!
//! 通过注册的 Kotlin 插件类转调系统 `DownloadManager` 与安装 Intent，
//! 权限分支由 [`SdkCapabilities`] 查表决定，不在这里写版本判断。

use std::path::Path;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tauri::plugin::PluginHandle;
use tauri::{AppHandle, Runtime, plugin::PluginApi};

use crate::capabilities::{InstallPermissionModel, SdkCapabilities};
use crate::error::{Error, Result};
use crate::models::{
    AppInfo, DownloadRequest, DownloadSnapshot, DownloadState, InstallPermissionStatus,
    PermissionResult,
};
use crate::traits::{DownloadService, PackageInstaller};

const PLUGIN_IDENTIFIER: &str = "app.tauri.plugin.apkupdater";

// ===== Bridge payloads =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformInfoResponse {
    sdk_int: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueResponse {
    handle: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HandlePayload {
    handle: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    found: bool,
    status: Option<i64>,
    bytes_downloaded: Option<i64>,
    total_size: Option<i64>,
    local_uri: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveResponse {
    removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlagResponse {
    value: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantResponse {
    granted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallApkPayload {
    path: String,
    use_file_provider: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallApkResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppInfoResponse {
    package_name: String,
    version_name: String,
    version_code: i64,
}

/// 注册 Kotlin 插件类并完成 SDK 版本握手
pub struct AndroidBridge<R: Runtime> {
    handle: PluginHandle<R>,
    capabilities: SdkCapabilities,
}

impl<R: Runtime> AndroidBridge<R> {
    pub fn register(_app: &AppHandle<R>, api: PluginApi<R, ()>) -> Result<Self> {
        let handle = api.register_android_plugin(PLUGIN_IDENTIFIER, "ApkUpdaterPlugin")?;
        let info: PlatformInfoResponse = handle.run_mobile_plugin("getPlatformInfo", ())?;
        let capabilities = SdkCapabilities::for_api_level(info.sdk_int);
        info!(
            "[Bridge] Android plugin registered, API level {}",
            capabilities.api_level
        );
        Ok(Self {
            handle,
            capabilities,
        })
    }

    pub fn download_service(&self) -> AndroidDownloadService<R> {
        AndroidDownloadService {
            handle: self.handle.clone(),
        }
    }

    pub fn package_installer(&self) -> AndroidPackageInstaller<R> {
        AndroidPackageInstaller {
            handle: self.handle.clone(),
            capabilities: self.capabilities,
        }
    }
}

/// 系统 `DownloadManager` 适配器
pub struct AndroidDownloadService<R: Runtime> {
    handle: PluginHandle<R>,
}

#[async_trait]
impl<R: Runtime> DownloadService for AndroidDownloadService<R> {
    async fn enqueue(&self, request: DownloadRequest) -> Result<i64> {
        let response: EnqueueResponse = self.handle.run_mobile_plugin("enqueueDownload", request)?;
        Ok(response.handle)
    }

    async fn query(&self, handle: i64) -> Result<Option<DownloadSnapshot>> {
        let response: QueryResponse = self
            .handle
            .run_mobile_plugin("queryDownload", HandlePayload { handle })?;
        if !response.found {
            return Ok(None);
        }
        Ok(Some(DownloadSnapshot {
            state: DownloadState::from(response.status.unwrap_or(16)),
            bytes_downloaded: response.bytes_downloaded.unwrap_or(0),
            total_size: response.total_size.unwrap_or(-1),
            local_path: response.local_uri,
            reason: response.reason,
        }))
    }

    async fn remove(&self, handle: i64) -> Result<bool> {
        let response: RemoveResponse = self
            .handle
            .run_mobile_plugin("removeDownload", HandlePayload { handle })?;
        Ok(response.removed)
    }

    async fn wait_complete(&self, handle: i64) -> Result<()> {
        // Kotlin parks this invoke until the ACTION_DOWNLOAD_COMPLETE
        // broadcast for the handle, so it must not block the runtime
        let plugin = self.handle.clone();
        tokio::task::spawn_blocking(move || {
            plugin.run_mobile_plugin::<FlagResponse>("waitForCompletion", HandlePayload { handle })
        })
        .await
        .map_err(|e| Error::Platform(e.to_string()))??;
        debug!("[Bridge] Completion broadcast for download {handle}");
        Ok(())
    }
}

/// 系统安装 Intent 与安装权限适配器
pub struct AndroidPackageInstaller<R: Runtime> {
    handle: PluginHandle<R>,
    capabilities: SdkCapabilities,
}

#[async_trait]
impl<R: Runtime> PackageInstaller for AndroidPackageInstaller<R> {
    async fn can_install(&self) -> Result<InstallPermissionStatus> {
        let method = match self.capabilities.install_permission_model {
            InstallPermissionModel::RuntimeGrant => "canRequestPackageInstalls",
            InstallPermissionModel::UnknownSources => "isUnknownSourcesEnabled",
        };
        let response: FlagResponse = self.handle.run_mobile_plugin(method, ())?;
        Ok(InstallPermissionStatus {
            can_install: response.value,
            reason: (!response.value).then(|| self.capabilities.denial_reason().to_string()),
        })
    }

    async fn request_install_permission(&self) -> Result<PermissionResult> {
        match self.capabilities.install_permission_model {
            // no per-app grant exists before API 26, only the global setting
            InstallPermissionModel::UnknownSources => Ok(PermissionResult { granted: true }),
            InstallPermissionModel::RuntimeGrant => {
                // Kotlin resolves after the settings-screen round trip
                let plugin = self.handle.clone();
                let response = tokio::task::spawn_blocking(move || {
                    plugin.run_mobile_plugin::<GrantResponse>("requestInstallPermission", ())
                })
                .await
                .map_err(|e| Error::Platform(e.to_string()))??;
                Ok(PermissionResult {
                    granted: response.granted,
                })
            }
        }
    }

    async fn install(&self, path: &Path) -> Result<()> {
        let response: InstallApkResponse = self.handle.run_mobile_plugin(
            "installApk",
            InstallApkPayload {
                path: path.display().to_string(),
                use_file_provider: self.capabilities.uses_file_provider,
            },
        )?;
        if response.success {
            Ok(())
        } else {
            Err(Error::InstallFailed(
                "Failed to launch installation".to_string(),
            ))
        }
    }

    async fn app_info(&self) -> Result<AppInfo> {
        let response: AppInfoResponse = self.handle.run_mobile_plugin("getAppInfo", ())?;
        Ok(AppInfo {
            success: true,
            package_name: Some(response.package_name),
            version_name: Some(response.version_name),
            version_code: Some(response.version_code),
            error: None,
        })
    }
}
