//! Tauri APK Updater Plugin
//!
//! 让混合应用通过系统下载服务获取 APK、观察下载进度并唤起安装流程。
//! Android 端转调系统 `DownloadManager` 与安装 Intent；桌面端提供
//! reqwest 下载的等价实现，安装相关操作统一回答“仅 Android 支持”。
//!
//! 完成通知有广播与轮询两条触发路径，由门面内的一次性标记保证
//! 每次下载恰好对外回调一次。

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Emitter, Manager, RunEvent, Runtime};

mod adapters;
mod capabilities;
mod commands;
mod error;
mod models;
mod traits;
mod updater;

pub use capabilities::{InstallPermissionModel, SdkCapabilities};
pub use error::{Error, Result};
pub use models::*;
pub use traits::{DownloadListener, DownloadService, PackageInstaller};
pub use updater::ApkUpdater;

/// 进度事件名（全局事件）
pub const DOWNLOAD_PROGRESS_EVENT: &str = "apk-updater://download-progress";
/// 完成事件名（每次下载恰好一次）
pub const DOWNLOAD_COMPLETE_EVENT: &str = "apk-updater://download-complete";

/// 把门面回调转投为全局 Tauri 事件
struct EventBridge<R: Runtime> {
    app: tauri::AppHandle<R>,
}

#[async_trait]
impl<R: Runtime> DownloadListener for EventBridge<R> {
    async fn on_progress(&self, event: DownloadProgressEvent) {
        if let Err(e) = self.app.emit(DOWNLOAD_PROGRESS_EVENT, event) {
            warn!("[Plugin] Failed to emit download progress: {e}");
        }
    }

    async fn on_complete(&self, event: DownloadCompleteEvent) {
        if let Err(e) = self.app.emit(DOWNLOAD_COMPLETE_EVENT, event) {
            warn!("[Plugin] Failed to emit download completion: {e}");
        }
    }
}

/// 为任意 Manager 扩展 `apk_updater()` 访问器
pub trait ApkUpdaterExt<R: Runtime> {
    fn apk_updater(&self) -> &ApkUpdater;
}

impl<R: Runtime, T: Manager<R>> ApkUpdaterExt<R> for T {
    fn apk_updater(&self) -> &ApkUpdater {
        self.state::<ApkUpdater>().inner()
    }
}

/// 初始化插件
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("apk-updater")
        .invoke_handler(tauri::generate_handler![
            commands::start_apk_download,
            commands::get_download_status,
            commands::can_install_apks,
            commands::request_install_permission,
            commands::cancel_download,
            commands::install_apk,
            commands::get_app_info,
        ])
        .setup(|app, _api| {
            let listener: Arc<dyn DownloadListener> = Arc::new(EventBridge { app: app.clone() });

            #[cfg(target_os = "android")]
            let (downloads, installer): (Arc<dyn DownloadService>, Arc<dyn PackageInstaller>) = {
                let bridge = adapters::AndroidBridge::register(app, _api)?;
                (
                    Arc::new(bridge.download_service()),
                    Arc::new(bridge.package_installer()),
                )
            };

            #[cfg(not(target_os = "android"))]
            let (downloads, installer): (Arc<dyn DownloadService>, Arc<dyn PackageInstaller>) = {
                let config = app.config();
                (
                    Arc::new(adapters::NativeDownloadService::new(
                        app.path().app_cache_dir()?,
                    )),
                    Arc::new(adapters::NativePackageInstaller::new(
                        config.identifier.clone(),
                        config.version.clone(),
                    )),
                )
            };

            app.manage(ApkUpdater::new(downloads, installer, listener));
            Ok(())
        })
        .on_event(|app, event| {
            if matches!(event, RunEvent::Exit) {
                app.apk_updater().cleanup();
            }
        })
        .build()
}
