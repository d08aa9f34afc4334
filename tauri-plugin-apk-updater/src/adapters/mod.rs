//! Platform adapters for the OS service ports

#[cfg(not(target_os = "android"))]
mod native;
#[cfg(not(target_os = "android"))]
pub use native::{NativeDownloadService, NativePackageInstaller};

#[cfg(target_os = "android")]
mod android;
#[cfg(target_os = "android")]
pub use android::AndroidBridge;
