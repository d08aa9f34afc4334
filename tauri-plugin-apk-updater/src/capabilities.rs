//! Android SDK 能力查表
//!
//! 安装权限模型在 API 26 改制、FileProvider 在 API 24 强制启用。
//! 集中成一张纯函数查表，避免各处散落的版本判断。

/// Which permission model gates "install from this source"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPermissionModel {
    /// API < 26: the global "unknown sources" secure setting
    UnknownSources,
    /// API >= 26: per-app `canRequestPackageInstalls` grant
    RuntimeGrant,
}

/// Capabilities of a given Android API level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkCapabilities {
    pub api_level: i32,
    pub install_permission_model: InstallPermissionModel,
    /// Install intents must use a content URI with a read grant
    pub uses_file_provider: bool,
}

impl SdkCapabilities {
    #[must_use]
    pub fn for_api_level(api_level: i32) -> Self {
        let install_permission_model = if api_level >= 26 {
            InstallPermissionModel::RuntimeGrant
        } else {
            InstallPermissionModel::UnknownSources
        };
        Self {
            api_level,
            install_permission_model,
            uses_file_provider: api_level >= 24,
        }
    }

    /// Human-readable reason when the install capability is absent
    #[must_use]
    pub fn denial_reason(&self) -> &'static str {
        match self.install_permission_model {
            InstallPermissionModel::UnknownSources => "Unknown sources not enabled",
            InstallPermissionModel::RuntimeGrant => "Installation permission not granted",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn api_23_uses_unknown_sources_without_file_provider() {
        let caps = SdkCapabilities::for_api_level(23);
        assert_eq!(
            caps.install_permission_model,
            InstallPermissionModel::UnknownSources
        );
        assert!(!caps.uses_file_provider);
        assert_eq!(caps.denial_reason(), "Unknown sources not enabled");
    }

    #[test]
    fn api_24_turns_on_file_provider() {
        let caps = SdkCapabilities::for_api_level(24);
        assert_eq!(
            caps.install_permission_model,
            InstallPermissionModel::UnknownSources
        );
        assert!(caps.uses_file_provider);
    }

    #[test]
    fn api_25_still_unknown_sources() {
        let caps = SdkCapabilities::for_api_level(25);
        assert_eq!(
            caps.install_permission_model,
            InstallPermissionModel::UnknownSources
        );
        assert!(caps.uses_file_provider);
    }

    #[test]
    fn api_26_switches_to_runtime_grant() {
        let caps = SdkCapabilities::for_api_level(26);
        assert_eq!(
            caps.install_permission_model,
            InstallPermissionModel::RuntimeGrant
        );
        assert!(caps.uses_file_provider);
        assert_eq!(caps.denial_reason(), "Installation permission not granted");
    }

    #[test]
    fn api_34_matches_api_26_model() {
        assert_eq!(
            SdkCapabilities::for_api_level(34),
            SdkCapabilities {
                api_level: 34,
                ..SdkCapabilities::for_api_level(26)
            }
        );
    }
}
