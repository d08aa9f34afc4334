const COMMANDS: &[&str] = &[
    "start_apk_download",
    "get_download_status",
    "can_install_apks",
    "request_install_permission",
    "cancel_download",
    "install_apk",
    "get_app_info",
];

fn main() {
    tauri_plugin::Builder::new(COMMANDS).build();
}
