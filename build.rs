const COMMANDS: &[&str] = &[
    "pointer_down",
    "pointer_move",
    "pointer_up",
    "toggle_content",
    "read_clipboard_text",
];

fn main() {
    tauri_build::try_build(
        tauri_build::Attributes::new().app_manifest(tauri_build::AppManifest::new().commands(COMMANDS)),
    )
    .expect("failed to run tauri build script");
}
