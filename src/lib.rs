pub mod clipboard;
pub mod commands;
pub mod config;
pub mod controller;
pub mod drag;
pub mod error;
pub mod geometry;
pub mod ipc;
pub mod logging;
pub mod platform;
pub mod port_reaper;
pub mod supervisor;
pub mod window;

use clipboard::TauriClipboard;
use config::OverlayConfig;
use controller::OverlayController;
use platform::TauriWindowFactory;
use std::sync::Arc;
use supervisor::{BackingServiceSupervisor, HttpProbe};
use tauri::menu::{Menu, MenuItem};
use tauri::tray::TrayIconBuilder;
use tauri::{App, AppHandle, Emitter, Manager, RunEvent, WindowEvent};
use tauri_plugin_global_shortcut::{Shortcut, ShortcutState};
use window::{OverlayWindowManager, CONTENT_LABEL};

pub type AppController = OverlayController<TauriWindowFactory<tauri::Wry>>;

fn load_env() {
    // .env in the working directory, else one level up
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename("../.env");
    }
}

fn toggle_shortcut_plugin(accelerator: &str) -> Option<tauri::plugin::TauriPlugin<tauri::Wry>> {
    let shortcut: Shortcut = match accelerator.parse() {
        Ok(shortcut) => shortcut,
        Err(e) => {
            tracing::warn!("[overlay] ignoring toggle shortcut {:?}: {}", accelerator, e);
            return None;
        }
    };
    let builder = match tauri_plugin_global_shortcut::Builder::new().with_shortcut(shortcut) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!("[overlay] could not register {:?}: {}", accelerator, e);
            return None;
        }
    };
    Some(
        builder
            .with_handler(|app, _shortcut, event| {
                if event.state == ShortcutState::Pressed {
                    commands::toggle_from_host(app);
                }
            })
            .build(),
    )
}

fn build_tray(app: &App) -> tauri::Result<()> {
    let Some(icon) = app.default_window_icon().cloned() else {
        tracing::warn!("[overlay] no window icon bundled, skipping tray");
        return Ok(());
    };
    let toggle_i = MenuItem::with_id(app, "toggle", "Show / hide popup", true, None::<&str>)?;
    let quit_i = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;
    let menu = Menu::with_items(app, &[&toggle_i, &quit_i])?;

    TrayIconBuilder::new()
        .icon(icon)
        .tooltip("Polish")
        .menu(&menu)
        .on_menu_event(|app, event| match event.id.as_ref() {
            "toggle" => commands::toggle_from_host(app),
            "quit" => app.exit(0),
            _ => {}
        })
        .build(app)?;
    Ok(())
}

fn setup(app: &mut App, config: OverlayConfig, supervisor: Arc<BackingServiceSupervisor>) -> anyhow::Result<()> {
    let handle = app.handle().clone();

    let windows = OverlayWindowManager::new(TauriWindowFactory::new(handle.clone()), config.layout, supervisor.url());
    let controller: AppController = OverlayController::new(
        windows,
        Box::new(TauriClipboard::new(handle.clone())),
        Box::new(HttpProbe::new()),
        supervisor.clone(),
    );
    app.manage(controller);
    build_tray(app)?;

    // Backing service first, then the button. A service that never comes up
    // still gets a button; the content window shows the load failure.
    tauri::async_runtime::spawn(async move {
        let service = supervisor.start().await;
        tracing::info!("[overlay] backing service {:?} at {}", service.state(), service.url());

        let controller = handle.state::<AppController>();
        if let Err(e) = controller.create_control_window() {
            tracing::error!("[overlay] failed to create control window: {}", e);
            return;
        }
        if let Err(e) = handle.emit(commands::EVENT_SERVICE_STATUS, service.status()) {
            tracing::warn!("[overlay] failed to emit service status: {}", e);
        }
    });
    Ok(())
}

fn teardown(app: &AppHandle) {
    if let Some(controller) = app.try_state::<AppController>() {
        tauri::async_runtime::block_on(controller.shutdown());
    } else if let Some(supervisor) = app.try_state::<Arc<BackingServiceSupervisor>>() {
        tauri::async_runtime::block_on(supervisor.stop());
    }
    tracing::info!("[overlay] shut down");
}

pub fn run() {
    load_env();
    logging::init();

    let config = OverlayConfig::from_env().unwrap_or_else(|e| {
        tracing::error!("[overlay] bad configuration, using defaults: {}", e);
        OverlayConfig::default()
    });
    tracing::info!("[overlay] backing service on port {}", config.service.port);

    let supervisor = Arc::new(BackingServiceSupervisor::system(config.service.clone()));

    let mut builder = tauri::Builder::default().plugin(tauri_plugin_clipboard_manager::init());
    if let Some(plugin) = toggle_shortcut_plugin(&config.toggle_shortcut) {
        builder = builder.plugin(plugin);
    }

    let setup_supervisor = supervisor.clone();
    let app = builder
        .manage(supervisor)
        .setup(move |app| {
            setup(app, config, setup_supervisor)?;
            Ok(())
        })
        .on_window_event(|window, event| {
            if window.label() != CONTENT_LABEL {
                return;
            }
            if let WindowEvent::Destroyed = event {
                if let Some(controller) = window.try_state::<AppController>() {
                    if let Err(e) = controller.content_closed() {
                        tracing::warn!("[overlay] content close not recorded: {}", e);
                    }
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::pointer_down,
            commands::pointer_move,
            commands::pointer_up,
            commands::toggle_content,
            commands::read_clipboard_text,
        ])
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("[overlay] failed to build application: {}", e);
            return;
        }
    };

    app.run(|app, event| {
        if let RunEvent::Exit = event {
            teardown(app);
        }
    });
}
