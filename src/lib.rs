// Vocalith - Desktop Text-to-Speech Studio
// Module declarations
mod audio;
mod commands;
mod settings;
mod state;
mod synthesis;
mod voices;

use audio::output::CpalOutput;
use audio::player::Player;
use settings::AppSettings;
use state::AppState;
use std::sync::Arc;
use tauri::{Emitter, Manager};

#[derive(Clone, serde::Serialize)]
struct ProgressPayload {
    position: f64,
    is_playing: bool,
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            // Get app data directory
            let app_dir = app.path().app_data_dir()
                .expect("Failed to get app data directory");

            let settings = AppSettings::load(&app_dir).unwrap_or_default();

            // Initialize audio output and player
            let output = CpalOutput::new()
                .expect("Failed to initialize audio output");
            let player = Player::new(Box::new(output));
            player.set_volume(settings.playback.volume);

            // Forward ticker positions to the frontend
            let handle = app.handle().clone();
            player.set_progress_listener(Arc::new(move |position, is_playing| {
                let _ = handle.emit("playback-progress", ProgressPayload { position, is_playing });
            }));

            // Create and manage app state
            let app_state = AppState::new(player, app_dir);
            app.manage(app_state);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_voices,
            commands::generate_speech,
            commands::play_audio,
            commands::pause_playback,
            commands::seek_playback,
            commands::stop_playback,
            commands::set_volume,
            commands::get_playback_state,
            commands::export_wav,
            commands::default_export_filename,
            commands::get_settings,
            commands::save_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
