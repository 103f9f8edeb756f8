// Tauri command handlers
use serde::Serialize;
use std::sync::atomic::Ordering;
use tauri::State;

use crate::audio::codec;
use crate::settings::AppSettings;
use crate::state::{AppState, GeneratedAudio};
use crate::synthesis;
use crate::voices::{self, VoiceOption};

#[derive(Serialize)]
pub struct GenerateResult {
    pub duration: f64,
    pub sample_rate: u32,
    pub size_bytes: usize,
}

#[derive(Serialize)]
pub struct PlaybackStateResponse {
    pub is_playing: bool,
    pub position: f64,
    pub duration: f64,
}

// ===== Voice Catalog =====

#[tauri::command]
pub fn get_voices() -> Vec<VoiceOption> {
    voices::AVAILABLE_VOICES.to_vec()
}

// ===== Generation =====

#[tauri::command]
pub async fn generate_speech(
    text: String,
    voice_id: String,
    state: State<'_, AppState>,
) -> Result<GenerateResult, String> {
    if text.trim().is_empty() {
        return Err("Please enter some text to generate audio.".to_string());
    }

    let voice = voices::find_by_id(&voice_id)
        .ok_or_else(|| format!("Unknown voice: {}", voice_id))?;

    // Only one generation at a time; the flag is cleared on every exit path
    if state.generating.swap(true, Ordering::SeqCst) {
        return Err("A generation is already in progress.".to_string());
    }

    // Clear prior audio before the network call so a failed attempt
    // never leaves stale audio or a stale duration behind
    {
        let mut player = state.player.lock().unwrap();
        player.clear();
    }
    state.audio.lock().unwrap().take();

    let result = run_generation(&text, voice.voice_name, &state).await;
    state.generating.store(false, Ordering::SeqCst);
    result
}

async fn run_generation(
    text: &str,
    voice_name: &str,
    state: &State<'_, AppState>,
) -> Result<GenerateResult, String> {
    let base64_audio = synthesis::generate_speech(text, voice_name)
        .await
        .map_err(|e| format!("Failed to generate speech: {}", e))?;

    let raw = codec::decode_base64(&base64_audio)
        .map_err(|e| format!("Failed to decode audio: {}", e))?;
    let buffer = codec::pcm_to_audio_buffer(&raw)
        .map_err(|e| format!("Failed to decode audio: {}", e))?;

    let duration = buffer.duration();
    let size_bytes = raw.len();

    {
        let mut player = state.player.lock().unwrap();
        player.load(buffer);
    }
    *state.audio.lock().unwrap() = Some(GeneratedAudio { raw_pcm: raw, duration });

    eprintln!("[Synthesis] Generated {:.2}s of audio ({} bytes)", duration, size_bytes);

    Ok(GenerateResult {
        duration,
        sample_rate: codec::SYNTHESIS_SAMPLE_RATE,
        size_bytes,
    })
}

// ===== Playback =====

#[tauri::command]
pub fn play_audio(state: State<'_, AppState>) -> Result<(), String> {
    let mut player = state.player.lock().unwrap();
    player.play()
}

#[tauri::command]
pub fn pause_playback(state: State<'_, AppState>) -> Result<(), String> {
    let mut player = state.player.lock().unwrap();
    player.pause();
    Ok(())
}

#[tauri::command]
pub fn seek_playback(position: f64, state: State<'_, AppState>) -> Result<(), String> {
    let mut player = state.player.lock().unwrap();
    player.seek(position)
}

#[tauri::command]
pub fn stop_playback(state: State<'_, AppState>) -> Result<(), String> {
    let mut player = state.player.lock().unwrap();
    player.stop();
    Ok(())
}

#[tauri::command]
pub fn set_volume(volume: f32, state: State<'_, AppState>) -> Result<(), String> {
    let player = state.player.lock().unwrap();
    player.set_volume(volume);
    Ok(())
}

#[tauri::command]
pub fn get_playback_state(state: State<'_, AppState>) -> Result<PlaybackStateResponse, String> {
    let player = state.player.lock().unwrap();

    Ok(PlaybackStateResponse {
        is_playing: player.is_playing(),
        position: player.position(),
        duration: player.duration(),
    })
}

// ===== Export =====

#[tauri::command]
pub async fn export_wav(path: String, state: State<'_, AppState>) -> Result<(), String> {
    let wav = {
        let audio = state.audio.lock().unwrap();
        let audio = audio.as_ref().ok_or("No audio to export")?;
        codec::encode_wav_default(&audio.raw_pcm)
    };
    let size = wav.len();

    // Write off the event loop
    let target = path.clone();
    tokio::task::spawn_blocking(move || {
        std::fs::write(&target, &wav)
            .map_err(|e| format!("Failed to write WAV file: {}", e))
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))??;

    eprintln!("[Export] Saved {} bytes to {}", size, path);
    Ok(())
}

#[tauri::command]
pub fn default_export_filename() -> String {
    format!("speech_{}.wav", chrono::Local::now().format("%Y-%m-%d"))
}

// ===== Settings =====

#[tauri::command]
pub fn get_settings(state: State<'_, AppState>) -> Result<AppSettings, String> {
    AppSettings::load(&state.app_dir)
}

#[tauri::command]
pub fn save_settings(settings: AppSettings, state: State<'_, AppState>) -> Result<(), String> {
    settings.save(&state.app_dir)?;

    // Volume takes effect immediately
    let player = state.player.lock().unwrap();
    player.set_volume(settings.playback.volume);
    Ok(())
}
