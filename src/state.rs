// Application state management
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::audio::player::Player;

/// Result of one successful generation. The raw PCM bytes are kept
/// alongside the player's decoded buffer so WAV export re-encodes the
/// exact payload the service returned.
pub struct GeneratedAudio {
    pub raw_pcm: Vec<u8>,
    pub duration: f64,
}

pub struct AppState {
    pub player: Arc<Mutex<Player>>,
    pub audio: Arc<Mutex<Option<GeneratedAudio>>>,
    pub generating: AtomicBool,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(player: Player, app_dir: PathBuf) -> Self {
        Self {
            player: Arc::new(Mutex::new(player)),
            audio: Arc::new(Mutex::new(None)),
            generating: AtomicBool::new(false),
            app_dir,
        }
    }
}
