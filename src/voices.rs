// Prebuilt voice catalog
// The synthesis client only consumes `voice_name`; the rest is for the UI

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VoiceGender {
    Male,
    Female,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceOption {
    pub id: &'static str,
    pub name: &'static str,
    pub gender: VoiceGender,
    /// Prebuilt voice name understood by the synthesis API
    pub voice_name: &'static str,
}

pub const AVAILABLE_VOICES: &[VoiceOption] = &[
    VoiceOption { id: "male-1", name: "Male Voice 1", gender: VoiceGender::Male, voice_name: "Kore" },
    VoiceOption { id: "female-1", name: "Female Voice 1", gender: VoiceGender::Female, voice_name: "Puck" },
    VoiceOption { id: "male-2", name: "Male Voice 2", gender: VoiceGender::Male, voice_name: "Charon" },
    VoiceOption { id: "female-2", name: "Female Voice 2", gender: VoiceGender::Female, voice_name: "Zephyr" },
];

pub fn find_by_id(id: &str) -> Option<&'static VoiceOption> {
    AVAILABLE_VOICES.iter().find(|voice| voice.id == id)
}
