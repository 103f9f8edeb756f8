// Gemini TTS client
// Sends text plus a prebuilt voice name, receives base64 PCM audio

use serde::{Deserialize, Serialize};
use thiserror::Error;

const TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Speech synthesis request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Speech synthesis service returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("No audio data received from the API")]
    NoAudio,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: Option<String>,
}

fn build_request<'a>(text: &'a str, voice_name: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part { text }],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["AUDIO"],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig { voice_name },
                },
            },
        },
    }
}

fn extract_audio(response: GenerateResponse) -> Option<String> {
    response
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?
        .into_iter()
        .find_map(|part| part.inline_data.and_then(|data| data.data))
}

/// Synthesize `text` with the given prebuilt voice. Returns the base64
/// PCM payload (16-bit LE, mono, 24 kHz). No automatic retry.
pub async fn generate_speech(text: &str, voice_name: &str) -> Result<String, SynthesisError> {
    let api_key = std::env::var(API_KEY_ENV).map_err(|_| SynthesisError::MissingApiKey)?;

    let url = format!("{}/{}:generateContent", API_BASE_URL, TTS_MODEL);
    let body = build_request(text, voice_name);

    let client = reqwest::Client::new();
    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SynthesisError::Service {
            status: status.as_u16(),
            message,
        });
    }

    let parsed: GenerateResponse = response.json().await?;
    extract_audio(parsed).ok_or(SynthesisError::NoAudio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = build_request("hello", "Kore");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
    }

    #[test]
    fn test_extract_audio_from_response() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {
                        "parts": [{
                            "inlineData": { "mimeType": "audio/pcm", "data": "AAEC" }
                        }]
                    }
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(extract_audio(response).unwrap(), "AAEC");
    }

    #[test]
    fn test_extract_audio_missing_data() {
        let response: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"content": {"parts": [{}]}}]}"#).unwrap();
        assert!(extract_audio(response).is_none());

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(extract_audio(empty).is_none());
    }
}
