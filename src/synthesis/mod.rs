// Remote speech synthesis
// Thin client over the Gemini generateContent API

pub mod client;

pub use client::{generate_speech, SynthesisError};
