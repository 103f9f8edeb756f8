// Audio pipeline module
// Decodes the synthesis payload and plays it through cpal

pub mod codec;
pub mod output;
pub mod player;

pub use codec::AudioBuffer;
pub use player::Player;
