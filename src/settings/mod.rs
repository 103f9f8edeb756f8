// Settings module
// Persists user preferences in the app data directory

pub mod settings;

pub use settings::AppSettings;
