pub mod audio_chunk;
pub mod config;
pub mod error;
pub mod format;
pub mod metrics;
pub mod state;
pub mod target;
