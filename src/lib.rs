pub mod artifact;
pub mod backends;
pub mod config_loader;
pub mod engine;
pub mod error;
pub mod output;
pub mod playback;
pub mod transport;
pub mod wav;
