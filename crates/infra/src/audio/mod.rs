//! Audio adapters for the streaming engine
//!
//! - `wav`: hound-backed source loading and WAV output
//! - `cpal_backend`: device playback through CPAL (WASAPI, ALSA/PulseAudio, CoreAudio)
//! - `simulated`: clocked playback for offline rendering and tests
//! - `spectrum`: rustfft magnitude snapshots of the audible buffer

pub mod cpal_backend;
pub mod simulated;
pub mod spectrum;
pub mod wav;

pub use cpal_backend::*;
pub use simulated::*;
pub use spectrum::*;
pub use wav::*;
