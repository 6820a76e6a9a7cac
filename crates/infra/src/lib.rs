//! Platform adapters for Resonant: file decoding, audio output and analysis

pub mod audio;
