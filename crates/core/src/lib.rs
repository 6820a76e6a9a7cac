//! Resonant core: a streaming low-pass filter over a decoded audio source
//!
//! The filtered signal is produced block by block just ahead of playback and
//! recomputed only where parameter changes make it stale.

pub mod domain;
