//! Audio sources, the audible output buffer, and collaborator interfaces
//!
//! This module defines the platform-agnostic audio types the streaming engine
//! works on. Implementations of the collaborator traits (file decoding, device
//! playback) live in the `infra` crate.

use crossbeam::utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur at the audio collaborator boundary
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested source could not be located
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Source exists but could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Source decoded to zero frames
    #[error("Source contains no samples")]
    EmptySource,

    /// Source declares an unusable sample rate
    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for audio device
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// One stereo sample pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StereoFrame {
    pub left: i16,
    pub right: i16,
}

impl StereoFrame {
    pub const SILENCE: StereoFrame = StereoFrame { left: 0, right: 0 };

    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Same sample on both channels
    pub fn mono(sample: i16) -> Self {
        Self::new(sample, sample)
    }

    #[inline]
    fn pack(self) -> u32 {
        (self.left as u16 as u32) | ((self.right as u16 as u32) << 16)
    }

    #[inline]
    fn unpack(word: u32) -> Self {
        Self {
            left: word as u16 as i16,
            right: (word >> 16) as u16 as i16,
        }
    }
}

/// Identifier handed to a [`SourceLoader`] (usually a file path)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable decoded stereo source
///
/// This is the filter's only input: every filtering pass reads these frames,
/// never the previously filtered output. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Waveform {
    frames: Arc<[StereoFrame]>,
    sample_rate: u32,
}

impl Waveform {
    /// Wrap decoded frames. Rejects empty sources and a zero sample rate.
    pub fn new(frames: Vec<StereoFrame>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        if frames.is_empty() {
            return Err(AudioError::EmptySource);
        }

        Ok(Self {
            frames: frames.into(),
            sample_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false for a constructed waveform
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> &[StereoFrame] {
        &self.frames
    }

    #[inline]
    pub fn frame(&self, index: usize) -> StereoFrame {
        self.frames[index]
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }
}

struct SharedFrames {
    frames: Box<[AtomicU32]>,
    /// Bumped with release ordering after every published block
    generation: CachePadded<AtomicU64>,
}

/// Writer side of the audible buffer
///
/// There is exactly one writer (the streaming engine); it is deliberately not
/// `Clone`. Playback reads through [`OutputReader`] handles, possibly from an
/// audio callback thread. Frame stores are relaxed; [`OutputBuffer::publish`]
/// makes everything written so far visible to readers that observe the new
/// generation.
pub struct OutputBuffer {
    shared: Arc<SharedFrames>,
}

impl OutputBuffer {
    /// Start with an unfiltered copy of the source
    pub fn from_waveform(source: &Waveform) -> Self {
        let frames = source
            .frames()
            .iter()
            .map(|frame| AtomicU32::new(frame.pack()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shared: Arc::new(SharedFrames {
                frames,
                generation: CachePadded::new(AtomicU64::new(0)),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.frames.is_empty()
    }

    #[inline]
    pub fn write(&mut self, index: usize, frame: StereoFrame) {
        self.shared.frames[index].store(frame.pack(), Ordering::Relaxed);
    }

    #[inline]
    pub fn read(&self, index: usize) -> StereoFrame {
        StereoFrame::unpack(self.shared.frames[index].load(Ordering::Relaxed))
    }

    /// Make all prior writes visible to readers. Returns the new generation.
    pub fn publish(&mut self) -> u64 {
        self.shared.generation.fetch_add(1, Ordering::Release) + 1
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Relaxed)
    }

    /// Read-only handle for playback and visualization
    pub fn reader(&self) -> OutputReader {
        OutputReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Snapshot of the whole buffer
    pub fn to_frames(&self) -> Vec<StereoFrame> {
        (0..self.len()).map(|i| self.read(i)).collect()
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Read-only, cloneable view of an [`OutputBuffer`]
#[derive(Clone)]
pub struct OutputReader {
    shared: Arc<SharedFrames>,
}

impl OutputReader {
    pub fn len(&self) -> usize {
        self.shared.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.frames.is_empty()
    }

    /// Latest published generation (acquire)
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn frame(&self, index: usize) -> StereoFrame {
        let _ = self.shared.generation.load(Ordering::Acquire);
        StereoFrame::unpack(self.shared.frames[index].load(Ordering::Relaxed))
    }

    /// Copy `out.len()` frames starting at `start`, wrapping at the end.
    pub fn copy_looped(&self, start: usize, out: &mut [StereoFrame]) {
        let len = self.len();
        if len == 0 {
            out.fill(StereoFrame::SILENCE);
            return;
        }

        let _ = self.shared.generation.load(Ordering::Acquire);
        let mut index = start % len;
        for slot in out.iter_mut() {
            *slot = StereoFrame::unpack(self.shared.frames[index].load(Ordering::Relaxed));
            index += 1;
            if index == len {
                index = 0;
            }
        }
    }
}

impl fmt::Debug for OutputReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputReader")
            .field("len", &self.len())
            .finish()
    }
}

/// Produces decoded sources on request
pub trait SourceLoader {
    /// Load and decode a source. The engine never interprets the error beyond
    /// keeping its current source.
    fn load(&self, source: &SourceId) -> Result<Waveform>;
}

/// Transport that plays the audible buffer
///
/// The streaming controller reads position and length every tick and writes
/// into the buffer; it does not own transport state.
pub trait PlaybackSink {
    /// Frame index currently being played
    fn current_position_sample(&self) -> usize;

    /// Length of the attached buffer in frames
    fn total_length_samples(&self) -> usize;

    /// Attach a new buffer (after a source reload)
    fn set_buffer(&mut self, buffer: OutputReader, sample_rate: u32) -> Result<()>;

    fn seek(&mut self, sample: usize);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn is_playing(&self) -> bool;
}
