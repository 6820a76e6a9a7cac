//! Clocked playback without an audio device
//!
//! Position only moves when [`SimulatedPlayback::advance`] is called, which
//! makes offline rendering and integration tests deterministic. Played frames
//! can be captured exactly as a device would have heard them.

use resonant_core::domain::audio::{AudioError, OutputReader, PlaybackSink, Result, StereoFrame};
use tracing::debug;

#[derive(Debug, Default)]
pub struct SimulatedPlayback {
    buffer: Option<OutputReader>,
    sample_rate: u32,
    position: usize,
    playing: bool,
    looping: bool,
    finished: bool,
    capture: Option<Vec<StereoFrame>>,
}

impl SimulatedPlayback {
    /// Looping transport, like a device
    pub fn looping() -> Self {
        Self {
            looping: true,
            ..Self::default()
        }
    }

    /// Plays the buffer once, recording every frame it plays
    pub fn recording() -> Self {
        Self {
            capture: Some(Vec::new()),
            ..Self::default()
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// True once a non-looping transport has played past the last frame
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frames played so far (empty unless recording)
    pub fn captured(&self) -> &[StereoFrame] {
        self.capture.as_deref().unwrap_or_default()
    }

    pub fn take_captured(&mut self) -> Vec<StereoFrame> {
        self.capture.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Play up to `frames` frames. Returns how many were played.
    pub fn advance(&mut self, frames: usize) -> usize {
        let Some(reader) = self.buffer.as_ref() else {
            return 0;
        };
        if !self.playing || reader.is_empty() {
            return 0;
        }

        let len = reader.len();
        let played = if self.looping {
            frames
        } else {
            frames.min(len - self.position)
        };

        if let Some(capture) = self.capture.as_mut() {
            let start = capture.len();
            capture.resize(start + played, StereoFrame::SILENCE);
            reader.copy_looped(self.position, &mut capture[start..]);
        }

        let next = self.position + played;
        if next >= len && !self.looping {
            debug!(frames = len, "Simulated playback reached the end");
            self.playing = false;
            self.finished = true;
            self.position = 0;
        } else {
            self.position = next % len;
        }

        played
    }
}

impl PlaybackSink for SimulatedPlayback {
    fn current_position_sample(&self) -> usize {
        self.position
    }

    fn total_length_samples(&self) -> usize {
        self.buffer.as_ref().map_or(0, OutputReader::len)
    }

    fn set_buffer(&mut self, buffer: OutputReader, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        self.buffer = Some(buffer);
        self.sample_rate = sample_rate;
        self.position = 0;
        self.finished = false;
        Ok(())
    }

    fn seek(&mut self, sample: usize) {
        let len = self.total_length_samples();
        self.position = if len == 0 { 0 } else { sample.min(len - 1) };
        self.finished = false;
    }

    fn play(&mut self) -> Result<()> {
        if self.buffer.is_none() {
            return Err(AudioError::StreamError("No buffer attached".to_string()));
        }
        self.playing = true;
        self.finished = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.playing = false;
        self.position = 0;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonant_core::domain::audio::{OutputBuffer, Waveform};

    fn reader(len: usize) -> OutputReader {
        let frames = (0..len).map(|i| StereoFrame::mono(i as i16)).collect();
        OutputBuffer::from_waveform(&Waveform::new(frames, 8000).unwrap()).reader()
    }

    #[test]
    fn test_paused_does_not_move() {
        let mut playback = SimulatedPlayback::looping();
        playback.set_buffer(reader(10), 8000).unwrap();

        assert_eq!(playback.advance(4), 0);
        assert_eq!(playback.current_position_sample(), 0);
    }

    #[test]
    fn test_looping_wraps() {
        let mut playback = SimulatedPlayback::looping();
        playback.set_buffer(reader(10), 8000).unwrap();
        playback.play().unwrap();
        playback.seek(8);

        assert_eq!(playback.advance(5), 5);
        assert_eq!(playback.current_position_sample(), 3);
        assert!(playback.is_playing());
        assert!(!playback.is_finished());
    }

    #[test]
    fn test_recording_stops_at_end() {
        let mut playback = SimulatedPlayback::recording();
        playback.set_buffer(reader(10), 8000).unwrap();
        playback.play().unwrap();

        assert_eq!(playback.advance(4), 4);
        assert_eq!(playback.advance(4), 4);
        assert_eq!(playback.advance(4), 2);
        assert!(playback.is_finished());
        assert!(!playback.is_playing());
        assert_eq!(playback.advance(4), 0);

        let lefts: Vec<i16> = playback.take_captured().iter().map(|f| f.left).collect();
        assert_eq!(lefts, (0..10).collect::<Vec<i16>>());
        assert!(playback.captured().is_empty());
    }

    #[test]
    fn test_seek_clamps_to_last_frame() {
        let mut playback = SimulatedPlayback::looping();
        playback.set_buffer(reader(10), 8000).unwrap();
        playback.seek(50);
        assert_eq!(playback.current_position_sample(), 9);
    }

    #[test]
    fn test_play_without_buffer_fails() {
        let mut playback = SimulatedPlayback::default();
        assert!(playback.play().is_err());
        assert_eq!(playback.total_length_samples(), 0);
    }
}
