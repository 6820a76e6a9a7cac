//! Magnitude spectrum and channel levels of the audible buffer around the
//! playhead
//!
//! Used by the terminal status line. Reads through an [`OutputReader`] so it
//! sees exactly what playback hears.

use num_complex::Complex;
use resonant_core::domain::audio::{OutputReader, StereoFrame};
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Display compression applied to normalized magnitudes
const DISPLAY_GAMMA: f32 = 0.6;

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frames: Vec<StereoFrame>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    /// Analyzer over `size` frames with a Hann window
    ///
    /// # Panics
    /// If `size` is smaller than 2.
    pub fn new(size: usize) -> Self {
        assert!(size >= 2, "FFT size must be at least 2");

        let fft = FftPlanner::new().plan_fft_forward(size);
        let window = (0..size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / (size - 1) as f32).cos())
            .collect();
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft,
            window,
            frames: vec![StereoFrame::SILENCE; size],
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch,
        }
    }

    pub fn size(&self) -> usize {
        self.window.len()
    }

    /// Magnitudes of bins `0..size/2` for the frames starting at `position`,
    /// channels averaged, normalized so a full-scale sine peaks near 1.0
    pub fn analyze(&mut self, reader: &OutputReader, position: usize) -> Vec<f32> {
        let size = self.size();
        reader.copy_looped(position, &mut self.frames);

        for ((slot, frame), w) in self.buffer.iter_mut().zip(&self.frames).zip(&self.window) {
            let mono = (frame.left as f32 + frame.right as f32) * 0.5 / 32768.0;
            *slot = Complex::new(mono * w, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Hann coherent gain is 0.5
        let norm = 4.0 / size as f32;
        self.buffer[..size / 2].iter().map(|c| c.norm() * norm).collect()
    }

    /// Collapse magnitudes into `count` log-spaced bands for display, each in
    /// [0, 1] after gamma compression
    pub fn bands(magnitudes: &[f32], count: usize) -> Vec<f32> {
        if magnitudes.len() < 2 || count == 0 {
            return vec![0.0; count];
        }

        let top = magnitudes.len() as f32;
        let mut bands = Vec::with_capacity(count);
        for band in 0..count {
            let lo = top.powf(band as f32 / count as f32) as usize;
            let hi = (top.powf((band + 1) as f32 / count as f32) as usize).max(lo + 1);
            let peak = magnitudes[lo.min(magnitudes.len() - 1)..hi.min(magnitudes.len())]
                .iter()
                .fold(0.0f32, |acc, &m| acc.max(m));
            bands.push(peak.clamp(0.0, 1.0).powf(DISPLAY_GAMMA));
        }
        bands
    }
}

/// Peak level per channel over `window` frames from `position`, in [0, 1]
pub fn peak_levels(reader: &OutputReader, position: usize, window: usize) -> (f32, f32) {
    if reader.is_empty() || window == 0 {
        return (0.0, 0.0);
    }

    let mut frames = vec![StereoFrame::SILENCE; window];
    reader.copy_looped(position, &mut frames);

    let (left, right) = frames.iter().fold((0u16, 0u16), |(l, r), frame| {
        (
            l.max(frame.left.unsigned_abs()),
            r.max(frame.right.unsigned_abs()),
        )
    });
    (f32::from(left) / 32768.0, f32::from(right) / 32768.0)
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size())
            .finish()
    }
}
