//! Second-order low-pass filtering of stereo sources
//!
//! This module provides:
//! - Clamped filter parameters (cutoff, resonance) and per-tick adjustments
//! - RBJ cookbook low-pass coefficient derivation
//! - The continuity registers carried between filtering calls
//! - [`apply_range`], the sample-accurate recursive filter over a frame range
//!
//! Feed-forward taps always read the original source, never filtered output,
//! so a region can be re-filtered any number of times with different
//! coefficients and still produce the same result for the same inputs.

use crate::domain::audio::{OutputBuffer, StereoFrame, Waveform};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::trace;

/// Parameter constraints for the low-pass filter
///
/// All parameters are clamped to these ranges so the coefficient math is
/// always finite (Q > 0, sample rate > 0).
pub mod params {
    /// Cutoff frequency range (Hz)
    pub const CUTOFF_MIN: f64 = 40.0;
    pub const CUTOFF_MAX: f64 = 5000.0;

    /// Resonance range
    pub const Q_MIN: f64 = 0.10;
    pub const Q_MAX: f64 = 10.00;

    pub const DEFAULT_CUTOFF: f64 = 1500.0;
    pub const DEFAULT_Q: f64 = 1.0;

    /// Per-tick increments while an adjustment is held
    pub const CUTOFF_STEP: f64 = 8.0;
    pub const Q_STEP: f64 = 0.02;
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// One discrete step command from the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Adjustment {
    CutoffDown,
    CutoffUp,
    QDown,
    QUp,
}

/// Step sizes applied per tick for each held [`Adjustment`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentSteps {
    pub cutoff_hz: f64,
    pub q: f64,
}

impl Default for AdjustmentSteps {
    fn default() -> Self {
        Self {
            cutoff_hz: params::CUTOFF_STEP,
            q: params::Q_STEP,
        }
    }
}

/// Live filter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParameters {
    cutoff_hz: f64,
    q: f64,
    sample_rate: u32,
}

impl FilterParameters {
    /// Create parameters, clamping cutoff and Q into their ranges
    pub fn new(cutoff_hz: f64, q: f64, sample_rate: u32) -> Self {
        debug_assert!(sample_rate > 0, "sample rate must be positive");
        Self {
            cutoff_hz: cutoff_hz.clamp(params::CUTOFF_MIN, params::CUTOFF_MAX),
            q: q.clamp(params::Q_MIN, params::Q_MAX),
            sample_rate,
        }
    }

    /// 1500 Hz, Q = 1.0
    pub fn with_defaults(sample_rate: u32) -> Self {
        Self::new(params::DEFAULT_CUTOFF, params::DEFAULT_Q, sample_rate)
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f64) {
        self.cutoff_hz = cutoff_hz.clamp(params::CUTOFF_MIN, params::CUTOFF_MAX);
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = q.clamp(params::Q_MIN, params::Q_MAX);
    }

    /// Apply one held step, clamped to the parameter domain
    pub fn nudge(&mut self, adjustment: Adjustment, steps: &AdjustmentSteps) {
        match adjustment {
            Adjustment::CutoffDown => self.set_cutoff(self.cutoff_hz - steps.cutoff_hz),
            Adjustment::CutoffUp => self.set_cutoff(self.cutoff_hz + steps.cutoff_hz),
            Adjustment::QDown => self.set_q(self.q - steps.q),
            Adjustment::QUp => self.set_q(self.q + steps.q),
        }
    }

    /// Derive the normalized coefficients for these parameters
    #[must_use]
    pub fn coefficients(&self) -> FilterCoefficients {
        FilterCoefficients::low_pass(self.cutoff_hz, self.q, self.sample_rate)
    }
}

// ============================================================================
// COEFFICIENTS
// ============================================================================

/// Normalized low-pass biquad coefficients
///
/// `k0..k2` weigh the current and two previous source samples, `k3`/`k4` the
/// two previous filtered outputs. All five are always derived together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterCoefficients {
    pub k0: f64,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
}

impl FilterCoefficients {
    /// Calculate coefficients for a low-pass biquad
    ///
    /// # Parameters
    /// - `cutoff_hz`: Corner frequency in Hz
    /// - `q`: Resonance, must be positive
    /// - `sample_rate`: Audio sample rate in Hz, must be positive
    #[must_use]
    pub fn low_pass(cutoff_hz: f64, q: f64, sample_rate: u32) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        let coeffs = Self {
            k0: b0 / a0,
            k1: b1 / a0,
            k2: b2 / a0,
            k3: -(a1 / a0),
            k4: -(a2 / a0),
        };

        trace!(cutoff_hz, q, sample_rate, ?coeffs, "Low-pass coefficients computed");
        coeffs
    }

    /// Steady-state gain for a constant input (1.0 for a low-pass)
    pub fn dc_gain(&self) -> f64 {
        (self.k0 + self.k1 + self.k2) / (1.0 - self.k3 - self.k4)
    }
}

// ============================================================================
// CONTINUITY
// ============================================================================

/// The recursive filter's memory: the last two filtered outputs per channel
///
/// Not part of the output buffer. It must be carried from one filtering call
/// to the next covering the following range, or the output clicks at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContinuityState {
    pub yl1: f64,
    pub yl2: f64,
    pub yr1: f64,
    pub yr2: f64,
}

impl ContinuityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    #[inline]
    fn push(&mut self, frame: StereoFrame) {
        self.yl2 = self.yl1;
        self.yl1 = f64::from(frame.left);
        self.yr2 = self.yr1;
        self.yr1 = f64::from(frame.right);
    }
}

// ============================================================================
// FILTERING
// ============================================================================

/// One output sample: truncated toward zero, then saturated to 16 bits
#[inline]
fn filter_sample(
    coeffs: &FilterCoefficients,
    x: i16,
    w1: i16,
    w2: i16,
    y1: f64,
    y2: f64,
) -> i16 {
    let y = coeffs.k0 * f64::from(x)
        + coeffs.k1 * f64::from(w1)
        + coeffs.k2 * f64::from(w2)
        + coeffs.k3 * y1
        + coeffs.k4 * y2;

    y.trunc().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Filter `source[start..start + length]` into `dest`
///
/// Processes frames up to the end of the source and returns the range that
/// was written. `continuity` enters as the filter state preceding `start` and
/// leaves as the state after the last written frame. History before frame 0
/// is silence.
pub fn apply_range(
    source: &Waveform,
    dest: &mut OutputBuffer,
    coeffs: &FilterCoefficients,
    continuity: &mut ContinuityState,
    start: usize,
    length: usize,
) -> Range<usize> {
    debug_assert_eq!(source.len(), dest.len(), "output must align with source");

    let frames = source.frames();
    let end = start.saturating_add(length).min(frames.len());
    if start >= end {
        return start..start;
    }

    for i in start..end {
        let x = frames[i];
        let w1 = if i >= 1 { frames[i - 1] } else { StereoFrame::SILENCE };
        let w2 = if i >= 2 { frames[i - 2] } else { StereoFrame::SILENCE };

        // Both channels advance in lock-step
        let y = StereoFrame {
            left: filter_sample(
                coeffs,
                x.left,
                w1.left,
                w2.left,
                continuity.yl1,
                continuity.yl2,
            ),
            right: filter_sample(
                coeffs,
                x.right,
                w1.right,
                w2.right,
                continuity.yr1,
                continuity.yr2,
            ),
        };

        dest.write(i, y);
        continuity.push(y);
    }

    start..end
}
