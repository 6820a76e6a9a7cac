//! Demand-driven streaming of the filtered signal
//!
//! [`StreamEngine`] owns the source, the audible buffer, the block cache, the
//! current coefficients and the continuity registers. [`StreamingController`]
//! drives it once per control tick: it applies queued control events, keeps
//! the block one look-ahead ahead of playback filtered, and implements the
//! adjust → release → invalidate protocol, seeking and source reloads.
//!
//! Everything here runs on the control thread. The only cross-thread surface
//! is the output buffer, which is published after every block fill and before
//! any position is committed to playback.

use crate::domain::audio::{
    OutputBuffer, OutputReader, PlaybackSink, Result, SourceId, SourceLoader, Waveform,
};
use crate::domain::cache::{BlockCache, DEFAULT_BLOCK_LEN};
use crate::domain::filter::{
    apply_range, params, Adjustment, AdjustmentSteps, ContinuityState, FilterCoefficients,
    FilterParameters,
};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::ops::Range;
use tracing::{debug, info, trace, warn};

/// Tuning knobs for a streaming session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    /// Frames per cache block
    pub block_len: usize,
    /// Parameters applied on open and on every reload
    pub default_cutoff_hz: f64,
    pub default_q: f64,
    pub steps: AdjustmentSteps,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            block_len: DEFAULT_BLOCK_LEN,
            default_cutoff_hz: params::DEFAULT_CUTOFF,
            default_q: params::DEFAULT_Q,
            steps: AdjustmentSteps::default(),
        }
    }
}

impl StreamSettings {
    pub fn default_parameters(&self, sample_rate: u32) -> FilterParameters {
        FilterParameters::new(self.default_cutoff_hz, self.default_q, sample_rate)
    }
}

// ============================================================================
// CONTROL QUEUE
// ============================================================================

/// Input from the control surface, consumed once per tick
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Held step command; sent every tick while the control is held
    Adjust(Adjustment),
    /// All adjustment controls released
    AdjustReleased,
    /// Jump to a normalized position in [0, 1]
    Seek(f64),
    /// Replace the current source
    Reload(SourceId),
    TogglePlayback,
    Stop,
}

pub const CONTROL_QUEUE_CAPACITY: usize = 256;

/// Create a connected sender/queue pair
pub fn control_channel() -> (ControlSender, ControlQueue) {
    let (tx, rx) = bounded(CONTROL_QUEUE_CAPACITY);
    (ControlSender { tx }, ControlQueue { rx })
}

/// Producer side, cloneable for several input sources
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: Sender<ControlEvent>,
}

impl ControlSender {
    /// Queue an event without blocking. Returns false if it was dropped.
    pub fn send(&self, event: ControlEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Control queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer side, drained by the control loop
#[derive(Debug)]
pub struct ControlQueue {
    rx: Receiver<ControlEvent>,
}

impl ControlQueue {
    /// Everything queued since the last drain, in order
    pub fn drain(&self) -> impl Iterator<Item = ControlEvent> + '_ {
        self.rx.try_iter()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// The filtering state shared across ticks
pub struct StreamEngine {
    source: Waveform,
    output: OutputBuffer,
    cache: BlockCache,
    coeffs: FilterCoefficients,
    continuity: ContinuityState,
    /// Frame following the last filled range. A fill that starts anywhere
    /// else starts from zeroed continuity.
    resume_at: Option<usize>,
}

impl StreamEngine {
    /// Fresh engine: output is an unfiltered copy, every block invalid
    pub fn new(source: Waveform, block_len: usize, coeffs: FilterCoefficients) -> Self {
        Self {
            output: OutputBuffer::from_waveform(&source),
            cache: BlockCache::new(source.len(), block_len),
            source,
            coeffs,
            continuity: ContinuityState::new(),
            resume_at: None,
        }
    }

    pub fn source(&self) -> &Waveform {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn reader(&self) -> OutputReader {
        self.output.reader()
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.coeffs
    }

    pub fn continuity(&self) -> &ContinuityState {
        &self.continuity
    }

    pub fn set_coefficients(&mut self, coeffs: FilterCoefficients) {
        self.coeffs = coeffs;
    }

    pub fn reset_continuity(&mut self) {
        self.continuity.reset();
        self.resume_at = None;
    }

    /// Block one block-length ahead of `position`, wrapping at the end
    pub fn lookahead_block(&self, position: usize) -> usize {
        let len = self.source.len();
        let target = (position % len + self.cache.block_len()) % len;
        self.cache.index_of(target)
    }

    /// Filter a whole block with the current coefficients, mark it valid and
    /// publish it to readers.
    pub fn fill_block(&mut self, block: usize) -> Range<usize> {
        let range = self.cache.block_range(block);

        if self.resume_at != Some(range.start) {
            if !self.continuity.is_zero() {
                trace!(block, "Out-of-sequence fill, continuity reset");
            }
            self.continuity.reset();
        }

        let filled = apply_range(
            &self.source,
            &mut self.output,
            &self.coeffs,
            &mut self.continuity,
            range.start,
            range.len(),
        );
        self.resume_at = Some(filled.end);
        self.cache.mark_valid(block);
        let generation = self.output.publish();

        debug!(block, start = filled.start, end = filled.end, generation, "Block filled");
        filled
    }

    /// Fill `block` if it is stale. Returns whether a fill happened.
    pub fn ensure_block(&mut self, block: usize) -> bool {
        if self.cache.is_valid(block) {
            return false;
        }
        self.fill_block(block);
        true
    }

    /// Make every block after the playhead's own, up to and including the
    /// look-ahead block, valid. Returns the blocks filled, in fill order.
    ///
    /// A short last block can lie entirely between the playhead and the
    /// look-ahead target, so it is filled on the way rather than waiting for
    /// a tick whose look-ahead lands inside it.
    pub fn ensure_ahead(&mut self, position: usize) -> Vec<usize> {
        let count = self.cache.block_count();
        let current = self.cache.index_of(position % self.source.len());
        let target = self.lookahead_block(position);

        let mut filled = Vec::new();
        let mut block = current;
        for _ in 0..count {
            block = (block + 1) % count;
            if self.ensure_block(block) {
                filled.push(block);
            }
            if block == target {
                break;
            }
        }
        filled
    }

    /// Drop every cached block; continuity restarts from silence
    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
        self.reset_continuity();
        debug!(blocks = self.cache.block_count(), "All blocks invalidated");
    }

    pub fn invalidate_all_except(&mut self, block: usize) {
        self.cache.invalidate_all_except(block);
        debug!(kept = block, "Blocks invalidated");
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Whether the listener is currently holding an adjustment control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Stable,
    Adjusting,
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    /// Playback position after the tick
    pub position: usize,
    /// Look-ahead block computed from the position at the start of the tick
    pub lookahead_block: usize,
    /// Blocks filled this tick, in fill order
    pub filled_blocks: Vec<usize>,
    pub state: ControllerState,
    pub parameters: FilterParameters,
    pub playing: bool,
    /// Set when a reload was requested and failed
    pub reload_error: Option<String>,
}

/// Drives a [`StreamEngine`] from playback position and control events
pub struct StreamingController<P, L> {
    engine: StreamEngine,
    params: FilterParameters,
    state: ControllerState,
    settings: StreamSettings,
    source_id: SourceId,
    playback: P,
    loader: L,
}

impl<P: PlaybackSink, L: SourceLoader> StreamingController<P, L> {
    /// Load the first source, filter block 0 and attach it to playback.
    ///
    /// Playback is positioned at 0 but not started.
    pub fn open(
        source_id: SourceId,
        loader: L,
        mut playback: P,
        settings: StreamSettings,
    ) -> Result<Self> {
        let source = loader.load(&source_id)?;
        info!(
            source = %source_id,
            frames = source.len(),
            sample_rate = source.sample_rate(),
            "Source loaded"
        );

        let params = settings.default_parameters(source.sample_rate());
        let mut engine = StreamEngine::new(source, settings.block_len, params.coefficients());
        engine.fill_block(0);

        playback.set_buffer(engine.reader(), engine.source().sample_rate())?;
        playback.seek(0);

        Ok(Self {
            engine,
            params,
            state: ControllerState::Stable,
            settings,
            source_id,
            playback,
            loader,
        })
    }

    pub fn engine(&self) -> &StreamEngine {
        &self.engine
    }

    pub fn parameters(&self) -> &FilterParameters {
        &self.params
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut P {
        &mut self.playback
    }

    /// Run one control tick
    pub fn tick<I>(&mut self, events: I) -> TickReport
    where
        I: IntoIterator<Item = ControlEvent>,
    {
        let mut adjusted = false;
        let mut released = false;
        let mut toggle = false;
        let mut stop = false;
        let mut seek = None;
        let mut reload = None;

        for event in events {
            match event {
                ControlEvent::Adjust(adjustment) => {
                    self.params.nudge(adjustment, &self.settings.steps);
                    adjusted = true;
                }
                ControlEvent::AdjustReleased => released = true,
                ControlEvent::Seek(fraction) => seek = Some(fraction),
                ControlEvent::Reload(source_id) => reload = Some(source_id),
                ControlEvent::TogglePlayback => toggle = !toggle,
                ControlEvent::Stop => stop = true,
            }
        }

        if stop {
            if let Err(e) = self.playback.stop() {
                warn!(error = %e, "Failed to stop playback");
            }
        } else if toggle {
            self.toggle_playback();
        }

        let position = self.playback.current_position_sample();
        let lookahead = self.engine.lookahead_block(position);
        let mut filled = Vec::new();

        // While held: live coefficients, cached blocks untouched
        if adjusted {
            if self.state == ControllerState::Stable {
                debug!("Parameter adjustment started");
            }
            self.state = ControllerState::Adjusting;
            self.engine.set_coefficients(self.params.coefficients());
        }

        // On release: only the look-ahead block survives, refiltered now
        if released && self.state == ControllerState::Adjusting {
            self.state = ControllerState::Stable;
            self.engine.set_coefficients(self.params.coefficients());
            self.engine.invalidate_all_except(lookahead);
            self.engine.fill_block(lookahead);
            filled.push(lookahead);
            info!(
                cutoff_hz = self.params.cutoff_hz(),
                q = self.params.q(),
                "Filter parameters committed"
            );
        }

        filled.extend(self.engine.ensure_ahead(position));

        if let Some(fraction) = seek {
            filled.push(self.seek_normalized(fraction));
        }

        let mut reload_error = None;
        if let Some(source_id) = reload {
            match self.reload(source_id) {
                Ok(()) => filled.push(0),
                Err(e) => reload_error = Some(e.to_string()),
            }
        }

        TickReport {
            position: self.playback.current_position_sample(),
            lookahead_block: lookahead,
            filled_blocks: filled,
            state: self.state,
            parameters: self.params,
            playing: self.playback.is_playing(),
            reload_error,
        }
    }

    /// Jump to a normalized position; returns the block filled for it
    pub fn seek_normalized(&mut self, fraction: f64) -> usize {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let target = (self.engine.len() as f64 * fraction) as usize;
        self.seek_to(target)
    }

    /// Jump to a frame: invalidate everything, fill the block containing it,
    /// then move playback. Returns the filled block.
    pub fn seek_to(&mut self, sample: usize) -> usize {
        let target = sample.min(self.engine.len() - 1);

        self.engine.invalidate_all();
        self.engine.set_coefficients(self.params.coefficients());
        let block = self.engine.cache().index_of(target);
        self.engine.fill_block(block);

        self.playback.seek(target);
        info!(position = target, block, "Seek");
        block
    }

    /// Swap in a new source and restart playback from 0 with default
    /// parameters. On failure the current source keeps playing untouched.
    pub fn reload(&mut self, source_id: SourceId) -> Result<()> {
        let source = match self.loader.load(&source_id) {
            Ok(source) => source,
            Err(e) => {
                warn!(source = %source_id, error = %e, "Reload failed, keeping current source");
                return Err(e);
            }
        };

        let sample_rate = source.sample_rate();
        let params = self.settings.default_parameters(sample_rate);
        let mut engine = StreamEngine::new(source, self.settings.block_len, params.coefficients());
        engine.fill_block(0);

        // Transport is only touched once the new buffer is attached
        if let Err(e) = self.playback.set_buffer(engine.reader(), sample_rate) {
            warn!(
                source = %source_id,
                error = %e,
                "Playback rejected new source, keeping current source"
            );
            return Err(e);
        }

        self.engine = engine;
        self.params = params;
        self.state = ControllerState::Stable;
        self.source_id = source_id;

        self.playback.seek(0);
        if let Err(e) = self.playback.play() {
            warn!(error = %e, "Failed to start playback after reload");
        }

        info!(
            source = %self.source_id,
            frames = self.engine.len(),
            sample_rate,
            "Source reloaded"
        );
        Ok(())
    }

    fn toggle_playback(&mut self) {
        let result = if self.playback.is_playing() {
            self.playback.pause()
        } else {
            self.playback.play()
        };

        if let Err(e) = result {
            warn!(error = %e, "Failed to toggle playback");
        }
    }
}
