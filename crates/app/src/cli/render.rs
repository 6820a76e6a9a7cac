//! Offline rendering: drive the streaming controller over a whole file on a
//! simulated clock and write what playback heard

use anyhow::{bail, Context, Result};
use resonant_core::domain::audio::{PlaybackSink, SourceId};
use resonant_core::domain::config::ResonantConfig;
use resonant_core::domain::filter::{params, Adjustment};
use resonant_core::domain::streaming::{ControlEvent, StreamingController};
use resonant_infra::audio::{write_wav, SimulatedPlayback, WavLoader};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

pub struct RenderOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub cutoff: Option<f64>,
    pub q: Option<f64>,
    /// Ramp the cutoff linearly to this value over the file
    pub sweep_to: Option<f64>,
    /// Frames played per tick; defaults to one tick period at the source rate
    pub frames_per_tick: Option<usize>,
}

/// Printed as JSON when rendering finishes
#[derive(Debug, Clone, Serialize)]
pub struct RenderSummary {
    pub input: String,
    pub output: String,
    pub frames: usize,
    pub sample_rate: u32,
    pub duration_secs: f64,
    pub block_len: usize,
    pub frames_per_tick: usize,
    pub ticks: usize,
    pub blocks_filled: usize,
    pub start_cutoff_hz: f64,
    pub end_cutoff_hz: f64,
    pub q: f64,
    pub elapsed_ms: u128,
}

pub fn run(options: RenderOptions, config: &ResonantConfig) -> Result<RenderSummary> {
    let started = Instant::now();

    let mut settings = config.stream_settings();
    if let Some(cutoff) = options.cutoff {
        settings.default_cutoff_hz = cutoff;
    }
    if let Some(q) = options.q {
        settings.default_q = q;
    }

    let source_id = SourceId::new(options.input.display().to_string());
    let mut controller = StreamingController::open(
        source_id,
        WavLoader::new(),
        SimulatedPlayback::recording(),
        settings,
    )
    .with_context(|| format!("Failed to open {}", options.input.display()))?;

    let frames = controller.engine().len();
    let sample_rate = controller.engine().source().sample_rate();
    let frames_per_tick = options
        .frames_per_tick
        .unwrap_or((sample_rate as u64 * config.stream.tick_ms / 1000) as usize)
        .max(1);
    if frames_per_tick > settings.block_len {
        bail!(
            "frames per tick ({frames_per_tick}) must not exceed the block length ({})",
            settings.block_len
        );
    }

    let start_cutoff = controller.parameters().cutoff_hz();
    let sweep_to = options
        .sweep_to
        .map(|hz| hz.clamp(params::CUTOFF_MIN, params::CUTOFF_MAX));
    let total_ticks = frames.div_ceil(frames_per_tick);
    info!(
        input = %options.input.display(),
        frames,
        sample_rate,
        frames_per_tick,
        ?sweep_to,
        "Rendering"
    );

    controller.playback_mut().play()?;

    let mut ticks = 0;
    let mut blocks_filled = 0;
    while !controller.playback().is_finished() {
        let events = match sweep_to {
            Some(target) => sweep_events(
                start_cutoff,
                target,
                ticks,
                total_ticks,
                controller.parameters().cutoff_hz(),
                settings.steps.cutoff_hz,
            ),
            None => Vec::new(),
        };

        let report = controller.tick(events);
        blocks_filled += report.filled_blocks.len();
        controller.playback_mut().advance(frames_per_tick);
        ticks += 1;
    }

    if sweep_to.is_some() {
        let report = controller.tick([ControlEvent::AdjustReleased]);
        debug!(state = ?report.state, "Sweep committed");
    }

    let end_cutoff = controller.parameters().cutoff_hz();
    let q = controller.parameters().q();
    let audio = controller.playback_mut().take_captured();
    write_wav(&options.output, &audio, sample_rate)
        .with_context(|| format!("Failed to write {}", options.output.display()))?;

    let summary = RenderSummary {
        input: options.input.display().to_string(),
        output: options.output.display().to_string(),
        frames,
        sample_rate,
        duration_secs: frames as f64 / sample_rate as f64,
        block_len: settings.block_len,
        frames_per_tick,
        ticks,
        blocks_filled,
        start_cutoff_hz: start_cutoff,
        end_cutoff_hz: end_cutoff,
        q,
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(ticks, blocks_filled, elapsed_ms = summary.elapsed_ms, "Render finished");
    Ok(summary)
}

/// Adjust events that move `current` toward the linear ramp value for `tick`
fn sweep_events(
    start: f64,
    target: f64,
    tick: usize,
    total_ticks: usize,
    current: f64,
    step: f64,
) -> Vec<ControlEvent> {
    let progress = if total_ticks <= 1 {
        1.0
    } else {
        tick as f64 / (total_ticks - 1) as f64
    };
    let desired = start + (target - start) * progress.min(1.0);
    let steps = ((desired - current) / step).round();

    let adjustment = if steps < 0.0 {
        Adjustment::CutoffDown
    } else {
        Adjustment::CutoffUp
    };
    vec![ControlEvent::Adjust(adjustment); steps.abs() as usize]
}
