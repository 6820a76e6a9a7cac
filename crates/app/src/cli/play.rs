//! Interactive playback session

use crate::keyboard::{KeyInput, KeyboardSurface};
use anyhow::{bail, Context, Result};
use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{queue, QueueableCommand};
use resonant_core::domain::audio::{PlaybackSink, SourceId};
use resonant_core::domain::config::ResonantConfig;
use resonant_core::domain::streaming::{
    control_channel, ControlEvent, StreamingController, TickReport,
};
use resonant_infra::audio::{peak_levels, CpalPlayback, SpectrumAnalyzer, WavLoader};
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

const SPECTRUM_SIZE: usize = 2048;
const SPECTRUM_BANDS: usize = 48;
const BLOCK_MAP_WIDTH: usize = 64;
const LEVEL_WINDOW: usize = 1024;
const METER_WIDTH: usize = 30;
const BARS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub struct PlayOptions {
    pub files: Vec<PathBuf>,
    pub cutoff: Option<f64>,
    pub q: Option<f64>,
}

pub fn run(options: PlayOptions, config: ResonantConfig) -> Result<()> {
    if options.files.is_empty() {
        bail!("No input files given");
    }
    let sources: Vec<SourceId> = options
        .files
        .iter()
        .map(|p| SourceId::new(p.display().to_string()))
        .collect();

    let mut settings = config.stream_settings();
    if let Some(cutoff) = options.cutoff {
        settings.default_cutoff_hz = cutoff;
    }
    if let Some(q) = options.q {
        settings.default_q = q;
    }

    let playback = CpalPlayback::new(&config.audio).context("Failed to open audio output")?;
    let mut controller =
        StreamingController::open(sources[0].clone(), WavLoader::new(), playback, settings)
            .with_context(|| format!("Failed to open {}", sources[0]))?;
    controller
        .playback_mut()
        .play()
        .context("Failed to start playback")?;

    let (sender, queue) = control_channel();
    let mut surface = KeyboardSurface::new(sender)?;
    let mut analyzer = SpectrumAnalyzer::new(SPECTRUM_SIZE);
    let tick = config.tick_interval();
    let mut next_source = 1;
    let mut message = String::new();

    info!(source = %sources[0], tick_ms = config.stream.tick_ms, "Session started");

    loop {
        let deadline = Instant::now() + tick;
        let mut quit = false;

        for input in surface.pump(deadline)? {
            match input {
                KeyInput::Quit => quit = true,
                KeyInput::ReloadNext => {
                    let source = sources[next_source % sources.len()].clone();
                    next_source += 1;
                    surface.sender().send(ControlEvent::Reload(source));
                }
                _ => {}
            }
        }
        if quit {
            break;
        }

        let previous = controller.source_id().clone();
        let report = controller.tick(queue.drain());
        if let Some(error) = &report.reload_error {
            message = format!("reload failed: {error}");
        } else if *controller.source_id() != previous {
            message = format!("loaded {}", controller.source_id());
        }

        draw_status(&controller, &report, &mut analyzer, &message)?;
    }

    controller.playback_mut().stop()?;
    info!("Session ended");
    Ok(())
}

fn draw_status(
    controller: &StreamingController<CpalPlayback, WavLoader>,
    report: &TickReport,
    analyzer: &mut SpectrumAnalyzer,
    message: &str,
) -> Result<()> {
    let engine = controller.engine();
    let source = engine.source();
    let rate = source.sample_rate() as f64;
    let params = &report.parameters;

    let cache = engine.cache();
    let count = cache.block_count();
    let cells = count.min(BLOCK_MAP_WIDTH);
    let blocks: String = (0..cells)
        .map(|cell| {
            let lo = cell * count / cells;
            let hi = ((cell + 1) * count / cells).max(lo + 1);
            if (lo..hi).any(|b| cache.is_valid(b)) {
                '#'
            } else {
                '.'
            }
        })
        .collect();

    let magnitudes = analyzer.analyze(&engine.reader(), report.position);
    let bars: String = SpectrumAnalyzer::bands(&magnitudes, SPECTRUM_BANDS)
        .iter()
        .map(|&level| BARS[((level * 8.0).round() as usize).min(8)])
        .collect();

    let (left, right) = peak_levels(&engine.reader(), report.position, LEVEL_WINDOW);

    let mut out = stdout();
    queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;
    let lines = [
        format!("resonant  {}", controller.source_id()),
        format!(
            "{}  {:7.2}s / {:7.2}s",
            if report.playing { "playing" } else { "paused " },
            report.position as f64 / rate,
            source.duration_secs()
        ),
        format!(
            "cutoff {:7.1} Hz   Q {:5.2}   {:?}",
            params.cutoff_hz(),
            params.q(),
            report.state
        ),
        format!("blocks [{blocks}]  look-ahead {}", report.lookahead_block),
        format!("[{bars}]"),
        format!("L [{}]  R [{}]", meter(left), meter(right)),
        "←/→ cutoff  ↓/↑ Q  space play/pause  0-9 seek  o next file  q quit".to_string(),
        message.to_string(),
    ];
    for (row, line) in lines.iter().enumerate() {
        out.queue(MoveTo(0, row as u16))?.queue(Print(line))?;
    }
    out.flush()?;
    Ok(())
}

/// Horizontal bar for a level in [0, 1]
fn meter(level: f32) -> String {
    let lit = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
    format!("{}{}", "#".repeat(lit), " ".repeat(METER_WIDTH - lit))
}
