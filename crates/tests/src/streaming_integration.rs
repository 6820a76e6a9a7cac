//! Integration tests for the streaming pipeline
//!
//! These tests drive the controller with real WAV files on disk and the
//! simulated transport, checking what playback actually hears.

use resonant_core::domain::audio::{OutputBuffer, PlaybackSink, SourceId, StereoFrame, Waveform};
use resonant_core::domain::config::{ConfigManager, ResonantConfig};
use resonant_core::domain::filter::{
    apply_range, Adjustment, ContinuityState, FilterCoefficients, FilterParameters,
};
use resonant_core::domain::streaming::{
    control_channel, ControlEvent, ControllerState, StreamSettings, StreamingController,
};
use resonant_infra::audio::{write_wav, SimulatedPlayback, WavLoader};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SAMPLE_RATE: u32 = 44100;

fn generate_sine_frames(frequency: f32, len: usize) -> Vec<StereoFrame> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32;
            let s = (phase.sin() * 20000.0) as i16;
            StereoFrame::new(s, s / 2)
        })
        .collect()
}

fn write_source(dir: &TempDir, name: &str, frames: &[StereoFrame]) -> PathBuf {
    let path = dir.path().join(name);
    write_wav(&path, frames, SAMPLE_RATE).unwrap();
    path
}

fn source_id(path: &Path) -> SourceId {
    SourceId::new(path.display().to_string())
}

fn filtered(
    source: &Waveform,
    coeffs: &FilterCoefficients,
    start: usize,
    len: usize,
) -> Vec<StereoFrame> {
    let mut out = OutputBuffer::from_waveform(source);
    apply_range(source, &mut out, coeffs, &mut ContinuityState::new(), start, len);
    out.to_frames()[start..(start + len).min(source.len())].to_vec()
}

fn open(
    path: &Path,
    playback: SimulatedPlayback,
) -> StreamingController<SimulatedPlayback, WavLoader> {
    StreamingController::open(
        source_id(path),
        WavLoader::new(),
        playback,
        StreamSettings::default(),
    )
    .unwrap()
}

// ============================================================================
// PLAYBACK
// ============================================================================

#[test]
fn test_steady_playback_hears_single_pass() {
    let dir = TempDir::new().unwrap();
    let frames = generate_sine_frames(3000.0, 23_000);
    let path = write_source(&dir, "sine.wav", &frames);

    let mut ctl = open(&path, SimulatedPlayback::recording());
    ctl.playback_mut().play().unwrap();
    while !ctl.playback().is_finished() {
        ctl.tick([]);
        ctl.playback_mut().advance(735);
    }

    let source = ctl.engine().source().clone();
    let expected = filtered(&source, ctl.engine().coefficients(), 0, source.len());
    assert_eq!(ctl.playback().captured(), expected.as_slice());
}

#[test]
fn test_looping_playback_wraps() {
    let dir = TempDir::new().unwrap();
    let path = write_source(&dir, "short.wav", &generate_sine_frames(440.0, 12_000));

    let mut ctl = open(&path, SimulatedPlayback::looping());
    ctl.playback_mut().play().unwrap();
    for _ in 0..40 {
        let report = ctl.tick([]);
        assert!(report.position < 12_000);
        ctl.playback_mut().advance(700);
    }

    assert!(ctl.playback().is_playing());
    assert_eq!(ctl.engine().cache().valid_count(), 3);
}

#[test]
fn test_filter_attenuates_above_cutoff() {
    let dir = TempDir::new().unwrap();
    let path = write_source(&dir, "high.wav", &generate_sine_frames(4000.0, 10_000));

    let mut settings = StreamSettings::default();
    settings.default_cutoff_hz = 100.0;
    let mut ctl = StreamingController::open(
        source_id(&path),
        WavLoader::new(),
        SimulatedPlayback::recording(),
        settings,
    )
    .unwrap();
    ctl.playback_mut().play().unwrap();
    while !ctl.playback().is_finished() {
        ctl.tick([]);
        ctl.playback_mut().advance(500);
    }

    let peak = |frames: &[StereoFrame]| frames.iter().map(|f| f.left.unsigned_abs()).max().unwrap();
    let peak_in = peak(ctl.engine().source().frames());
    let peak_out = peak(&ctl.playback().captured()[2000..]);
    assert!(peak_out < peak_in / 100, "peak {peak_out} vs {peak_in}");
}

// ============================================================================
// ADJUST / RELEASE
// ============================================================================

#[test]
fn test_release_refilters_lookahead_with_new_parameters() {
    let dir = TempDir::new().unwrap();
    let path = write_source(&dir, "sine.wav", &generate_sine_frames(1200.0, 20_000));

    let mut ctl = open(&path, SimulatedPlayback::looping());
    let (sender, queue) = control_channel();
    ctl.playback_mut().play().unwrap();

    for _ in 0..5 {
        ctl.tick(queue.drain());
        ctl.playback_mut().advance(700);
    }
    for _ in 0..20 {
        sender.send(ControlEvent::Adjust(Adjustment::CutoffDown));
        sender.send(ControlEvent::Adjust(Adjustment::QUp));
        let report = ctl.tick(queue.drain());
        assert_eq!(report.state, ControllerState::Adjusting);
        ctl.playback_mut().advance(700);
    }

    sender.send(ControlEvent::AdjustReleased);
    let report = ctl.tick(queue.drain());
    assert_eq!(report.state, ControllerState::Stable);
    assert_eq!(ctl.engine().cache().valid_count(), 1);

    let params = FilterParameters::new(1500.0 - 20.0 * 8.0, 1.0 + 20.0 * 0.02, SAMPLE_RATE);
    assert!((report.parameters.cutoff_hz() - params.cutoff_hz()).abs() < 1e-9);
    assert!((report.parameters.q() - params.q()).abs() < 1e-9);

    let block = report.lookahead_block;
    let range = ctl.engine().cache().block_range(block);
    let source = ctl.engine().source().clone();
    let expected = filtered(&source, &report.parameters.coefficients(), range.start, range.len());
    assert_eq!(&ctl.engine().output().to_frames()[range], expected.as_slice());
}

// ============================================================================
// SEEK / RELOAD
// ============================================================================

#[test]
fn test_seek_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_source(&dir, "12k.wav", &generate_sine_frames(440.0, 12_000));

    let mut ctl = open(&path, SimulatedPlayback::looping());
    ctl.tick([]);
    assert_eq!(ctl.engine().cache().valid_count(), 2);

    ctl.seek_to(7000);
    let valid: Vec<usize> = ctl.engine().cache().valid_blocks().collect();
    assert_eq!(valid, vec![1]);
    assert_eq!(ctl.playback().current_position_sample(), 7000);

    // Next tick at 7000 looks ahead to 12000 mod 12000 = block 0, filling
    // block 2 on the way
    let report = ctl.tick([]);
    assert_eq!(report.lookahead_block, 0);
    assert_eq!(report.filled_blocks, vec![2, 0]);
}

#[test]
fn test_coarse_ticks_never_play_unfiltered_tail() {
    let dir = TempDir::new().unwrap();
    let frames = generate_sine_frames(2500.0, 12_345);
    let path = write_source(&dir, "tail.wav", &frames);

    let mut ctl = open(&path, SimulatedPlayback::recording());
    ctl.playback_mut().play().unwrap();
    while !ctl.playback().is_finished() {
        ctl.tick([]);
        ctl.playback_mut().advance(4000);
    }

    let source = ctl.engine().source().clone();
    let expected = filtered(&source, ctl.engine().coefficients(), 0, source.len());
    assert_eq!(ctl.playback().captured(), expected.as_slice());
}

#[test]
fn test_reload_between_files() {
    let dir = TempDir::new().unwrap();
    let first = write_source(&dir, "first.wav", &generate_sine_frames(440.0, 12_000));
    let second = write_source(&dir, "second.wav", &generate_sine_frames(880.0, 7_000));

    let mut ctl = open(&first, SimulatedPlayback::looping());
    ctl.tick([ControlEvent::Adjust(Adjustment::CutoffUp)]);

    let report = ctl.tick([ControlEvent::Reload(source_id(&second))]);
    assert!(report.reload_error.is_none());
    assert_eq!(ctl.engine().len(), 7_000);
    assert_eq!(ctl.playback().total_length_samples(), 7_000);
    assert_eq!(ctl.engine().cache().block_count(), 2);
    assert_eq!(report.parameters, FilterParameters::with_defaults(SAMPLE_RATE));
    assert_eq!(report.state, ControllerState::Stable);
    assert!(report.playing);

    let missing = dir.path().join("missing.wav");
    let report = ctl.tick([ControlEvent::Reload(source_id(&missing))]);
    assert!(report.reload_error.is_some());
    assert_eq!(ctl.source_id(), &source_id(&second));
    assert_eq!(ctl.engine().len(), 7_000);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_reader_thread_sees_published_blocks() {
    let dir = TempDir::new().unwrap();
    let path = write_source(&dir, "sine.wav", &generate_sine_frames(700.0, 30_000));

    let mut ctl = open(&path, SimulatedPlayback::looping());
    let reader = ctl.engine().reader();

    let handle = std::thread::spawn(move || {
        let mut last = 0;
        for _ in 0..10_000 {
            let generation = reader.generation();
            assert!(generation >= last);
            last = generation;
            let _ = reader.frame(29_999);
        }
        last
    });

    ctl.playback_mut().play().unwrap();
    for _ in 0..60 {
        ctl.tick([]);
        ctl.playback_mut().advance(700);
    }

    let seen = handle.join().unwrap();
    assert!(seen <= ctl.engine().output().generation());
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[tokio::test]
async fn test_config_drives_block_size() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    tokio::fs::write(
        &config_path,
        "[stream]\nblock_len = 1000\n\n[filter]\ndefault_cutoff_hz = 600.0\n",
    )
    .await
    .unwrap();

    let config: ResonantConfig = ConfigManager::with_path(config_path).load().await;
    assert_eq!(config.stream.block_len, 1000);

    let path = write_source(&dir, "sine.wav", &generate_sine_frames(440.0, 4_500));
    let mut ctl = StreamingController::open(
        source_id(&path),
        WavLoader::new(),
        SimulatedPlayback::looping(),
        config.stream_settings(),
    )
    .unwrap();

    assert_eq!(ctl.engine().cache().block_count(), 5);
    assert_eq!(ctl.parameters().cutoff_hz(), 600.0);
    assert_eq!(ctl.tick([]).filled_blocks, vec![1]);
}
