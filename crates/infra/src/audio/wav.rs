//! WAV file sources and the WAV writer used by offline rendering
//!
//! Every supported layout is normalized to 16-bit stereo:
//! - mono is duplicated to both channels
//! - channels beyond the first two are dropped
//! - other integer widths are rescaled to 16 bits
//! - float samples are scaled by 32767 and clamped

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use resonant_core::domain::audio::{
    AudioError, Result, SourceId, SourceLoader, StereoFrame, Waveform,
};
use std::path::Path;
use tracing::{debug, info};

/// Loads sources by treating the [`SourceId`] as a file path
#[derive(Debug, Clone, Copy, Default)]
pub struct WavLoader;

impl WavLoader {
    pub fn new() -> Self {
        Self
    }
}

impl SourceLoader for WavLoader {
    fn load(&self, source: &SourceId) -> Result<Waveform> {
        read_wav(Path::new(source.as_str()))
    }
}

/// Decode a WAV file into a stereo 16-bit waveform
pub fn read_wav(path: &Path) -> Result<Waveform> {
    if !path.exists() {
        return Err(AudioError::SourceNotFound(path.display().to_string()));
    }

    let mut reader = WavReader::open(path)
        .map_err(|e| AudioError::Decode(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    debug!(
        path = %path.display(),
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        format = ?spec.sample_format,
        "Decoding WAV"
    );

    if spec.channels == 0 {
        return Err(AudioError::Decode("WAV declares zero channels".to_string()));
    }

    let samples: Vec<i16> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(float_to_i16))
            .collect::<std::result::Result<_, _>>(),
        SampleFormat::Int => match spec.bits_per_sample {
            16 => reader.samples::<i16>().collect::<std::result::Result<_, _>>(),
            bits @ 1..=32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| rescale_int(v, bits)))
                .collect::<std::result::Result<_, _>>(),
            bits => {
                return Err(AudioError::Decode(format!("Unsupported bit depth: {bits}")));
            }
        },
    }
    .map_err(|e| AudioError::Decode(format!("{}: {}", path.display(), e)))?;

    let channels = spec.channels as usize;
    let frames: Vec<StereoFrame> = samples
        .chunks_exact(channels)
        .map(|chunk| match chunk {
            [mono] => StereoFrame::mono(*mono),
            [left, right, ..] => StereoFrame::new(*left, *right),
            [] => StereoFrame::SILENCE,
        })
        .collect();

    let waveform = Waveform::new(frames, spec.sample_rate)?;
    info!(
        path = %path.display(),
        frames = waveform.len(),
        duration_secs = waveform.duration_secs(),
        "WAV loaded"
    );
    Ok(waveform)
}

/// Write stereo 16-bit frames as a WAV file
pub fn write_wav(path: &Path, frames: &[StereoFrame], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let to_err = |e: hound::Error| AudioError::StreamError(format!("{}: {}", path.display(), e));

    let mut writer = WavWriter::create(path, spec).map_err(to_err)?;
    for frame in frames {
        writer.write_sample(frame.left).map_err(to_err)?;
        writer.write_sample(frame.right).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)?;

    info!(path = %path.display(), frames = frames.len(), "WAV written");
    Ok(())
}

#[inline]
fn float_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[inline]
fn rescale_int(sample: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_raw<T: hound::Sample + Copy>(path: &Path, spec: WavSpec, samples: &[T]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn int_spec(channels: u16, bits: u16) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 22050,
            bits_per_sample: bits,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn test_stereo_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let frames = vec![
            StereoFrame::new(1000, -1000),
            StereoFrame::new(i16::MAX, i16::MIN),
            StereoFrame::SILENCE,
        ];

        write_wav(&path, &frames, 44100).unwrap();
        let loaded = read_wav(&path).unwrap();

        assert_eq!(loaded.sample_rate(), 44100);
        assert_eq!(loaded.frames(), frames.as_slice());
    }

    #[test]
    fn test_mono_is_duplicated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        write_raw::<i16>(&path, int_spec(1, 16), &[5, -7, 300]);

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.sample_rate(), 22050);
        assert_eq!(loaded.frame(1), StereoFrame::mono(-7));
    }

    #[test]
    fn test_extra_channels_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quad.wav");
        write_raw::<i16>(&path, int_spec(4, 16), &[1, 2, 3, 4, 5, 6, 7, 8]);

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.frames(), &[StereoFrame::new(1, 2), StereoFrame::new(5, 6)]);
    }

    #[test]
    fn test_24_bit_rescaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep.wav");
        write_raw::<i32>(&path, int_spec(2, 24), &[0x12_3400, -0x10_0000]);

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.frame(0), StereoFrame::new(0x1234, -0x1000));
    }

    #[test]
    fn test_8_bit_rescaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("narrow.wav");
        write_raw::<i8>(&path, int_spec(1, 8), &[64, -128]);

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.frame(0), StereoFrame::mono(64 << 8));
        assert_eq!(loaded.frame(1), StereoFrame::mono(i16::MIN));
    }

    #[test]
    fn test_float_scaled_and_clamped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        write_raw::<f32>(&path, spec, &[0.5, -1.0, 2.0, -3.0]);

        let loaded = read_wav(&path).unwrap();
        assert_eq!(loaded.frame(0), StereoFrame::new(16383, -32767));
        assert_eq!(loaded.frame(1), StereoFrame::new(i16::MAX, i16::MIN));
    }

    #[test]
    fn test_missing_file() {
        let err = WavLoader::new()
            .load(&SourceId::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, AudioError::SourceNotFound(_)));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();

        let err = read_wav(&path).unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");
        write_raw::<i16>(&path, int_spec(2, 16), &[]);

        let err = read_wav(&path).unwrap_err();
        assert!(matches!(err, AudioError::EmptySource));
    }
}
