//! CPAL-based playback of the audible buffer
//!
//! The output callback reads frames straight from an [`OutputReader`] and
//! loops over the source. Transport state (position, playing flag) is shared
//! with the control thread through atomics; the callback takes no locks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use crossbeam::utils::CachePadded;
use resonant_core::domain::audio::{AudioError, OutputReader, PlaybackSink, Result, StereoFrame};
use resonant_core::domain::config::AudioOutputConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

const I16_SCALE: f32 = 1.0 / 32768.0;

/// Position and run state shared with the output callback
#[derive(Debug, Default)]
pub struct Transport {
    position: CachePadded<AtomicUsize>,
    playing: AtomicBool,
}

impl Transport {
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    pub fn set_position(&self, position: usize) {
        self.position.store(position, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Fill an interleaved device buffer from `reader` and advance the
    /// position, wrapping at the end of the source.
    ///
    /// A seek that lands while the callback runs wins over the advance.
    pub fn render(
        &self,
        reader: &OutputReader,
        data: &mut [f32],
        channels: usize,
        scratch: &mut Vec<StereoFrame>,
    ) {
        if channels == 0 || reader.is_empty() || !self.is_playing() {
            data.fill(0.0);
            return;
        }

        let frames = data.len() / channels;
        let start = self.position();
        scratch.resize(frames, StereoFrame::SILENCE);
        reader.copy_looped(start, scratch);

        for (out, frame) in data.chunks_exact_mut(channels).zip(scratch.iter()) {
            out[0] = frame.left as f32 * I16_SCALE;
            if channels > 1 {
                out[1] = frame.right as f32 * I16_SCALE;
                out[2..].fill(0.0);
            }
        }

        let next = (start % reader.len() + frames) % reader.len();
        let _ = self.position.compare_exchange(start, next, Ordering::AcqRel, Ordering::Relaxed);
    }
}

/// Plays the audible buffer on a CPAL output device
///
/// Not `Send` on every platform: construct and use it on the control thread.
pub struct CpalPlayback {
    device: cpal::Device,
    buffer_size: u32,
    transport: Arc<Transport>,
    stream: Option<Stream>,
    length: usize,
}

impl CpalPlayback {
    /// Open the configured output device (or the default one)
    #[allow(deprecated)]
    pub fn new(config: &AudioOutputConfig) -> Result<Self> {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());

        let device = if config.output_device.is_empty() {
            host.default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?
        } else {
            host.output_devices()
                .map_err(|e| AudioError::StreamError(e.to_string()))?
                .find(|d| d.name().ok().as_deref() == Some(config.output_device.as_str()))
                .ok_or_else(|| AudioError::DeviceNotFound(config.output_device.clone()))?
        };

        let name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());
        info!(device = %name, buffer_size = config.buffer_size, "Output device opened");

        Ok(Self {
            device,
            buffer_size: config.buffer_size,
            transport: Arc::new(Transport::default()),
            stream: None,
            length: 0,
        })
    }

    pub fn transport(&self) -> Arc<Transport> {
        Arc::clone(&self.transport)
    }

    fn build_stream(&self, reader: OutputReader, sample_rate: u32) -> Result<Stream> {
        let cpal_config = CpalStreamConfig {
            channels: 2,
            sample_rate,
            buffer_size: cpal::BufferSize::Fixed(self.buffer_size),
        };
        let channels = cpal_config.channels as usize;
        let transport = Arc::clone(&self.transport);
        let mut scratch = Vec::with_capacity(self.buffer_size as usize);

        let stream = self
            .device
            .build_output_stream(
                &cpal_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    transport.render(&reader, data, channels, &mut scratch);
                },
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        Ok(stream)
    }
}

impl PlaybackSink for CpalPlayback {
    fn current_position_sample(&self) -> usize {
        self.transport.position()
    }

    fn total_length_samples(&self) -> usize {
        self.length
    }

    fn set_buffer(&mut self, buffer: OutputReader, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }

        let length = buffer.len();
        let stream = self.build_stream(buffer, sample_rate)?;

        // Old stream stops when dropped
        self.stream = Some(stream);
        self.length = length;
        self.transport.set_position(0);

        info!(frames = length, sample_rate, "Output stream attached");
        Ok(())
    }

    fn seek(&mut self, sample: usize) {
        let position = if self.length == 0 { 0 } else { sample.min(self.length - 1) };
        self.transport.set_position(position);
    }

    fn play(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(AudioError::StreamError("No buffer attached".to_string()));
        }
        self.transport.set_playing(true);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.transport.set_playing(false);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.transport.set_playing(false);
        self.transport.set_position(0);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }
}
