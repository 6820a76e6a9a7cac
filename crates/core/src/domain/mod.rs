//! Domain entities and business rules

pub mod audio;
pub mod cache;
pub mod config;
pub mod filter;
pub mod streaming;

// Re-export specific items to avoid ambiguous `Result` aliases
pub use audio::{
    AudioError, OutputBuffer, OutputReader, PlaybackSink, SourceId, SourceLoader, StereoFrame,
    Waveform,
};
pub use cache::{BlockCache, DEFAULT_BLOCK_LEN};
pub use config::{
    AudioOutputConfig, ConfigError, ConfigManager, FilterConfig, ResonantConfig, StreamConfig,
};
pub use filter::{
    apply_range, params, Adjustment, AdjustmentSteps, ContinuityState, FilterCoefficients,
    FilterParameters,
};
pub use streaming::{
    control_channel, ControlEvent, ControlQueue, ControlSender, ControllerState, StreamEngine,
    StreamSettings, StreamingController, TickReport, CONTROL_QUEUE_CAPACITY,
};
