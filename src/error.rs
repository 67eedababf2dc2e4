use thiserror::Error;

#[derive(Error, Debug)]
pub enum RxError {
    #[error("Invalid receiver configuration: {0}")]
    Config(String),

    #[error("Channel {channel} failed to create: {reason}")]
    ChannelCreate { channel: usize, reason: String },

    #[error("Ring buffer capacity must be even and nonzero, got {0}")]
    RingCapacity(usize),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),
}

pub type Result<T> = std::result::Result<T, RxError>;
