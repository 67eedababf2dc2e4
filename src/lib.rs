pub mod audio;
pub mod config;
pub mod constants;
pub mod dsp;
pub mod error;
pub mod filters;
pub mod modes;
pub mod queue;
pub mod radio;
pub mod receiver;
pub mod ring;
pub mod sinks;
pub mod state;
pub mod tuning;

pub use config::ChannelConfig;
pub use error::{Result, RxError};
pub use receiver::ReceiverChannel;
