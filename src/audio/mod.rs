pub mod output;

pub use output::LocalAudioOutput;
