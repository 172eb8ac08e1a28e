pub mod audio_mixer;
pub mod audio_source;
pub mod encoder;
pub mod mic_source;
pub mod monitor_source;
pub mod playback;

pub use audio_mixer::{mix, StreamResampler};
pub use audio_source::{AudioSource, SampleBuffer};
pub use encoder::WavChunkEncoder;
pub use playback::PlaybackSink;
