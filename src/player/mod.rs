// 播放器核心模块

pub mod demuxer;
pub mod demuxer_source;  // Demuxer 抽象接口
pub mod decoder;
pub mod sample_format;
pub mod frame_store;
pub mod sample_queue;
pub mod audio_output;
pub mod scheduler;
pub mod pipeline;
pub mod decode_ahead;  // streaming 模式的有界预解码线程
pub mod manager;

pub use demuxer::Demuxer;
pub use demuxer_source::{CompressedPacket, DemuxerSource};
pub use decoder::{AudioDecoder, VideoDecoder};
pub use frame_store::TimedVideoFrameStore;
pub use sample_queue::AudioSampleQueue;
pub use audio_output::{fill_output_buffer, AudioOutput, AudioStats, AudioStatsSnapshot, DeliverySettings};
pub use scheduler::{FrameScheduler, FrameSink, FrameSource, PacingWait, PresentedFrame, SleepWait, Tick};
pub use pipeline::{decode_audio, decode_video};
pub use decode_ahead::{DecodeAheadWorker, FrameDeduper, FrameWindow};
pub use manager::{PlaybackController, PlaybackSession};
