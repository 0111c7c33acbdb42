//! 卡拉OK 播放核心
//!
//! 打开媒体文件，把视频解码为按时间戳排序的 RGB0 帧、把音频解码为立体声采样队列，
//! 然后由实时音频回调和宿主渲染循环分别消费。

pub mod core;
pub mod player;

pub use crate::core::{PlayerConfig, PlayerError, Result};
pub use crate::player::{PlaybackController, PlaybackSession};

/// 初始化 FFmpeg（进程内调用一次）
pub fn init() -> Result<()> {
    ffmpeg_next::init()?;
    Ok(())
}
