use crate::core::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 解码模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// 播放前完整解码（默认）
    Batch,
    /// 后台线程有界预解码（长媒体使用）
    Streaming,
}

/// 像素转换的缩放算法（输出尺寸不变，只影响色彩转换质量）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerQuality {
    Bicubic,
    Bilinear,
    FastBilinear,
}

impl ScalerQuality {
    pub fn flags(&self) -> ffmpeg_next::software::scaling::Flags {
        use ffmpeg_next::software::scaling::Flags;
        match self {
            ScalerQuality::Bicubic => Flags::BICUBIC,
            ScalerQuality::Bilinear => Flags::BILINEAR,
            ScalerQuality::FastBilinear => Flags::FAST_BILINEAR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frames_per_buffer: u32,
    /// 输出衰减系数
    pub attenuation: f32,
    /// true 时按 (右, 左) 顺序写入输出缓冲
    pub swap_channels: bool,
    /// 源采样率与输出不一致时是否重采样
    pub resample: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            frames_per_buffer: 256,
            attenuation: 0.5,
            swap_channels: true,
            resample: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub mode: DecodeMode,
    /// streaming 模式下视频帧通道容量
    pub video_window_frames: usize,
    /// streaming 模式下音频采样队列容量（采样对数）
    pub audio_window_samples: usize,
    pub scaler: ScalerQuality,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            mode: DecodeMode::Batch,
            video_window_frames: 120,
            audio_window_samples: 44100 * 4,
            scaler: ScalerQuality::Bicubic,
        }
    }
}

/// 播放器配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub audio: AudioConfig,
    pub decode: DecodeConfig,
}

impl PlayerConfig {
    /// 从 JSON 文件加载（缺省字段使用默认值）
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(PlayerError::ConfigError("audio.sample_rate 必须大于 0".to_string()));
        }
        if self.audio.frames_per_buffer == 0 {
            return Err(PlayerError::ConfigError(
                "audio.frames_per_buffer 必须大于 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.audio.attenuation) {
            return Err(PlayerError::ConfigError(format!(
                "audio.attenuation 超出 [0, 1]: {}",
                self.audio.attenuation
            )));
        }
        if self.decode.video_window_frames == 0 || self.decode.audio_window_samples == 0 {
            return Err(PlayerError::ConfigError(
                "decode 窗口容量必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}
