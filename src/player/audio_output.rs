use crate::core::{AudioConfig, PlayerError, Result};
use crate::player::sample_queue::AudioSampleQueue;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 输出固定为立体声
pub const OUTPUT_CHANNELS: u16 = 2;

/// 音频回调统计（回调线程只做原子累加）
#[derive(Debug, Default)]
pub struct AudioStats {
    callbacks: AtomicU64,
    delivered_frames: AtomicU64,
    underrun_events: AtomicU64,
    missing_frames: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioStatsSnapshot {
    pub callbacks: u64,
    pub delivered_frames: u64,
    pub underrun_events: u64,
    pub missing_frames: u64,
}

impl AudioStats {
    pub fn snapshot(&self) -> AudioStatsSnapshot {
        AudioStatsSnapshot {
            callbacks: self.callbacks.load(Ordering::Relaxed),
            delivered_frames: self.delivered_frames.load(Ordering::Relaxed),
            underrun_events: self.underrun_events.load(Ordering::Relaxed),
            missing_frames: self.missing_frames.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.callbacks.store(0, Ordering::Relaxed);
        self.delivered_frames.store(0, Ordering::Relaxed);
        self.underrun_events.store(0, Ordering::Relaxed);
        self.missing_frames.store(0, Ordering::Relaxed);
    }
}

/// 回调写入参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliverySettings {
    pub attenuation: f32,
    pub swap_channels: bool,
}

impl From<&AudioConfig> for DeliverySettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            attenuation: config.attenuation,
            swap_channels: config.swap_channels,
        }
    }
}

/// 用队列中的采样填满一个交错立体声输出缓冲
///
/// 每个输出帧弹出一个采样对，乘以衰减系数后按配置的声道顺序写入。
/// 队列不足时剩余部分写 0 并记一次欠载；生产已结束的空队列不计欠载。
/// 不阻塞、不分配内存，可在实时线程中调用。
pub fn fill_output_buffer(
    queue: &AudioSampleQueue,
    output: &mut [f32],
    settings: DeliverySettings,
    stats: &AudioStats,
) {
    let channels = OUTPUT_CHANNELS as usize;
    let mut delivered = 0u64;
    let mut missing = 0u64;

    let mut frames = output.chunks_exact_mut(channels);
    for frame in &mut frames {
        match queue.pop() {
            Some(sample) => {
                let left = sample.left * settings.attenuation;
                let right = sample.right * settings.attenuation;
                if settings.swap_channels {
                    frame[0] = right;
                    frame[1] = left;
                } else {
                    frame[0] = left;
                    frame[1] = right;
                }
                delivered += 1;
            }
            None => {
                frame.fill(0.0);
                missing += 1;
            }
        }
    }
    frames.into_remainder().fill(0.0);

    stats.callbacks.fetch_add(1, Ordering::Relaxed);
    stats.delivered_frames.fetch_add(delivered, Ordering::Relaxed);
    if missing > 0 && !queue.is_finished() {
        stats.underrun_events.fetch_add(1, Ordering::Relaxed);
        stats.missing_frames.fetch_add(missing, Ordering::Relaxed);
    }
}

/// 音频输出 - 使用 cpal 以固定周期从采样队列拉取数据
pub struct AudioOutput {
    stream: Option<Stream>,
    config: StreamConfig,
    device_name: String,
}

impl AudioOutput {
    /// 打开默认输出设备并开始播放
    pub fn initialize(
        config: &AudioConfig,
        queue: Arc<AudioSampleQueue>,
        stats: Arc<AudioStats>,
    ) -> Result<Self> {
        info!(
            "初始化音频输出: {} Hz, {} 声道, 每缓冲 {} 帧",
            config.sample_rate, OUTPUT_CHANNELS, config.frames_per_buffer
        );

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;
        let device_name = device.name().unwrap_or_default();
        debug!("使用音频设备: {}", device_name);

        let mut stream_config = StreamConfig {
            channels: OUTPUT_CHANNELS,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.frames_per_buffer),
        };

        if !Self::device_supports(&device, &stream_config)? {
            warn!(
                "⚠️  音频设备未声明支持 {} Hz / {} 声道 / f32，仍尝试打开",
                config.sample_rate, OUTPUT_CHANNELS
            );
        }

        let settings = DeliverySettings::from(config);
        let stream = match Self::build_stream(&device, &stream_config, &queue, &stats, settings) {
            Ok(stream) => stream,
            Err(e) => {
                // 固定缓冲大小被拒绝时回退到设备默认大小
                warn!("⚠️  固定缓冲 {} 帧不可用 ({})，回退到设备默认缓冲", config.frames_per_buffer, e);
                stream_config.buffer_size = BufferSize::Default;
                Self::build_stream(&device, &stream_config, &queue, &stats, settings)
                    .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?
            }
        };

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;
        info!("🔊 音频输出已启动: {}", device_name);

        Ok(Self {
            stream: Some(stream),
            config: stream_config,
            device_name,
        })
    }

    fn build_stream(
        device: &Device,
        stream_config: &StreamConfig,
        queue: &Arc<AudioSampleQueue>,
        stats: &Arc<AudioStats>,
        settings: DeliverySettings,
    ) -> std::result::Result<Stream, cpal::BuildStreamError> {
        let queue = queue.clone();
        let stats = stats.clone();
        device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                fill_output_buffer(&queue, data, settings, &stats);
            },
            move |err| {
                error!("音频流错误: {}", err);
            },
            None,
        )
    }

    /// 检查设备是否声明支持该配置
    fn device_supports(device: &Device, config: &StreamConfig) -> Result<bool> {
        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;

        let mut supported = false;
        for range in supported_configs {
            if Self::is_config_compatible(config, &range) {
                supported = true;
                break;
            }
        }
        Ok(supported)
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();
        let format_match = supported.sample_format() == SampleFormat::F32;

        rate_in_range && channels_match && format_match
    }

    /// 停止并释放音频设备
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("暂停音频流失败: {}", e);
            }
            drop(stream);
            info!("音频输出已停止: {}", self.device_name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// 获取实际使用的音频配置 (采样率, 声道数)
    pub fn get_config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
