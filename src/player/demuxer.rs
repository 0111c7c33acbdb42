use crate::core::{MediaInfo, PlayerError, Result, StreamDescriptor, StreamKind, TimeBase};
use crate::player::demuxer_source::{CompressedPacket, DemuxerSource};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};
use std::path::Path;

/// 解封装器 - 负责读取媒体文件并分离音视频流
///
/// 视频流和音频流按声明的媒体类型选择各自的第一个（不依赖流序号），
/// 缺少任意一个都视为打开失败。
pub struct Demuxer {
    input_ctx: format::context::Input,
    video: StreamDescriptor,
    audio: StreamDescriptor,
    source_path: String, // 媒体源路径（用于描述）
}

impl Demuxer {
    /// 打开媒体文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source_path = path.display().to_string();
        info!("正在打开文件: {}", source_path);

        if !path.exists() {
            return Err(PlayerError::OpenError(format!("文件不存在: {}", source_path)));
        }

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", source_path, e)))?;

        // 按声明的媒体类型各取第一个视频流和音频流
        let video_index =
            Self::first_stream_of(&input_ctx, media::Type::Video).ok_or(PlayerError::NoVideoStream)?;
        let audio_index =
            Self::first_stream_of(&input_ctx, media::Type::Audio).ok_or(PlayerError::NoAudioStream)?;

        debug!("视频流索引: {}", video_index);
        debug!("音频流索引: {}", audio_index);

        let video = Self::describe(&input_ctx, video_index, StreamKind::Video)?;
        let audio = Self::describe(&input_ctx, audio_index, StreamKind::Audio)?;

        info!(
            "📎 视频: {} {}x{} ({}), 时间基 {}",
            video.codec, video.width, video.height, video.format, video.time_base
        );
        info!(
            "📎 音频: {} {} Hz / {} 声道 ({}), 时间基 {}",
            audio.codec, audio.sample_rate, audio.channels, audio.format, audio.time_base
        );

        Ok(Self {
            input_ctx,
            video,
            audio,
            source_path,
        })
    }

    /// 容器中第一个声明为 `medium` 类型的流（多音轨时不按码率等条件挑选）
    fn first_stream_of(input_ctx: &format::context::Input, medium: media::Type) -> Option<usize> {
        input_ctx
            .streams()
            .find(|stream| stream.parameters().medium() == medium)
            .map(|stream| stream.index())
    }

    /// 从流参数推导描述信息（内部使用）
    fn describe(
        input_ctx: &format::context::Input,
        index: usize,
        kind: StreamKind,
    ) -> Result<StreamDescriptor> {
        let missing = || match kind {
            StreamKind::Video => PlayerError::NoVideoStream,
            StreamKind::Audio => PlayerError::NoAudioStream,
        };
        let stream = input_ctx.stream(index).ok_or_else(missing)?;
        let parameters = stream.parameters();

        // 先获取编解码器名称（在 parameters 被移动前）
        let codec = parameters.id().name().to_string();
        let time_base = TimeBase::from(stream.time_base());

        let context = ffmpeg::codec::context::Context::from_parameters(parameters)
            .map_err(|e| PlayerError::DecoderInitError(format!("{} 流参数无效: {}", kind.as_str(), e)))?;

        let mut descriptor = StreamDescriptor {
            index,
            kind,
            codec,
            format: String::new(),
            time_base,
            width: 0,
            height: 0,
            sample_rate: 0,
            channels: 0,
        };

        match kind {
            StreamKind::Video => {
                let decoder = context.decoder().video().map_err(|e| {
                    PlayerError::DecoderInitError(format!("视频解码器不可用: {}", e))
                })?;
                descriptor.width = decoder.width();
                descriptor.height = decoder.height();
                descriptor.format = format!("{:?}", decoder.format());
            }
            StreamKind::Audio => {
                let decoder = context.decoder().audio().map_err(|e| {
                    PlayerError::DecoderInitError(format!("音频解码器不可用: {}", e))
                })?;
                descriptor.sample_rate = decoder.rate();
                descriptor.channels = decoder.channels();
                descriptor.format = format!("{:?}", decoder.format());
            }
        }

        Ok(descriptor)
    }

    /// 获取媒体信息
    pub fn media_info(&self) -> MediaInfo {
        MediaInfo {
            path: self.source_path.clone(),
            video: self.video.clone(),
            audio: self.audio.clone(),
        }
    }

    /// 获取源路径描述
    pub fn path(&self) -> &str {
        &self.source_path
    }
}

impl DemuxerSource for Demuxer {
    fn read_packet(&mut self) -> Result<Option<CompressedPacket>> {
        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    let stream_index = stream.index();

                    // 判断包类型
                    let kind = if stream_index == self.video.index {
                        StreamKind::Video
                    } else if stream_index == self.audio.index {
                        StreamKind::Audio
                    } else {
                        // 否则跳过这个包，继续循环
                        continue;
                    };

                    return Ok(Some(CompressedPacket {
                        packet,
                        kind,
                        stream_index,
                    }));
                }
                None => return Ok(None),
            }
        }
    }

    fn descriptor(&self, kind: StreamKind) -> &StreamDescriptor {
        match kind {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
        }
    }

    fn parameters(&self, kind: StreamKind) -> Result<ffmpeg::codec::Parameters> {
        let index = self.descriptor(kind).index;
        self.input_ctx
            .stream(index)
            .map(|stream| stream.parameters())
            .ok_or(match kind {
                StreamKind::Video => PlayerError::NoVideoStream,
                StreamKind::Audio => PlayerError::NoAudioStream,
            })
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
