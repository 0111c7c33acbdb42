use crate::core::{
    AudioConfig, AudioSample, DecodedVideoFrame, PlayerError, PresentationTime, Result,
    ScalerQuality, StreamKind, TimeBase,
};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::sample_format::{interleave_stereo, RawAudioBlock, SampleEncoding};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::{sample, Sample};
use ffmpeg_next::{codec, software, util};
use log::{debug, info, warn};

/// AVERROR(EAGAIN)（解码器需要更多输入）或 EOF 都只是暂停，不是错误
fn is_stall(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Other { errno } if *errno == util::error::EAGAIN)
        || matches!(err, ffmpeg::Error::Eof)
}

fn open_decoder_context<S: DemuxerSource + ?Sized>(
    source: &S,
    kind: StreamKind,
) -> Result<codec::decoder::Decoder> {
    let parameters = source.parameters(kind)?;
    let context = codec::context::Context::from_parameters(parameters)
        .map_err(|e| PlayerError::DecoderInitError(format!("{} 解码上下文创建失败: {}", kind.as_str(), e)))?;
    Ok(context.decoder())
}

/// 视频解码器：解码 + 转换为 RGB0（原始尺寸，不缩放）
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    scaler: Option<ScalerState>,
    scaler_flags: software::scaling::Flags,
    time_base: TimeBase,
    skipped_frames: usize,
}

struct ScalerState {
    context: software::scaling::Context,
    format: util::format::Pixel,
    width: u32,
    height: u32,
}

impl VideoDecoder {
    /// 从数据源的视频流创建解码器
    pub fn from_source<S: DemuxerSource + ?Sized>(source: &S, quality: ScalerQuality) -> Result<Self> {
        let decoder = open_decoder_context(source, StreamKind::Video)?
            .video()
            .map_err(|e| PlayerError::DecoderInitError(format!("无法打开视频解码器: {}", e)))?;
        let time_base = source.descriptor(StreamKind::Video).time_base;

        debug!(
            "视频解码器: {}x{}, 格式: {:?}, 时间基 {}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            time_base
        );

        Ok(Self {
            decoder,
            scaler: None,
            scaler_flags: quality.flags(),
            time_base,
            skipped_frames: 0,
        })
    }

    /// 解码数据包，返回 0~n 个已转换的帧
    pub fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<(PresentationTime, DecodedVideoFrame)>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(e) if is_stall(&e) => {
                // 解码器输出缓冲已满：先取走已有帧，再重新送入
                self.receive_frames(&mut frames)?;
                if let Err(e) = self.decoder.send_packet(packet) {
                    if !is_stall(&e) {
                        return Err(PlayerError::DecodeError(format!("视频包送入失败: {}", e)));
                    }
                    debug!("视频解码器暂不接收数据，跳过本次包");
                }
            }
            Err(e) => return Err(PlayerError::DecodeError(format!("视频包送入失败: {}", e))),
        }

        self.receive_frames(&mut frames)?;
        Ok(frames)
    }

    /// 刷新解码器（获取因重排序缓冲的帧）
    pub fn flush(&mut self) -> Result<Vec<(PresentationTime, DecodedVideoFrame)>> {
        let mut frames = Vec::new();
        match self.decoder.send_eof() {
            Ok(()) => {}
            Err(e) if is_stall(&e) => {}
            Err(e) => return Err(PlayerError::DecodeError(format!("视频解码器 flush 失败: {}", e))),
        }
        self.receive_frames(&mut frames)?;
        if self.skipped_frames > 0 {
            info!("视频解码跳过 {} 个无时间戳或预滚动帧", self.skipped_frames);
        }
        Ok(frames)
    }

    fn receive_frames(&mut self, frames: &mut Vec<(PresentationTime, DecodedVideoFrame)>) -> Result<()> {
        loop {
            let mut decoded = util::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    if let Some(frame) = self.convert_frame(&decoded)? {
                        frames.push(frame);
                    }
                }
                Err(e) if is_stall(&e) => return Ok(()),
                Err(e) => return Err(PlayerError::DecodeError(format!("视频帧解码失败: {}", e))),
            }
        }
    }

    /// 转换帧格式为 RGB0
    fn convert_frame(&mut self, frame: &util::frame::Video) -> Result<Option<(PresentationTime, DecodedVideoFrame)>> {
        let timestamp = match frame.timestamp() {
            Some(pts) => PresentationTime::from_pts(pts, self.time_base),
            None => {
                self.skipped_frames += 1;
                return Ok(None);
            }
        };
        if timestamp.is_negative() {
            self.skipped_frames += 1;
            return Ok(None);
        }

        let width = frame.width();
        let height = frame.height();
        let format = frame.format();

        // 初始化 scaler（源尺寸/格式变化时重建）
        let rebuild = match &self.scaler {
            Some(state) => state.format != format || state.width != width || state.height != height,
            None => true,
        };
        if rebuild {
            debug!("🔧 初始化像素转换: {:?} {}x{} → RGB0", format, width, height);
            let context = software::scaling::Context::get(
                format,
                width,
                height,
                util::format::Pixel::RGBZ,
                width,
                height,
                self.scaler_flags,
            )
            .map_err(|e| PlayerError::DecoderInitError(format!("像素转换器创建失败: {}", e)))?;
            self.scaler = Some(ScalerState {
                context,
                format,
                width,
                height,
            });
        }

        let mut rgb_frame = util::frame::Video::empty();
        if let Some(state) = self.scaler.as_mut() {
            state
                .context
                .run(frame, &mut rgb_frame)
                .map_err(|e| PlayerError::DecodeError(format!("像素转换失败: {}", e)))?;
        }

        // 复制数据到连续内存
        let row_size = width as usize * DecodedVideoFrame::BYTES_PER_PIXEL;
        let mut data = vec![0u8; row_size * height as usize];

        let stride = rgb_frame.stride(0);
        let frame_data = rgb_frame.data(0);

        for y in 0..height as usize {
            let src_offset = y * stride;
            let dst_offset = y * row_size;
            data[dst_offset..dst_offset + row_size]
                .copy_from_slice(&frame_data[src_offset..src_offset + row_size]);
        }

        Ok(Some((timestamp, DecodedVideoFrame { width, height, data })))
    }
}

/// 音频重采样器：任意格式/声道/采样率 → 目标采样率的 f32 交错立体声
///
/// 输出帧按 `输入采样数 × 目标率 / 源采样率 + 内部延迟` 预先分配，
/// 升采样时不会因输出帧太小而把数据滞留在 swr 内部。
pub struct StereoResampler {
    context: software::resampling::Context,
    source_rate: u32,
    target_rate: u32,
}

impl StereoResampler {
    pub fn new(format: Sample, layout: ChannelLayout, source_rate: u32, target_rate: u32) -> Result<Self> {
        let context = software::resampling::Context::get(
            format,
            layout,
            source_rate,
            Sample::F32(sample::Type::Packed),
            ChannelLayout::STEREO,
            target_rate,
        )
        .map_err(|e| PlayerError::DecoderInitError(format!("音频重采样器创建失败: {}", e)))?;

        Ok(Self {
            context,
            source_rate,
            target_rate,
        })
    }

    /// 容纳 `input_samples` 个输入采样转换结果所需的输出采样数
    fn output_capacity(&self, input_samples: usize) -> usize {
        let pending = self.context.delay().map_or(0, |d| d.output.max(0) as usize);
        let scaled = input_samples as u64 * self.target_rate as u64 / self.source_rate.max(1) as u64;
        scaled as usize + pending + 3
    }

    fn output_frame(&self, capacity: usize) -> util::frame::Audio {
        let mut frame = util::frame::Audio::new(
            Sample::F32(sample::Type::Packed),
            capacity.max(1),
            ChannelLayout::STEREO,
        );
        frame.set_rate(self.target_rate);
        frame
    }

    /// 转换一帧并追加到 `samples`
    pub fn convert(
        &mut self,
        frame: &util::frame::Audio,
        timestamp: f64,
        samples: &mut Vec<AudioSample>,
    ) -> Result<()> {
        let mut resampled = self.output_frame(self.output_capacity(frame.samples()));
        self.context
            .run(frame, &mut resampled)
            .map_err(|e| PlayerError::DecodeError(format!("音频重采样失败: {}", e)))?;
        if resampled.samples() > 0 {
            append_frame(&resampled, timestamp, samples)?;
        }
        Ok(())
    }

    /// 取出 swr 内部缓冲的全部剩余采样
    pub fn flush(&mut self, timestamp: f64, samples: &mut Vec<AudioSample>) -> Result<()> {
        while self.context.delay().is_some() {
            let mut tail = self.output_frame(self.output_capacity(0));
            self.context
                .flush(&mut tail)
                .map_err(|e| PlayerError::DecodeError(format!("音频重采样器 flush 失败: {}", e)))?;
            if tail.samples() == 0 {
                break;
            }
            append_frame(&tail, timestamp, samples)?;
        }
        Ok(())
    }
}

/// 音频解码器：解码 + 按采样格式数值转换为立体声 f32
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<StereoResampler>,
    time_base: TimeBase,
    target_sample_rate: u32,
    resample: bool,
    rate_warned: bool,
    last_timestamp: f64,
}

impl AudioDecoder {
    /// 从数据源的音频流创建解码器
    pub fn from_source<S: DemuxerSource + ?Sized>(source: &S, config: &AudioConfig) -> Result<Self> {
        let decoder = open_decoder_context(source, StreamKind::Audio)?
            .audio()
            .map_err(|e| PlayerError::DecoderInitError(format!("无法打开音频解码器: {}", e)))?;
        let time_base = source.descriptor(StreamKind::Audio).time_base;

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?} → 目标: {} Hz 立体声 f32",
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            config.sample_rate
        );

        Ok(Self {
            decoder,
            resampler: None,
            time_base,
            target_sample_rate: config.sample_rate,
            resample: config.resample,
            rate_warned: false,
            last_timestamp: 0.0,
        })
    }

    /// 解码数据包，返回按解码顺序排列的采样对
    pub fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<AudioSample>> {
        let mut samples = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(e) if is_stall(&e) => {
                self.receive_samples(&mut samples)?;
                if let Err(e) = self.decoder.send_packet(packet) {
                    if !is_stall(&e) {
                        return Err(PlayerError::DecodeError(format!("音频包送入失败: {}", e)));
                    }
                    debug!("音频解码器暂不接收数据，跳过本次包");
                }
            }
            Err(e) => return Err(PlayerError::DecodeError(format!("音频包送入失败: {}", e))),
        }

        self.receive_samples(&mut samples)?;
        Ok(samples)
    }

    /// 刷新解码器（获取缓冲的帧以及重采样器中的尾部数据）
    pub fn flush(&mut self) -> Result<Vec<AudioSample>> {
        let mut samples = Vec::new();
        match self.decoder.send_eof() {
            Ok(()) => {}
            Err(e) if is_stall(&e) => {}
            Err(e) => return Err(PlayerError::DecodeError(format!("音频解码器 flush 失败: {}", e))),
        }
        self.receive_samples(&mut samples)?;

        let timestamp = self.last_timestamp;
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.flush(timestamp, &mut samples)?;
        }

        Ok(samples)
    }

    fn receive_samples(&mut self, samples: &mut Vec<AudioSample>) -> Result<()> {
        loop {
            let mut decoded = util::frame::Audio::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => self.convert_frame(&decoded, samples)?,
                Err(e) if is_stall(&e) => return Ok(()),
                Err(e) => return Err(PlayerError::DecodeError(format!("音频帧解码失败: {}", e))),
            }
        }
    }

    fn convert_frame(&mut self, frame: &util::frame::Audio, samples: &mut Vec<AudioSample>) -> Result<()> {
        // 同一帧内的采样共用帧时间戳
        if let Some(pts) = frame.timestamp() {
            self.last_timestamp = PresentationTime::from_pts(pts, self.time_base).as_secs_f64();
        }
        let timestamp = self.last_timestamp;

        if frame.rate() == self.target_sample_rate {
            return append_frame(frame, timestamp, samples);
        }

        if !self.resample {
            if !self.rate_warned {
                warn!(
                    "⚠️  音频采样率 {} Hz 与输出 {} Hz 不一致，未启用重采样，播放速度会偏差",
                    frame.rate(),
                    self.target_sample_rate
                );
                self.rate_warned = true;
            }
            return append_frame(frame, timestamp, samples);
        }

        if self.resampler.is_none() {
            let layout = if frame.channel_layout().is_empty() {
                ChannelLayout::default(frame.channels() as i32)
            } else {
                frame.channel_layout()
            };
            info!(
                "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/2ch",
                frame.rate(),
                frame.channels(),
                self.target_sample_rate
            );
            self.resampler = Some(StereoResampler::new(
                frame.format(),
                layout,
                frame.rate(),
                self.target_sample_rate,
            )?);
        }

        match self.resampler.as_mut() {
            Some(resampler) => resampler.convert(frame, timestamp, samples),
            None => Ok(()),
        }
    }
}

fn append_frame(frame: &util::frame::Audio, timestamp: f64, samples: &mut Vec<AudioSample>) -> Result<()> {
    let (encoding, planar) = SampleEncoding::from_ffmpeg(frame.format())?;
    let channels = frame.channels() as usize;
    let plane_count = if planar { channels } else { 1 };
    let planes = (0..plane_count.min(frame.planes()))
        .map(|i| frame.data(i))
        .collect::<Vec<_>>();

    let block = RawAudioBlock {
        encoding,
        planar,
        channels,
        samples: frame.samples(),
        planes,
    };
    interleave_stereo(&block, timestamp, samples)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 生成 `count` 个 i16 交错立体声帧，每帧 `frame_samples` 个采样
    fn sine_frames(rate: u32, frame_samples: usize, count: usize) -> Vec<util::frame::Audio> {
        (0..count)
            .map(|n| {
                let mut frame = util::frame::Audio::new(
                    Sample::I16(sample::Type::Packed),
                    frame_samples,
                    ChannelLayout::STEREO,
                );
                frame.set_rate(rate);
                frame.set_pts(Some((n * frame_samples) as i64));
                let data = frame.data_mut(0);
                for i in 0..frame_samples {
                    let t = (n * frame_samples + i) as f32 / rate as f32;
                    let v = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
                    let bytes = v.to_ne_bytes();
                    data[4 * i..4 * i + 2].copy_from_slice(&bytes);
                    data[4 * i + 2..4 * i + 4].copy_from_slice(&bytes);
                }
                frame
            })
            .collect()
    }

    fn resample_all(source_rate: u32, frame_samples: usize, count: usize) -> usize {
        ffmpeg::init().unwrap();
        let mut resampler = StereoResampler::new(
            Sample::I16(sample::Type::Packed),
            ChannelLayout::STEREO,
            source_rate,
            44100,
        )
        .unwrap();

        let mut out = Vec::new();
        for frame in sine_frames(source_rate, frame_samples, count) {
            resampler.convert(&frame, 0.0, &mut out).unwrap();
        }
        resampler.flush(0.0, &mut out).unwrap();
        out.len()
    }

    #[test]
    fn test_upsampling_keeps_all_audio() {
        // 32 kHz → 44.1 kHz
        let produced = resample_all(32000, 1024, 200);
        let expected = 1024 * 200 * 44100 / 32000;
        assert!(
            produced.abs_diff(expected) <= 32,
            "产出 {} 个采样，期望约 {}",
            produced,
            expected
        );
    }

    #[test]
    fn test_low_rate_source_keeps_all_audio() {
        let produced = resample_all(22050, 512, 100);
        let expected = 512 * 100 * 2;
        assert!(produced.abs_diff(expected) <= 32, "产出 {} 个采样", produced);
    }

    #[test]
    fn test_downsampling_keeps_all_audio() {
        let produced = resample_all(48000, 1024, 100);
        let expected = 1024 * 100 * 44100 / 48000;
        assert!(produced.abs_diff(expected) <= 32, "产出 {} 个采样", produced);
    }

    #[test]
    fn test_eagain_is_a_stall() {
        assert!(is_stall(&ffmpeg::Error::Other {
            errno: util::error::EAGAIN
        }));
        assert!(is_stall(&ffmpeg::Error::Eof));
        assert!(!is_stall(&ffmpeg::Error::InvalidData));
    }
}
