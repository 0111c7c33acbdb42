//! 测试用媒体：用 FFmpeg 编码器生成一个很短的 mkv（mpeg4 视频 + pcm_s16le 立体声）

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::{sample, Pixel, Sample};
use ffmpeg_next::{codec, encoder, format, frame, Packet, Rational};
use std::path::{Path, PathBuf};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const FPS: i32 = 25;

pub struct ClipLayout {
    pub video_frames: usize,
    pub audio_rate: u32,
    pub audio_frames: usize,
    pub audio_frame_samples: usize,
}

impl Default for ClipLayout {
    fn default() -> Self {
        Self {
            video_frames: 12,
            audio_rate: 32000,
            audio_frames: 10,
            audio_frame_samples: 1024,
        }
    }
}

impl ClipLayout {
    pub fn total_audio_samples(&self) -> usize {
        self.audio_frames * self.audio_frame_samples
    }

    /// 视频帧时间戳（毫秒）
    pub fn video_timestamps_ms(&self) -> Vec<i64> {
        (0..self.video_frames as i64).map(|i| i * 1000 / FPS as i64).collect()
    }
}

fn drain(
    encoder: &mut encoder::Encoder,
    octx: &mut format::context::Output,
    stream_index: usize,
    encoder_tb: Rational,
) -> Result<(), ffmpeg::Error> {
    let stream_tb = octx
        .stream(stream_index)
        .map(|s| s.time_base())
        .ok_or(ffmpeg::Error::StreamNotFound)?;
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(stream_index);
        packet.rescale_ts(encoder_tb, stream_tb);
        packet.write_interleaved(octx)?;
    }
    Ok(())
}

/// 在 `dir` 下生成测试片段，返回文件路径
pub fn make_clip(dir: &Path, layout: &ClipLayout) -> Result<PathBuf, ffmpeg::Error> {
    ffmpeg::init()?;
    let path = dir.join("clip.mkv");
    let mut octx = format::output(&path)?;
    let global_header = octx.format().flags().contains(format::Flags::GLOBAL_HEADER);

    // 视频流（第一个流）
    let video_codec = encoder::find(codec::Id::MPEG4).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let video_tb = Rational::new(1, FPS);
    let mut video_stream = octx.add_stream(video_codec)?;
    let video_index = video_stream.index();
    let mut video = codec::context::Context::new_with_codec(video_codec)
        .encoder()
        .video()?;
    video.set_width(WIDTH);
    video.set_height(HEIGHT);
    video.set_format(Pixel::YUV420P);
    video.set_time_base(video_tb);
    video.set_frame_rate(Some(Rational::new(FPS, 1)));
    video.set_gop(6);
    video.set_max_b_frames(2);
    if global_header {
        video.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut video = video.open_as(video_codec)?;
    video_stream.set_time_base(video_tb);
    video_stream.set_parameters(&video);

    // 音频流（第二个流）
    let audio_codec = encoder::find(codec::Id::PCM_S16LE).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let audio_tb = Rational::new(1, layout.audio_rate as i32);
    let mut audio_stream = octx.add_stream(audio_codec)?;
    let audio_index = audio_stream.index();
    let mut audio = codec::context::Context::new_with_codec(audio_codec)
        .encoder()
        .audio()?;
    audio.set_rate(layout.audio_rate as i32);
    audio.set_channel_layout(ChannelLayout::STEREO);
    audio.set_channels(ChannelLayout::STEREO.channels());
    audio.set_format(Sample::I16(sample::Type::Packed));
    audio.set_time_base(audio_tb);
    if global_header {
        audio.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut audio = audio.open_as(audio_codec)?;
    audio_stream.set_time_base(audio_tb);
    audio_stream.set_parameters(&audio);

    octx.write_header()?;

    for i in 0..layout.video_frames {
        let mut picture = frame::Video::new(Pixel::YUV420P, WIDTH, HEIGHT);
        for plane in 0..3 {
            let shade = (i * 20 + plane * 40) as u8;
            picture.data_mut(plane).fill(shade);
        }
        picture.set_pts(Some(i as i64));
        video.send_frame(&picture)?;
        drain(&mut video, &mut octx, video_index, video_tb)?;
    }
    video.send_eof()?;
    drain(&mut video, &mut octx, video_index, video_tb)?;

    for n in 0..layout.audio_frames {
        let mut block = frame::Audio::new(
            Sample::I16(sample::Type::Packed),
            layout.audio_frame_samples,
            ChannelLayout::STEREO,
        );
        block.set_rate(layout.audio_rate);
        block.set_pts(Some((n * layout.audio_frame_samples) as i64));
        let data = block.data_mut(0);
        for i in 0..layout.audio_frame_samples {
            let t = (n * layout.audio_frame_samples + i) as f32 / layout.audio_rate as f32;
            let left = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
            let right = ((t * 660.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
            data[4 * i..4 * i + 2].copy_from_slice(&left.to_le_bytes());
            data[4 * i + 2..4 * i + 4].copy_from_slice(&right.to_le_bytes());
        }
        audio.send_frame(&block)?;
        drain(&mut audio, &mut octx, audio_index, audio_tb)?;
    }
    audio.send_eof()?;
    drain(&mut audio, &mut octx, audio_index, audio_tb)?;

    octx.write_trailer()?;
    Ok(path)
}
