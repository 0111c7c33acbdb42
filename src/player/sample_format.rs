use crate::core::{AudioSample, PlayerError, Result};
use ffmpeg_next::format::{sample::Type, Sample};

/// 解码器输出的采样编码（数值转换依据）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl SampleEncoding {
    pub fn bytes(&self) -> usize {
        match self {
            SampleEncoding::U8 => 1,
            SampleEncoding::I16 => 2,
            SampleEncoding::I32 | SampleEncoding::F32 => 4,
            SampleEncoding::I64 | SampleEncoding::F64 => 8,
        }
    }

    /// 从 FFmpeg 采样格式映射，返回 (编码, 是否平面布局)
    pub fn from_ffmpeg(sample: Sample) -> Result<(Self, bool)> {
        let (encoding, ty) = match sample {
            Sample::U8(ty) => (SampleEncoding::U8, ty),
            Sample::I16(ty) => (SampleEncoding::I16, ty),
            Sample::I32(ty) => (SampleEncoding::I32, ty),
            Sample::I64(ty) => (SampleEncoding::I64, ty),
            Sample::F32(ty) => (SampleEncoding::F32, ty),
            Sample::F64(ty) => (SampleEncoding::F64, ty),
            Sample::None => {
                return Err(PlayerError::UnsupportedSampleFormat(format!("{:?}", sample)))
            }
        };
        Ok((encoding, ty == Type::Planar))
    }

    /// 读取一个采样并归一化到 [-1, 1]
    ///
    /// `bytes` 长度必须等于 `self.bytes()`。
    fn read(&self, bytes: &[u8]) -> f32 {
        match self {
            SampleEncoding::U8 => (bytes[0] as f32 - 128.0) / 128.0,
            SampleEncoding::I16 => i16::from_ne_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            SampleEncoding::I32 => {
                let v = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (v as f64 / 2_147_483_648.0) as f32
            }
            SampleEncoding::I64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                (i64::from_ne_bytes(raw) as f64 / 9_223_372_036_854_775_808.0) as f32
            }
            SampleEncoding::F32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            SampleEncoding::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                f64::from_ne_bytes(raw) as f32
            }
        }
    }
}

/// 一个解码后音频块的原始字节视图
pub struct RawAudioBlock<'a> {
    pub encoding: SampleEncoding,
    pub planar: bool,
    pub channels: usize,
    pub samples: usize,
    /// 平面布局时每个声道一个平面；交错布局只有一个平面
    pub planes: Vec<&'a [u8]>,
}

impl RawAudioBlock<'_> {
    fn check_layout(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(PlayerError::DecodeError("音频帧声道数为 0".to_string()));
        }
        let bps = self.encoding.bytes();
        let (planes_needed, plane_len) = if self.planar {
            (self.channels, self.samples * bps)
        } else {
            (1, self.samples * self.channels * bps)
        };
        if self.planes.len() < planes_needed {
            return Err(PlayerError::DecodeError(format!(
                "音频平面数不足: 需要 {}, 实际 {}",
                planes_needed,
                self.planes.len()
            )));
        }
        if let Some(short) = self.planes[..planes_needed].iter().find(|p| p.len() < plane_len) {
            return Err(PlayerError::DecodeError(format!(
                "音频平面长度不足: 需要 {} 字节, 实际 {}",
                plane_len,
                short.len()
            )));
        }
        Ok(())
    }

    fn sample_at(&self, index: usize, channel: usize) -> f32 {
        let bps = self.encoding.bytes();
        let (plane, offset) = if self.planar {
            (self.planes[channel], index * bps)
        } else {
            (self.planes[0], (index * self.channels + channel) * bps)
        };
        self.encoding.read(&plane[offset..offset + bps])
    }
}

/// 把一个音频块转换为立体声 f32 采样对并追加到 `out`
///
/// 单声道复制到左右两路，多于两个声道时只取前两个。每个采样对使用源帧的时间戳。
/// 返回追加的采样对数量（等于块的采样数）。
pub fn interleave_stereo(
    block: &RawAudioBlock<'_>,
    timestamp: f64,
    out: &mut Vec<AudioSample>,
) -> Result<usize> {
    block.check_layout()?;
    out.reserve(block.samples);

    let right_channel = if block.channels >= 2 { 1 } else { 0 };
    for i in 0..block.samples {
        let left = block.sample_at(i, 0);
        let right = block.sample_at(i, right_channel);
        out.push(AudioSample::new(left, right, timestamp));
    }
    Ok(block.samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    fn i16_bytes(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn test_f32_planar_bit_exact() {
        let left = f32_bytes(&[0.25, -0.5, 1.0]);
        let right = f32_bytes(&[-0.25, 0.5, -1.0]);
        let block = RawAudioBlock {
            encoding: SampleEncoding::F32,
            planar: true,
            channels: 2,
            samples: 3,
            planes: vec![&left, &right],
        };
        let mut out = Vec::new();
        assert_eq!(interleave_stereo(&block, 1.5, &mut out).unwrap(), 3);
        assert_eq!(out[0], AudioSample::new(0.25, -0.25, 1.5));
        assert_eq!(out[1], AudioSample::new(-0.5, 0.5, 1.5));
        assert_eq!(out[2], AudioSample::new(1.0, -1.0, 1.5));
    }

    #[test]
    fn test_i16_packed_normalized() {
        let data = i16_bytes(&[16384, -16384, i16::MIN, 0]);
        let block = RawAudioBlock {
            encoding: SampleEncoding::I16,
            planar: false,
            channels: 2,
            samples: 2,
            planes: vec![&data],
        };
        let mut out = Vec::new();
        interleave_stereo(&block, 0.0, &mut out).unwrap();
        assert_eq!(out[0].left, 0.5);
        assert_eq!(out[0].right, -0.5);
        assert_eq!(out[1].left, -1.0);
        assert_eq!(out[1].right, 0.0);
    }

    #[test]
    fn test_u8_mono_duplicated() {
        let data = vec![128u8, 192, 0];
        let block = RawAudioBlock {
            encoding: SampleEncoding::U8,
            planar: false,
            channels: 1,
            samples: 3,
            planes: vec![&data],
        };
        let mut out = Vec::new();
        interleave_stereo(&block, 0.0, &mut out).unwrap();
        let pairs: Vec<(f32, f32)> = out.iter().map(|s| (s.left, s.right)).collect();
        assert_eq!(pairs, vec![(0.0, 0.0), (0.5, 0.5), (-1.0, -1.0)]);
    }

    #[test]
    fn test_surround_keeps_front_pair() {
        // 6 声道交错：每帧 [L, R, C, LFE, SL, SR]
        let data = f32_bytes(&[0.1, 0.2, 0.9, 0.9, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9, 0.9, 0.9]);
        let block = RawAudioBlock {
            encoding: SampleEncoding::F32,
            planar: false,
            channels: 6,
            samples: 2,
            planes: vec![&data],
        };
        let mut out = Vec::new();
        interleave_stereo(&block, 0.0, &mut out).unwrap();
        assert_eq!((out[0].left, out[0].right), (0.1, 0.2));
        assert_eq!((out[1].left, out[1].right), (0.3, 0.4));
    }

    #[test]
    fn test_sample_count_matches_nb_samples() {
        // 多个块依次追加，总数等于各块采样数之和
        let mut out = Vec::new();
        let mut expected = 0;
        for samples in [1024usize, 1024, 576] {
            let left = vec![0u8; samples * 4];
            let right = vec![0u8; samples * 4];
            let block = RawAudioBlock {
                encoding: SampleEncoding::F32,
                planar: true,
                channels: 2,
                samples,
                planes: vec![&left, &right],
            };
            interleave_stereo(&block, 0.0, &mut out).unwrap();
            expected += samples;
        }
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn test_short_plane_is_error() {
        let left = f32_bytes(&[0.0, 0.0]);
        let right = f32_bytes(&[0.0]);
        let block = RawAudioBlock {
            encoding: SampleEncoding::F32,
            planar: true,
            channels: 2,
            samples: 2,
            planes: vec![&left, &right],
        };
        let mut out = Vec::new();
        assert!(matches!(
            interleave_stereo(&block, 0.0, &mut out),
            Err(PlayerError::DecodeError(_))
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_format_mapping() {
        assert_eq!(
            SampleEncoding::from_ffmpeg(Sample::F32(Type::Planar)).unwrap(),
            (SampleEncoding::F32, true)
        );
        assert_eq!(
            SampleEncoding::from_ffmpeg(Sample::I16(Type::Packed)).unwrap(),
            (SampleEncoding::I16, false)
        );
        assert!(matches!(
            SampleEncoding::from_ffmpeg(Sample::None),
            Err(PlayerError::UnsupportedSampleFormat(_))
        ));
    }
}
