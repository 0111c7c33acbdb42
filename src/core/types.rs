use serde::{Deserialize, Serialize};
use std::fmt;

/// 流类型（只关心视频与音频）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

/// 时间基：每个 tick 对应 num/den 秒
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 把流内时间戳换算为秒
    pub fn seconds(&self, pts: i64) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        pts as f64 * self.num as f64 / self.den as f64
    }
}

impl From<ffmpeg_next::Rational> for TimeBase {
    fn from(r: ffmpeg_next::Rational) -> Self {
        Self::new(r.numerator(), r.denominator())
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// 归一化的显示时间戳（毫秒精度，即秒数保留 3 位小数）
///
/// 帧存储以它为键，整数毫秒保证排序与去重是确定的。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PresentationTime(i64);

impl PresentationTime {
    pub const ZERO: PresentationTime = PresentationTime(0);

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// round(pts * num / den, 3 位小数)
    pub fn from_pts(pts: i64, time_base: TimeBase) -> Self {
        Self((time_base.seconds(pts) * 1000.0).round() as i64)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1000.0).round() as i64)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for PresentationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// 流描述信息（从容器中推导，创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: String,
    /// 像素格式或采样格式的名称（仅用于诊断）
    pub format: String,
    pub time_base: TimeBase,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// 转换后的视频帧：固定 4 字节/像素的 RGB0 布局，宽高与解码尺寸一致
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedVideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl DecodedVideoFrame {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn stride(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }
}

impl fmt::Debug for DecodedVideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedVideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// 一对立体声采样
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSample {
    pub left: f32,
    pub right: f32,
    /// 所属源帧的时间戳（秒），只用于诊断，不参与排序
    pub timestamp: f64,
}

impl AudioSample {
    pub const SILENCE: AudioSample = AudioSample {
        left: 0.0,
        right: 0.0,
        timestamp: 0.0,
    };

    pub fn new(left: f32, right: f32, timestamp: f64) -> Self {
        Self {
            left,
            right,
            timestamp,
        }
    }
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Ended,
    Error,
}

/// 媒体信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub path: String,
    pub video: StreamDescriptor,
    pub audio: StreamDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presentation_time_rounding() {
        // 1/90000 时间基
        let tb = TimeBase::new(1, 90000);
        assert_eq!(PresentationTime::from_pts(45000, tb).as_millis(), 500);
        assert_eq!(PresentationTime::from_pts(3003, tb).as_millis(), 33);
        assert_eq!(PresentationTime::from_pts(6006, tb).as_millis(), 67);

        let tb = TimeBase::new(1001, 30000);
        assert_eq!(PresentationTime::from_pts(1, tb).as_millis(), 33);
        assert_eq!(PresentationTime::from_pts(30, tb).as_millis(), 1001);
    }

    #[test]
    fn test_time_base_zero_den() {
        assert_eq!(TimeBase::new(1, 0).seconds(100), 0.0);
    }
}
