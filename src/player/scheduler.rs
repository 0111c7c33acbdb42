use crate::core::{DecodedVideoFrame, PresentationTime};
use log::debug;
use std::thread;
use std::time::Duration;

/// 按时间戳顺序提供视频帧的数据源（调度器的游标）
pub trait FrameSource {
    /// 下一帧的时间戳；None 表示已到末尾
    fn peek_timestamp(&mut self) -> Option<PresentationTime>;

    /// 取出下一帧，游标前移
    fn take_next(&mut self) -> Option<(PresentationTime, DecodedVideoFrame)>;

    /// 剩余帧数（未知时为 None）
    fn remaining_hint(&self) -> Option<usize> {
        None
    }
}

/// 视频节拍等待（唯一的挂起点）
pub trait PacingWait {
    fn wait(&mut self, duration: Duration);
}

/// 默认实现：线程休眠
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepWait;

impl PacingWait for SleepWait {
    fn wait(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// 帧的消费者（外部渲染器的纹理上传等）
pub trait FrameSink {
    fn present(&mut self, timestamp: PresentationTime, frame: &DecodedVideoFrame);
}

/// 已呈现的帧
#[derive(Debug)]
pub struct PresentedFrame {
    pub timestamp: PresentationTime,
    pub frame: DecodedVideoFrame,
    /// 呈现前等待的时长（到期或迟到的帧为 0）
    pub waited: Duration,
}

/// 单次 tick 的结果
#[derive(Debug)]
pub enum Tick {
    Present(PresentedFrame),
    /// 下一帧还没到期（等待已达上限），游标不动，宿主应以新的时钟再次 tick
    Wait { remaining: Duration },
    EndOfStream,
}

impl Tick {
    pub fn is_end(&self) -> bool {
        matches!(self, Tick::EndOfStream)
    }
}

/// 帧调度器：由宿主渲染循环每个 tick 调用一次，自身不持有线程
pub struct FrameScheduler<W: PacingWait = SleepWait> {
    waiter: W,
    max_wait: Duration,
    presented: u64,
    late: u64,
}

impl FrameScheduler<SleepWait> {
    pub fn new() -> Self {
        Self::with_waiter(SleepWait)
    }
}

impl Default for FrameScheduler<SleepWait> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: PacingWait> FrameScheduler<W> {
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

    pub fn with_waiter(waiter: W) -> Self {
        Self {
            waiter,
            max_wait: Self::DEFAULT_MAX_WAIT,
            presented: 0,
            late: 0,
        }
    }

    /// 单次 tick 内等待的上限（超出部分留给下一次 tick）
    pub fn set_max_wait(&mut self, max_wait: Duration) {
        self.max_wait = max_wait;
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// 时间戳严格早于当前时钟的帧数
    pub fn late(&self) -> u64 {
        self.late
    }

    pub fn reset_counters(&mut self) {
        self.presented = 0;
        self.late = 0;
    }

    pub fn waiter(&self) -> &W {
        &self.waiter
    }

    /// 根据当前播放时间 `now_secs` 决定等待、呈现或结束
    pub fn tick<S: FrameSource + ?Sized>(&mut self, source: &mut S, now_secs: f64) -> Tick {
        let Some(timestamp) = source.peek_timestamp() else {
            return Tick::EndOfStream;
        };

        let due = timestamp.as_secs_f64();
        let mut waited = Duration::ZERO;
        if due > now_secs {
            let until_due = Duration::from_secs_f64(due - now_secs);
            waited = until_due.min(self.max_wait);
            self.waiter.wait(waited);
            if waited < until_due {
                return Tick::Wait {
                    remaining: until_due - waited,
                };
            }
        } else if due < now_secs {
            self.late += 1;
        }

        match source.take_next() {
            Some((timestamp, frame)) => {
                self.presented += 1;
                if self.presented % 500 == 0 {
                    debug!("🎞️ 已呈现 {} 帧，当前 {}", self.presented, timestamp);
                }
                Tick::Present(PresentedFrame {
                    timestamp,
                    frame,
                    waited,
                })
            }
            None => Tick::EndOfStream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::frame_store::TimedVideoFrameStore;

    #[derive(Default)]
    struct RecordingWait {
        waits: Vec<Duration>,
    }

    impl PacingWait for RecordingWait {
        fn wait(&mut self, duration: Duration) {
            self.waits.push(duration);
        }
    }

    fn store_with(timestamps_ms: &[i64]) -> TimedVideoFrameStore {
        let mut store = TimedVideoFrameStore::new();
        for (i, ms) in timestamps_ms.iter().enumerate() {
            store.insert(
                PresentationTime::from_millis(*ms),
                DecodedVideoFrame {
                    width: 1,
                    height: 1,
                    data: vec![i as u8, 0, 0, 0],
                },
            );
        }
        store
    }

    #[test]
    fn test_due_and_late_frames_present_immediately() {
        let mut store = store_with(&[0, 500, 1000]);
        let mut scheduler = FrameScheduler::with_waiter(RecordingWait::default());

        for (now, expected) in [(0.0, 0u8), (0.6, 1), (1.2, 2)] {
            match scheduler.tick(&mut store, now) {
                Tick::Present(p) => {
                    assert_eq!(p.frame.data[0], expected);
                    assert_eq!(p.waited, Duration::ZERO);
                }
                other => panic!("意外的 tick: {:?}", other),
            }
        }
        assert!(scheduler.tick(&mut store, 1.3).is_end());
        assert!(scheduler.waiter().waits.is_empty());
        assert_eq!(scheduler.presented(), 3);
        assert_eq!(scheduler.late(), 2);
    }

    #[test]
    fn test_future_frame_waits_until_due() {
        let mut store = store_with(&[500, 5000]);
        let mut scheduler = FrameScheduler::with_waiter(RecordingWait::default());

        match scheduler.tick(&mut store, 0.2) {
            Tick::Present(p) => {
                assert_eq!(p.timestamp.as_millis(), 500);
                assert!((p.waited.as_secs_f64() - 0.3).abs() < 1e-9);
            }
            other => panic!("意外的 tick: {:?}", other),
        }
        assert_eq!(scheduler.presented(), 1);
    }

    #[test]
    fn test_far_future_frame_is_not_presented_early() {
        let mut store = store_with(&[0, 5000]);
        let mut scheduler = FrameScheduler::with_waiter(RecordingWait::default());
        assert!(matches!(scheduler.tick(&mut store, 0.0), Tick::Present(_)));

        // 等满上限后帧仍未到期：不呈现、不前移
        match scheduler.tick(&mut store, 0.04) {
            Tick::Wait { remaining } => {
                assert!((remaining.as_secs_f64() - 3.96).abs() < 1e-6);
            }
            other => panic!("帧被提前呈现: {:?}", other),
        }
        assert_eq!(store.len(), 1);
        assert_eq!(scheduler.presented(), 1);
        assert_eq!(scheduler.waiter().waits, vec![Duration::from_secs(1)]);

        assert!(matches!(scheduler.tick(&mut store, 3.5), Tick::Wait { .. }));
        match scheduler.tick(&mut store, 4.5) {
            Tick::Present(p) => {
                assert_eq!(p.timestamp.as_millis(), 5000);
                assert!((p.waited.as_secs_f64() - 0.5).abs() < 1e-9);
            }
            other => panic!("意外的 tick: {:?}", other),
        }
        assert!(scheduler.tick(&mut store, 5.0).is_end());
    }

    #[test]
    fn test_empty_store_is_end_of_stream() {
        let mut store = TimedVideoFrameStore::new();
        let mut scheduler = FrameScheduler::with_waiter(RecordingWait::default());
        assert!(scheduler.tick(&mut store, 0.0).is_end());
        assert_eq!(scheduler.presented(), 0);
    }
}
