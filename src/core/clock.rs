use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 播放时钟 - 开始播放时归零，之后单调递增
///
/// 调度器本身不读取时钟，由宿主循环每个 tick 取 `now_secs()` 传入。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    started_at: Option<Instant>, // None 表示尚未开始
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner { started_at: None })),
        }
    }

    /// 开始计时（每个播放会话调用一次，重置为 0）
    pub fn start(&self) {
        self.start_at(Instant::now());
    }

    pub(crate) fn start_at(&self, instant: Instant) {
        self.inner.lock().started_at = Some(instant);
    }

    /// 回到未开始状态
    pub fn reset(&self) {
        self.inner.lock().started_at = None;
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().started_at.is_some()
    }

    /// 当前播放时间（秒，截断到毫秒）；未开始时为 0
    pub fn now_secs(&self) -> f64 {
        let inner = self.inner.lock();
        match inner.started_at {
            Some(start) => start.elapsed().as_millis() as f64 / 1000.0,
            None => 0.0,
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clock_not_started_is_zero() {
        let clock = PlaybackClock::new();
        assert!(!clock.is_started());
        assert_eq!(clock.now_secs(), 0.0);
    }

    #[test]
    fn test_clock_monotonic_after_start() {
        let clock = PlaybackClock::new();
        if let Some(earlier) = Instant::now().checked_sub(Duration::from_millis(1500)) {
            clock.start_at(earlier);
            let a = clock.now_secs();
            let b = clock.now_secs();
            assert!(a >= 1.5);
            assert!(b >= a);
        }

        clock.start();
        assert!(clock.now_secs() < 1.0);

        clock.reset();
        assert_eq!(clock.now_secs(), 0.0);
    }
}
