use crate::core::{DecodedVideoFrame, PresentationTime};
use crate::player::scheduler::FrameSource;
use std::collections::btree_map::{self, BTreeMap};

/// 按显示时间戳排序的视频帧存储
///
/// 相同时间戳只保留最后写入的帧。播放前一次性填满，播放时游标只向前移动，
/// 已呈现的帧随即释放。
#[derive(Default)]
pub struct TimedVideoFrameStore {
    frames: BTreeMap<PresentationTime, DecodedVideoFrame>,
    collapsed: usize,
    consumed: usize,
}

impl TimedVideoFrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一帧，返回是否覆盖了同一时间戳上的旧帧
    pub fn insert(&mut self, timestamp: PresentationTime, frame: DecodedVideoFrame) -> bool {
        let replaced = self.frames.insert(timestamp, frame).is_some();
        if replaced {
            self.collapsed += 1;
        }
        replaced
    }

    /// 剩余（未呈现）帧数
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 因时间戳重复而被覆盖的帧数
    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    /// 已被游标取走的帧数
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// 按时间戳递增顺序只读遍历剩余帧
    pub fn iter(&self) -> btree_map::Iter<'_, PresentationTime, DecodedVideoFrame> {
        self.frames.iter()
    }

    pub fn timestamps(&self) -> Vec<PresentationTime> {
        self.frames.keys().copied().collect()
    }

    pub fn first_timestamp(&self) -> Option<PresentationTime> {
        self.frames.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<PresentationTime> {
        self.frames.keys().next_back().copied()
    }

    /// 剩余帧占用的像素字节数
    pub fn byte_size(&self) -> usize {
        self.frames.values().map(|f| f.data.len()).sum()
    }
}

impl FrameSource for TimedVideoFrameStore {
    fn peek_timestamp(&mut self) -> Option<PresentationTime> {
        self.first_timestamp()
    }

    fn take_next(&mut self) -> Option<(PresentationTime, DecodedVideoFrame)> {
        let next = self.frames.pop_first();
        if next.is_some() {
            self.consumed += 1;
        }
        next
    }

    fn remaining_hint(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimeBase;

    fn frame(tag: u8) -> DecodedVideoFrame {
        DecodedVideoFrame {
            width: 1,
            height: 1,
            data: vec![tag, 0, 0, 0],
        }
    }

    #[test]
    fn test_keys_strictly_increasing_and_non_negative() {
        let tb = TimeBase::new(1, 90000);
        let mut store = TimedVideoFrameStore::new();
        // 模拟 B 帧重排序后的乱序插入
        for pts in [0i64, 9009, 3003, 6006, 15015, 12012] {
            store.insert(PresentationTime::from_pts(pts, tb), frame(0));
        }
        let keys = store.timestamps();
        assert_eq!(keys.len(), 6);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| !k.is_negative()));
    }

    #[test]
    fn test_duplicate_timestamps_last_write_wins() {
        // 1/100000 时间基：10 和 20 tick 都四舍五入到 0ms
        let tb = TimeBase::new(1, 100000);
        let mut store = TimedVideoFrameStore::new();
        assert!(!store.insert(PresentationTime::from_pts(10, tb), frame(1)));
        assert!(store.insert(PresentationTime::from_pts(20, tb), frame(2)));
        assert!(!store.insert(PresentationTime::from_pts(100000, tb), frame(3)));

        assert_eq!(store.len(), 2);
        assert_eq!(store.collapsed(), 1);
        let (ts, kept) = store.iter().next().unwrap();
        assert_eq!(ts.as_millis(), 0);
        assert_eq!(kept.data[0], 2);
    }

    #[test]
    fn test_cursor_moves_forward_and_releases() {
        let mut store = TimedVideoFrameStore::new();
        store.insert(PresentationTime::from_millis(1000), frame(3));
        store.insert(PresentationTime::from_millis(0), frame(1));
        store.insert(PresentationTime::from_millis(500), frame(2));

        assert_eq!(store.peek_timestamp(), Some(PresentationTime::from_millis(0)));
        let order: Vec<u8> = std::iter::from_fn(|| store.take_next())
            .map(|(_, f)| f.data[0])
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(store.is_empty());
        assert_eq!(store.consumed(), 3);
        assert_eq!(store.peek_timestamp(), None);
    }
}
