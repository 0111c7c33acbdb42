use crate::core::AudioSample;
use crossbeam::queue::ArrayQueue;
use crossbeam::utils::Backoff;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// 音频采样 FIFO
///
/// 生产者是解码管线，消费者是实时音频回调。存储是预分配的无锁环形队列，
/// 回调线程上的 pop 既不加锁也不分配/释放内存。
pub struct AudioSampleQueue {
    queue: ArrayQueue<AudioSample>,
    finished: AtomicBool,
}

impl AudioSampleQueue {
    /// 有界预解码窗口：满时生产者等待
    pub fn bounded(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            finished: AtomicBool::new(false),
        }
    }

    /// 从已解码的全部采样构造（容量正好等于采样数，已完成生产）
    pub fn from_samples(samples: impl IntoIterator<Item = AudioSample>) -> Self {
        let samples: Vec<AudioSample> = samples.into_iter().collect();
        let queue = Self::bounded(samples.len());
        for sample in samples {
            // 容量与采样数相同，不会满
            let _ = queue.push(sample);
        }
        queue.finish();
        queue
    }

    /// 追加一个采样；队列已满时原样返回
    pub fn push(&self, sample: AudioSample) -> Result<(), AudioSample> {
        self.queue.push(sample)
    }

    /// 追加一个采样，队列满时等待消费者腾出空间
    ///
    /// `stop` 被置位时放弃并返回 false。
    pub fn push_blocking(&self, mut sample: AudioSample, stop: &AtomicBool) -> bool {
        let backoff = Backoff::new();
        loop {
            match self.push(sample) {
                Ok(()) => return true,
                Err(rejected) => {
                    if stop.load(Ordering::Acquire) {
                        return false;
                    }
                    sample = rejected;
                    if backoff.is_completed() {
                        thread::sleep(Duration::from_millis(2));
                    } else {
                        backoff.snooze();
                    }
                }
            }
        }
    }

    pub fn pop(&self) -> Option<AudioSample> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// 标记生产结束（之后的空队列表示播放结束而不是欠载）
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// 生产结束且已全部消费
    pub fn is_drained(&self) -> bool {
        self.is_finished() && self.is_empty()
    }
}
