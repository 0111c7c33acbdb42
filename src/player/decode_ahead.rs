use crate::core::{DecodedVideoFrame, PlayerConfig, PlayerError, PresentationTime, Result, StreamKind};
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer::Demuxer;
use crate::player::demuxer_source::DemuxerSource;
use crate::player::sample_queue::AudioSampleQueue;
use crate::player::scheduler::FrameSource;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type TimedFrame = (PresentationTime, DecodedVideoFrame);

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 流式模式下保证帧时间戳严格递增
///
/// 相邻的同一时间戳帧只保留最后一帧；比已发出帧更早的帧直接丢弃。
#[derive(Default)]
pub struct FrameDeduper {
    held: Option<TimedFrame>,
    last_emitted: Option<PresentationTime>,
    collapsed: usize,
    dropped: usize,
}

impl FrameDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// 送入一帧，返回可以发出的上一帧
    pub fn push(&mut self, timestamp: PresentationTime, frame: DecodedVideoFrame) -> Option<TimedFrame> {
        if self.last_emitted.is_some_and(|last| timestamp <= last) {
            self.dropped += 1;
            return None;
        }
        match self.held.take() {
            None => {
                self.held = Some((timestamp, frame));
                None
            }
            Some((held_ts, _)) if held_ts == timestamp => {
                self.collapsed += 1;
                self.held = Some((timestamp, frame));
                None
            }
            Some(held) if held.0 > timestamp => {
                self.dropped += 1;
                self.held = Some(held);
                None
            }
            Some(held) => {
                self.last_emitted = Some(held.0);
                self.held = Some((timestamp, frame));
                Some(held)
            }
        }
    }

    /// 输入结束，取出最后持有的帧
    pub fn finish(&mut self) -> Option<TimedFrame> {
        let held = self.held.take();
        if let Some((ts, _)) = &held {
            self.last_emitted = Some(*ts);
        }
        held
    }

    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// 流式模式下的视频帧窗口（有界通道的接收端）
pub struct FrameWindow {
    rx: Receiver<TimedFrame>,
    next: Option<TimedFrame>,
    consumed: usize,
}

impl FrameWindow {
    fn new(rx: Receiver<TimedFrame>) -> Self {
        Self {
            rx,
            next: None,
            consumed: 0,
        }
    }

    /// 已缓冲（尚未取走）的帧数
    pub fn buffered(&self) -> usize {
        self.rx.len() + usize::from(self.next.is_some())
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl FrameSource for FrameWindow {
    fn peek_timestamp(&mut self) -> Option<PresentationTime> {
        if self.next.is_none() {
            // 解码落后时在这里等待；发送端断开表示已到末尾
            self.next = self.rx.recv().ok();
        }
        self.next.as_ref().map(|(ts, _)| *ts)
    }

    fn take_next(&mut self) -> Option<TimedFrame> {
        self.peek_timestamp()?;
        let next = self.next.take();
        if next.is_some() {
            self.consumed += 1;
        }
        next
    }
}

/// 有界预解码线程
///
/// 只解封装一次，同时解码两路流：视频帧写入有界通道，音频采样写入有界队列，
/// 任何一侧满了都会让线程等待（背压）。
pub struct DecodeAheadWorker {
    thread_handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    error: Arc<Mutex<Option<PlayerError>>>,
}

impl DecodeAheadWorker {
    /// 启动预解码线程，返回 (线程句柄, 视频帧窗口, 音频采样队列)
    ///
    /// `with_audio` 为 false 时不解码音频包（没有消费者时音频窗口会一直满）。
    pub fn start(
        demuxer: Demuxer,
        config: &PlayerConfig,
        with_audio: bool,
    ) -> (Self, FrameWindow, Arc<AudioSampleQueue>) {
        let (frame_tx, frame_rx) = bounded::<TimedFrame>(config.decode.video_window_frames);
        let samples = Arc::new(AudioSampleQueue::bounded(config.decode.audio_window_samples));
        let stop = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));

        let thread_handle = {
            let samples = samples.clone();
            let stop = stop.clone();
            let error = error.clone();
            let config = config.clone();
            thread::spawn(move || {
                let result =
                    Self::decode_loop(demuxer, &config, with_audio, &frame_tx, &samples, &stop);
                // 无论成败都标记结束，让音频回调区分欠载与播放结束
                samples.finish();
                if let Err(e) = result {
                    error!("{} ❌ 预解码失败: {}", log_ctx(), e);
                    *error.lock() = Some(e);
                }
            })
        };

        info!(
            "{} 🚀 预解码线程已启动（视频窗口 {} 帧，音频窗口 {} 采样）",
            log_ctx(),
            config.decode.video_window_frames,
            config.decode.audio_window_samples
        );

        (
            Self {
                thread_handle: Some(thread_handle),
                stop,
                error,
            },
            FrameWindow::new(frame_rx),
            samples,
        )
    }

    fn decode_loop(
        mut demuxer: Demuxer,
        config: &PlayerConfig,
        with_audio: bool,
        frame_tx: &Sender<TimedFrame>,
        samples: &AudioSampleQueue,
        stop: &AtomicBool,
    ) -> Result<()> {
        info!("{} 🎬 预解码线程启动: {}", log_ctx(), demuxer.description());

        // 解码器在本线程内创建和使用
        let mut video = VideoDecoder::from_source(&demuxer, config.decode.scaler)?;
        let mut audio = AudioDecoder::from_source(&demuxer, &config.audio)?;
        let mut deduper = FrameDeduper::new();
        let mut video_packets = 0usize;
        let mut audio_packets = 0usize;

        while !stop.load(Ordering::Acquire) {
            let Some(packet) = demuxer.read_packet()? else {
                break;
            };
            match packet.kind {
                StreamKind::Video => {
                    video_packets += 1;
                    for (ts, frame) in video.decode(&packet.packet)? {
                        if let Some(ready) = deduper.push(ts, frame) {
                            if !Self::send_frame(frame_tx, ready, stop) {
                                return Ok(());
                            }
                        }
                    }
                }
                StreamKind::Audio if !with_audio => {}
                StreamKind::Audio => {
                    audio_packets += 1;
                    for sample in audio.decode(&packet.packet)? {
                        if !samples.push_blocking(sample, stop) {
                            return Ok(());
                        }
                    }
                }
            }
        }

        if stop.load(Ordering::Acquire) {
            info!("{} ⏹ 预解码线程收到停止命令", log_ctx());
            return Ok(());
        }

        for (ts, frame) in video.flush()? {
            if let Some(ready) = deduper.push(ts, frame) {
                if !Self::send_frame(frame_tx, ready, stop) {
                    return Ok(());
                }
            }
        }
        if let Some(last) = deduper.finish() {
            if !Self::send_frame(frame_tx, last, stop) {
                return Ok(());
            }
        }
        if with_audio {
            for sample in audio.flush()? {
                if !samples.push_blocking(sample, stop) {
                    return Ok(());
                }
            }
        }

        info!(
            "{} 🛑 预解码完成（{} 视频包，{} 音频包，合并 {} 帧，丢弃乱序 {} 帧）",
            log_ctx(),
            video_packets,
            audio_packets,
            deduper.collapsed(),
            deduper.dropped()
        );
        Ok(())
    }

    /// 发送一帧，通道满时等待；停止或接收端关闭时返回 false
    fn send_frame(tx: &Sender<TimedFrame>, mut frame: TimedFrame, stop: &AtomicBool) -> bool {
        loop {
            match tx.send_timeout(frame, Duration::from_millis(50)) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if stop.load(Ordering::Acquire) {
                        return false;
                    }
                    frame = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    debug!("{} 帧窗口已关闭，预解码线程退出", log_ctx());
                    return false;
                }
            }
        }
    }

    /// 取出线程记录的致命错误
    pub fn take_error(&self) -> Option<PlayerError> {
        self.error.lock().take()
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// 停止线程并等待退出
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                error!("{} ❌ 预解码线程异常退出", log_ctx());
            } else {
                info!("{} ✅ 预解码线程已结束", log_ctx());
            }
        }
    }
}

impl Drop for DecodeAheadWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("{} ⚠ DecodeAheadWorker 被 drop，但可能未调用 stop()，正在尝试停止", log_ctx());
            self.stop();
        }
    }
}
