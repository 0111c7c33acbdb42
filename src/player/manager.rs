use crate::core::{
    AudioSample, DecodeMode, MediaInfo, PlaybackClock, PlaybackState, PlayerConfig, PlayerError, Result,
};
use crate::player::audio_output::{AudioOutput, AudioStats, AudioStatsSnapshot};
use crate::player::decode_ahead::DecodeAheadWorker;
use crate::player::demuxer::Demuxer;
use crate::player::pipeline;
use crate::player::sample_queue::AudioSampleQueue;
use crate::player::scheduler::{FrameScheduler, FrameSink, FrameSource, PacingWait, SleepWait, Tick};
use log::{error, info, warn};
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 一次播放会话的已解码状态
///
/// 同一时间只有一个会话对调度器和音频输出可见；加载新文件时整体替换。
pub struct PlaybackSession {
    media: MediaInfo,
    frames: Box<dyn FrameSource + Send>,
    samples: Arc<AudioSampleQueue>,
}

impl PlaybackSession {
    pub fn new(media: MediaInfo, frames: Box<dyn FrameSource + Send>, samples: Arc<AudioSampleQueue>) -> Self {
        Self { media, frames, samples }
    }

    /// 完整预解码得到的会话
    pub fn from_batch(
        media: MediaInfo,
        frames: impl FrameSource + Send + 'static,
        samples: AudioSampleQueue,
    ) -> Self {
        Self::new(media, Box::new(frames), Arc::new(samples))
    }

    pub fn media(&self) -> &MediaInfo {
        &self.media
    }

    pub fn samples(&self) -> &Arc<AudioSampleQueue> {
        &self.samples
    }
}

/// 播放控制器 - 负责会话的加载、开始、逐帧推进和停止
pub struct PlaybackController<W: PacingWait = SleepWait> {
    config: PlayerConfig,
    state: PlaybackState,
    clock: PlaybackClock,
    scheduler: FrameScheduler<W>,
    session: Option<PlaybackSession>,
    audio_enabled: bool,
    audio_output: Option<AudioOutput>,
    stats: Arc<AudioStats>,
    worker: Option<DecodeAheadWorker>,
    worker_error: Option<PlayerError>,
}

impl PlaybackController<SleepWait> {
    pub fn new(config: PlayerConfig) -> Self {
        Self::with_waiter(config, SleepWait)
    }
}

impl<W: PacingWait> PlaybackController<W> {
    pub fn with_waiter(config: PlayerConfig, waiter: W) -> Self {
        info!("{} 🎮 创建播放控制器 (模式 {:?})", log_ctx(), config.decode.mode);
        Self {
            config,
            state: PlaybackState::Idle,
            clock: PlaybackClock::new(),
            scheduler: FrameScheduler::with_waiter(waiter),
            session: None,
            audio_enabled: true,
            audio_output: None,
            stats: Arc::new(AudioStats::default()),
            worker: None,
            worker_error: None,
        }
    }

    /// 是否打开音频输出（关闭时也不解码音频）
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &FrameScheduler<W> {
        &self.scheduler
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.session.as_ref().map(|s| s.media())
    }

    pub fn audio_stats(&self) -> AudioStatsSnapshot {
        self.stats.snapshot()
    }

    /// 加载媒体文件，成功后进入 Ready
    ///
    /// 先停止上一个会话（包括音频流）。任何打开或解码错误都会让控制器停在 Error，
    /// 已解码的部分数据随之丢弃。
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<MediaInfo> {
        self.stop();
        self.discard_previous_error();
        self.state = PlaybackState::Loading;
        let path = path.as_ref();
        info!("{} 📂 加载: {} ({:?})", log_ctx(), path.display(), self.config.decode.mode);

        let loaded = match self.config.decode.mode {
            DecodeMode::Batch => self.load_batch(path),
            DecodeMode::Streaming => self.load_streaming(path),
        };

        match loaded {
            Ok(session) => {
                let media = session.media().clone();
                self.session = Some(session);
                self.state = PlaybackState::Ready;
                info!("{} ✅ 会话就绪: {}", log_ctx(), media.path);
                Ok(media)
            }
            Err(e) => {
                error!("{} ❌ 加载失败: {}", log_ctx(), e);
                if let Some(mut worker) = self.worker.take() {
                    worker.stop();
                }
                self.state = PlaybackState::Error;
                Err(e)
            }
        }
    }

    fn load_batch(&mut self, path: &Path) -> Result<PlaybackSession> {
        // 视频和音频各自独立打开一次，分别完整解码
        let mut video_source = Demuxer::open(path)?;
        let media = video_source.media_info();
        let frames = pipeline::decode_video(&mut video_source, &self.config.decode)?;
        drop(video_source);

        let samples = if self.audio_enabled {
            let mut audio_source = Demuxer::open(path)?;
            pipeline::decode_audio(&mut audio_source, &self.config.audio)?
        } else {
            AudioSampleQueue::from_samples(std::iter::empty::<AudioSample>())
        };

        Ok(PlaybackSession::from_batch(media, frames, samples))
    }

    fn load_streaming(&mut self, path: &Path) -> Result<PlaybackSession> {
        let demuxer = Demuxer::open(path)?;
        let media = demuxer.media_info();
        let (worker, window, samples) = DecodeAheadWorker::start(demuxer, &self.config, self.audio_enabled);
        self.worker = Some(worker);
        Ok(PlaybackSession::new(media, Box::new(window), samples))
    }

    /// 直接挂载一个已准备好的会话（自定义帧源）
    pub fn attach_session(&mut self, session: PlaybackSession) {
        self.stop();
        self.discard_previous_error();
        info!("{} 📎 挂载会话: {}", log_ctx(), session.media().path);
        self.session = Some(session);
        self.state = PlaybackState::Ready;
    }

    /// 开始播放：打开音频输出并把时钟归零
    pub fn start(&mut self) -> Result<()> {
        if self.state != PlaybackState::Ready {
            return Err(PlayerError::StateError(format!(
                "只能在 Ready 状态开始播放，当前为 {:?}",
                self.state
            )));
        }
        let Some(session) = self.session.as_ref() else {
            return Err(PlayerError::StateError("没有已加载的会话".to_string()));
        };

        self.stats.reset();
        self.scheduler.reset_counters();

        if self.audio_enabled {
            match AudioOutput::initialize(&self.config.audio, session.samples.clone(), self.stats.clone()) {
                Ok(output) => self.audio_output = Some(output),
                Err(e) => {
                    error!("{} ❌ 音频输出启动失败: {}", log_ctx(), e);
                    self.state = PlaybackState::Error;
                    return Err(e);
                }
            }
        } else {
            info!("{} 🔇 音频输出已禁用", log_ctx());
        }

        self.clock.start();
        self.state = PlaybackState::Playing;
        info!("{} ▶️ 开始播放", log_ctx());
        Ok(())
    }

    /// 以给定的播放时间推进一次
    pub fn tick(&mut self, now_secs: f64) -> Tick {
        if self.state != PlaybackState::Playing {
            return Tick::EndOfStream;
        }
        let Some(session) = self.session.as_mut() else {
            return Tick::EndOfStream;
        };

        let tick = self.scheduler.tick(session.frames.as_mut(), now_secs);
        if tick.is_end() {
            self.finish_playback();
        }
        tick
    }

    /// 以控制器自己的时钟推进一次
    pub fn tick_clock(&mut self) -> Tick {
        let now = self.clock.now_secs();
        self.tick(now)
    }

    /// 推进一次并把帧交给 sink；到达末尾时返回 false
    pub fn present_next(&mut self, sink: &mut dyn FrameSink) -> bool {
        match self.tick_clock() {
            Tick::Present(presented) => {
                sink.present(presented.timestamp, &presented.frame);
                true
            }
            Tick::Wait { .. } => true,
            Tick::EndOfStream => false,
        }
    }

    fn finish_playback(&mut self) {
        if let Some(err) = self.worker.as_ref().and_then(|w| w.take_error()) {
            error!("{} ❌ 预解码中止，播放提前结束: {}", log_ctx(), err);
            self.worker_error = Some(err);
            self.state = PlaybackState::Error;
        } else {
            self.state = PlaybackState::Ended;
        }

        let stats = self.stats.snapshot();
        info!(
            "{} 🏁 视频结束: 呈现 {} 帧 (迟到 {}), 音频回调 {} 次, 欠载 {} 次 / {} 帧",
            log_ctx(),
            self.scheduler.presented(),
            self.scheduler.late(),
            stats.callbacks,
            stats.underrun_events,
            stats.missing_frames
        );
    }

    /// 音频是否已经全部播放
    pub fn audio_drained(&self) -> bool {
        self.session.as_ref().map_or(true, |s| s.samples.is_drained())
    }

    /// 取出预解码线程的致命错误（streaming 模式）
    pub fn take_worker_error(&mut self) -> Option<PlayerError> {
        self.worker_error
            .take()
            .or_else(|| self.worker.as_ref().and_then(|w| w.take_error()))
    }

    /// 上一个会话未取走的预解码错误不带入新会话
    fn discard_previous_error(&mut self) {
        if let Some(err) = self.worker_error.take() {
            warn!("{} ⚠ 丢弃上一会话未处理的预解码错误: {}", log_ctx(), err);
        }
    }

    /// 停止播放并释放会话：先停音频流，再停预解码线程
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Idle && self.session.is_none() {
            return;
        }
        if let Some(mut output) = self.audio_output.take() {
            output.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            if let Some(err) = worker.take_error() {
                warn!("{} ⚠ 停止时发现预解码错误: {}", log_ctx(), err);
                self.worker_error.get_or_insert(err);
            }
            worker.stop();
        }
        self.session = None;
        self.clock.reset();
        self.state = PlaybackState::Idle;
        info!("{} ⏹ 播放已停止", log_ctx());
    }
}

impl<W: PacingWait> Drop for PlaybackController<W> {
    fn drop(&mut self) {
        self.stop();
    }
}
