use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use karaoke_player::core::{DecodeMode, DecodedVideoFrame, PlaybackState, PlayerConfig, PresentationTime};
use karaoke_player::player::{Demuxer, FrameSink, PlaybackController};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Batch,
    Streaming,
}

impl From<ModeArg> for DecodeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Batch => DecodeMode::Batch,
            ModeArg::Streaming => DecodeMode::Streaming,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "卡拉OK 播放核心（无界面）")]
struct Args {
    /// 媒体文件路径
    path: PathBuf,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 解码模式（覆盖配置文件）
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// 日志级别 (error/warn/info/debug/trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 不打开音频输出
    #[arg(long)]
    no_audio: bool,

    /// 只打印流信息后退出
    #[arg(long)]
    probe: bool,
}

/// 不上传纹理，只统计并定期打印呈现的帧
#[derive(Default)]
struct LoggingSink {
    frames: u64,
    bytes: u64,
    last: Option<PresentationTime>,
}

impl FrameSink for LoggingSink {
    fn present(&mut self, timestamp: PresentationTime, frame: &DecodedVideoFrame) {
        self.frames += 1;
        self.bytes += frame.data.len() as u64;
        self.last = Some(timestamp);
        if self.frames % 250 == 0 {
            info!("🖼️ 第 {} 帧 @ {} ({}x{})", self.frames, timestamp, frame.width, frame.height);
        } else {
            debug!("帧 @ {}", timestamp);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志（RUST_LOG 优先）
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.as_str())).init();

    info!("🎤 Karaoke Player 启动");

    karaoke_player::init().map_err(|e| anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    let mut config = match &args.config {
        Some(path) => PlayerConfig::from_file(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.decode.mode = mode.into();
    }
    config.validate()?;

    if args.probe {
        let demuxer = Demuxer::open(&args.path)?;
        println!("{}", serde_json::to_string_pretty(&demuxer.media_info())?);
        return Ok(());
    }

    let mut controller = PlaybackController::new(config).with_audio(!args.no_audio);

    let load_started = Instant::now();
    let media = controller.load(&args.path)?;
    info!(
        "📀 已加载 {} ({}x{} {}, {} Hz {}), 用时 {:?}",
        media.path,
        media.video.width,
        media.video.height,
        media.video.codec,
        media.audio.sample_rate,
        media.audio.codec,
        load_started.elapsed()
    );

    controller.start()?;

    let mut sink = LoggingSink::default();
    while controller.present_next(&mut sink) {}

    // 视频结束后让剩余音频播完
    if !args.no_audio && controller.state() == PlaybackState::Ended {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !controller.audio_drained() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
    }

    let stats = controller.audio_stats();
    info!(
        "📊 呈现 {} 帧 ({:.1} MB, 最后 {}), 音频 {} 帧, 欠载 {} 次",
        sink.frames,
        sink.bytes as f64 / (1024.0 * 1024.0),
        sink.last.unwrap_or(PresentationTime::ZERO),
        stats.delivered_frames,
        stats.underrun_events
    );

    let worker_error = controller.take_worker_error();
    controller.stop();

    if let Some(err) = worker_error {
        warn!("⚠ 播放因解码错误提前结束");
        return Err(err.into());
    }

    info!("👋 播放结束");
    Ok(())
}
