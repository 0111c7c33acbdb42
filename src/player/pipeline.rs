use crate::core::{AudioConfig, DecodeConfig, Result, StreamKind};
use crate::player::decoder::{AudioDecoder, VideoDecoder};
use crate::player::demuxer_source::DemuxerSource;
use crate::player::frame_store::TimedVideoFrameStore;
use crate::player::sample_queue::AudioSampleQueue;
use log::{debug, info};
use std::time::Instant;

/// 完整解码视频流，得到按时间戳排序的帧存储
///
/// 任何致命解码错误都会中止整个过程，已解码的部分随之丢弃。
pub fn decode_video<S: DemuxerSource + ?Sized>(
    source: &mut S,
    config: &DecodeConfig,
) -> Result<TimedVideoFrameStore> {
    let started = Instant::now();
    let mut decoder = VideoDecoder::from_source(source, config.scaler)?;
    let mut store = TimedVideoFrameStore::new();
    let mut packet_count = 0usize;

    while let Some(packet) = source.next_packet(StreamKind::Video)? {
        packet_count += 1;
        for (timestamp, frame) in decoder.decode(&packet.packet)? {
            store.insert(timestamp, frame);
        }
        if packet_count % 500 == 0 {
            debug!("📦 视频包 #{}，已存储 {} 帧", packet_count, store.len());
        }
    }

    for (timestamp, frame) in decoder.flush()? {
        store.insert(timestamp, frame);
    }

    info!(
        "✅ 视频解码完成: {} 个包 → {} 帧 (合并重复时间戳 {} 帧, {:.1} MB), 用时 {:?}",
        packet_count,
        store.len(),
        store.collapsed(),
        store.byte_size() as f64 / (1024.0 * 1024.0),
        started.elapsed()
    );
    if let (Some(first), Some(last)) = (store.first_timestamp(), store.last_timestamp()) {
        debug!("视频时间范围: {} ~ {}", first, last);
    }

    Ok(store)
}

/// 完整解码音频流，得到严格按解码顺序排列的采样队列
pub fn decode_audio<S: DemuxerSource + ?Sized>(
    source: &mut S,
    config: &AudioConfig,
) -> Result<AudioSampleQueue> {
    let started = Instant::now();
    let mut decoder = AudioDecoder::from_source(source, config)?;
    let mut samples = Vec::new();
    let mut packet_count = 0usize;

    while let Some(packet) = source.next_packet(StreamKind::Audio)? {
        packet_count += 1;
        samples.extend(decoder.decode(&packet.packet)?);
    }
    samples.extend(decoder.flush()?);

    // 回调线程只从预分配的队列中弹出
    let queue = AudioSampleQueue::from_samples(samples);

    info!(
        "✅ 音频解码完成: {} 个包 → {} 个采样对 ({:.2} 秒 @ {} Hz), 用时 {:?}",
        packet_count,
        queue.len(),
        queue.len() as f64 / config.sample_rate as f64,
        config.sample_rate,
        started.elapsed()
    );

    Ok(queue)
}
