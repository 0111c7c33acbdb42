use crate::core::{Result, StreamDescriptor, StreamKind};
use ffmpeg_next as ffmpeg;
use ffmpeg::Packet;

/// 压缩数据包（解封装器产出，交给解码器后释放）
pub struct CompressedPacket {
    pub packet: Packet,
    pub kind: StreamKind,
    pub stream_index: usize,
}

impl CompressedPacket {
    /// 显示时间戳（流时间基单位）
    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }
}

/// Demuxer 数据源抽象接口
///
/// 解码管线只通过这个 trait 读取数据包和流参数。
pub trait DemuxerSource: Send {
    /// 读取下一个属于已选视频流或音频流的包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<CompressedPacket>>;

    /// 已选流的描述信息
    fn descriptor(&self, kind: StreamKind) -> &StreamDescriptor;

    /// 已选流的编解码参数（用于创建解码器）
    fn parameters(&self, kind: StreamKind) -> Result<ffmpeg::codec::Parameters>;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;

    /// 读取指定流的下一个包，其他流的包直接丢弃（不缓存）
    fn next_packet(&mut self, kind: StreamKind) -> Result<Option<CompressedPacket>> {
        loop {
            match self.read_packet()? {
                Some(packet) if packet.kind == kind => return Ok(Some(packet)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}
