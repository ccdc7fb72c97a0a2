//! 合成解码线程.
//!
//! 每条轨道一个线程: 先按读包速率把合成数据包放入包队列,
//! 再在缓冲区有空位时把包"解码"为块, 通过 rent -> fill -> add 交给缓冲区.
//! 视频关键帧同时写入跳转索引.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use liu_block::{AudioBlock, BlockBuffer, BlockTiming, SubtitleBlock, SubtitleFormat, VideoBlock};
use liu_core::{LiuResult, MediaType, Rational, TICKS_PER_SECOND, Ticks, ticks};
use liu_seek::{KeyframeDescriptor, SeekIndex};

use crate::clock::WallClock;

/// 合成轨道描述
#[derive(Debug, Clone, Copy)]
pub enum TrackSpec {
    /// 视频: 帧率, 宽高, 关键帧间隔 (帧)
    Video {
        fps: u32,
        width: u32,
        height: u32,
        gop: u32,
    },
    /// 音频: 采样率, 声道数, 每块采样数
    Audio {
        sample_rate: u32,
        channels: u32,
        samples_per_block: u32,
    },
    /// 字幕: 出现间隔
    Subtitle { interval: Ticks },
}

impl TrackSpec {
    /// 轨道媒体类型
    pub fn media_type(&self) -> MediaType {
        match self {
            Self::Video { .. } => MediaType::Video,
            Self::Audio { .. } => MediaType::Audio,
            Self::Subtitle { .. } => MediaType::Subtitle,
        }
    }

    /// 第 n 个包覆盖的时间区间 (开始, 时长)
    fn packet_span(&self, n: u64) -> (Ticks, Ticks) {
        match *self {
            Self::Video { fps, .. } => {
                let tb = Rational::new(1, fps.max(1) as i32);
                let start = ticks::from_timestamp(n as i64, tb).unwrap_or(0);
                let end = ticks::from_timestamp(n as i64 + 1, tb).unwrap_or(start);
                (start, end - start)
            }
            Self::Audio {
                sample_rate,
                samples_per_block,
                ..
            } => {
                let tb = Rational::new(1, sample_rate.max(1) as i32);
                let first = n as i64 * i64::from(samples_per_block);
                let start = ticks::from_timestamp(first, tb).unwrap_or(0);
                let end =
                    ticks::from_timestamp(first + i64::from(samples_per_block), tb).unwrap_or(start);
                (start, end - start)
            }
            Self::Subtitle { interval } => (n as i64 * interval, interval * 3 / 4),
        }
    }
}

/// 合成数据包
#[derive(Debug, Clone, Copy)]
struct Packet {
    number: u64,
    start_time: Ticks,
    duration: Ticks,
    size: u64,
    is_keyframe: bool,
}

/// 各轨道共享的包队列统计
#[derive(Debug, Default)]
pub struct PacketQueue {
    length: AtomicU64,
    count: AtomicU64,
    readers: AtomicUsize,
}

impl PacketQueue {
    /// 队列字节数
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    /// 队列包数
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// 是否还有轨道在读包
    pub fn can_read_more(&self) -> bool {
        self.readers.load(Ordering::Acquire) > 0
    }

    fn push(&self, packet: &Packet) {
        self.length.fetch_add(packet.size, Ordering::AcqRel);
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn pop(&self, packet: &Packet) {
        self.length.fetch_sub(packet.size, Ordering::AcqRel);
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// 解码线程参数
pub struct ProducerContext {
    pub clock: WallClock,
    pub queue: Arc<PacketQueue>,
    pub stop: Arc<AtomicBool>,
    /// 媒体总时长
    pub duration: Ticks,
    /// 该轨道的平均码率 (byte/s)
    pub byte_rate: u64,
    /// 读包速度相对播放速度的倍数
    pub read_speed: f64,
    /// 最多超前播放位置读取的时长
    pub read_ahead: Ticks,
    /// 视频轨道写入的跳转索引
    pub seek_index: Option<Arc<Mutex<SeekIndex>>>,
}

/// 单条轨道的解码统计
#[derive(Debug, Default, Clone, Copy)]
pub struct ProducerStats {
    pub media_type: Option<MediaType>,
    pub read: u64,
    pub decoded: u64,
    pub rejected: u64,
}

/// 启动一条轨道的解码线程
pub fn spawn(
    stream_index: i32,
    spec: TrackSpec,
    buffer: Arc<BlockBuffer>,
    ctx: ProducerContext,
) -> io::Result<JoinHandle<ProducerStats>> {
    let queue = ctx.queue.clone();
    queue.readers.fetch_add(1, Ordering::AcqRel);
    thread::Builder::new()
        .name(format!("decode-{}", spec.media_type()))
        .spawn(move || run(stream_index, spec, &buffer, &ctx))
        .inspect_err(|_| {
            queue.readers.fetch_sub(1, Ordering::AcqRel);
        })
}

fn run(stream_index: i32, spec: TrackSpec, buffer: &BlockBuffer, ctx: &ProducerContext) -> ProducerStats {
    let mut stats = ProducerStats {
        media_type: Some(spec.media_type()),
        ..ProducerStats::default()
    };
    let mut pending = VecDeque::new();
    let mut next_packet = 0u64;
    let mut reading = true;

    while !ctx.stop.load(Ordering::Acquire) {
        let mut progressed = false;

        if reading {
            let (start, duration) = spec.packet_span(next_packet);
            if start >= ctx.duration {
                reading = false;
                ctx.queue.readers.fetch_sub(1, Ordering::AcqRel);
                debug!("{} 轨道读包结束, 共 {} 个包", spec.media_type(), next_packet);
            } else if start <= read_budget(ctx) {
                let packet = Packet {
                    number: next_packet,
                    start_time: start,
                    duration,
                    size: packet_size(&spec, next_packet, duration, ctx.byte_rate),
                    is_keyframe: is_keyframe(&spec, next_packet),
                };
                ctx.queue.push(&packet);
                pending.push_back(packet);
                next_packet += 1;
                stats.read += 1;
                progressed = true;
            }
        }

        if let Some(packet) = pending.front().copied() {
            if has_room(buffer, &ctx.clock) {
                pending.pop_front();
                ctx.queue.pop(&packet);
                match decode(stream_index, &spec, buffer, &packet) {
                    Ok(()) => {
                        stats.decoded += 1;
                        if packet.is_keyframe {
                            record_keyframe(stream_index, &spec, &packet, ctx);
                        }
                    }
                    Err(e) => {
                        stats.rejected += 1;
                        warn!("{} 块 #{} 解码失败: {e}", spec.media_type(), packet.number);
                    }
                }
                progressed = true;
            }
        } else if !reading {
            break;
        }

        if !progressed {
            thread::sleep(Duration::from_millis(1));
        }
    }

    if reading {
        ctx.queue.readers.fetch_sub(1, Ordering::AcqRel);
    }
    for packet in pending.drain(..) {
        ctx.queue.pop(&packet);
    }
    debug!(
        "{} 解码线程退出: 读取 {} 解码 {} 拒绝 {}",
        spec.media_type(),
        stats.read,
        stats.decoded,
        stats.rejected
    );
    stats
}

/// 当前允许读到的最晚包开始时间
fn read_budget(ctx: &ProducerContext) -> Ticks {
    let position = ctx.clock.position();
    let by_speed = (position as f64 * ctx.read_speed) as Ticks + TICKS_PER_SECOND;
    by_speed.min(position + ctx.read_ahead)
}

/// 缓冲区已满且最老的块尚未播放完时暂停解码
fn has_room(buffer: &BlockBuffer, clock: &WallClock) -> bool {
    if !buffer.is_full() {
        return true;
    }
    buffer.range_start_time() + buffer.average_block_duration() <= clock.position()
}

fn is_keyframe(spec: &TrackSpec, n: u64) -> bool {
    match *spec {
        TrackSpec::Video { gop, .. } => n % u64::from(gop.max(1)) == 0,
        _ => true,
    }
}

fn packet_size(spec: &TrackSpec, n: u64, duration: Ticks, byte_rate: u64) -> u64 {
    let base = (byte_rate as f64 * ticks::to_seconds(duration)).round().max(1.0) as u64;
    match spec {
        TrackSpec::Video { .. } if is_keyframe(spec, n) => base * 3,
        TrackSpec::Video { .. } => base * 4 / 5,
        _ => base,
    }
}

/// 把包解码为块并放入缓冲区
fn decode(stream_index: i32, spec: &TrackSpec, buffer: &BlockBuffer, packet: &Packet) -> LiuResult<()> {
    let block = buffer.rent();
    let timing = BlockTiming {
        start_time: packet.start_time,
        duration: packet.duration,
        is_start_time_guessed: false,
        stream_index,
        compressed_size: packet.size,
    };
    match *spec {
        TrackSpec::Video {
            width, height, ..
        } => {
            let mut video = VideoBlock::new(width, height, width as usize);
            video.display_picture_number = packet.number as i64;
            video.coded_picture_number = packet.number as i64;
            video.smpte_timecode = ticks::format(packet.start_time);
            let shade = (packet.number % 256) as u8;
            let picture = vec![shade; video.frame_size()];
            block.fill_video(timing, &picture, video)?;
        }
        TrackSpec::Audio {
            sample_rate,
            channels,
            samples_per_block,
        } => {
            let audio = AudioBlock::new(sample_rate, channels, samples_per_block);
            let samples = vec![0u8; (samples_per_block * channels) as usize * 2];
            // 时长由采样数推导
            let timing = BlockTiming {
                duration: 0,
                ..timing
            };
            block.fill_audio(timing, &samples, audio)?;
        }
        TrackSpec::Subtitle { .. } => {
            let text = format!(
                "{{\\an8}}第 {} 句\\N<i>{}</i>",
                packet.number + 1,
                ticks::format(packet.start_time)
            );
            block.fill_subtitle(timing, SubtitleBlock::from_text(&text, SubtitleFormat::Ass))?;
        }
    }
    trace!(
        "{} 块 #{} 入缓冲: {}",
        spec.media_type(),
        packet.number,
        ticks::format(packet.start_time)
    );
    buffer.add(block)
}

fn record_keyframe(stream_index: i32, spec: &TrackSpec, packet: &Packet, ctx: &ProducerContext) {
    let (TrackSpec::Video { fps, .. }, Some(index)) = (spec, &ctx.seek_index) else {
        return;
    };
    let frame = KeyframeDescriptor {
        stream_index,
        time_base: Rational::new(1, (*fps).max(1) as i32),
        start_time: packet.start_time,
        presentation_time: packet.number as i64,
        decoding_time: packet.number as i64,
        is_keyframe: true,
    };
    let mut index = index.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    index.try_add(&frame);
}
