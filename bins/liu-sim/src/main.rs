//! # liu-sim
//!
//! Liu 播放模拟器.
//!
//! 用合成的音视频/字幕轨道驱动块缓冲区与播放引擎:
//! - 每条轨道一个解码线程, 按读包速率填充包队列并解码为块
//! - 主线程按墙钟推进播放位置, 查找并"渲染"当前块
//! - 引擎根据包队列更新缓冲进度, 估算码率, 跟踪位置并发出通知
//! - 视频关键帧写入跳转索引, 结束时可保存到文件

mod clock;
mod logging;
mod producer;

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, error, info, trace, warn};

use liu_block::{BlockBuffer, BlockBuffers};
use liu_core::{MediaType, TICKS_PER_SECOND, Ticks, ticks};
use liu_engine::{ChangedFields, EngineConfig, EngineEvent, EngineState, MediaState, StreamProfile};
use liu_seek::SeekIndex;

use clock::WallClock;
use producer::{PacketQueue, ProducerContext, ProducerStats, TrackSpec};

/// 主线程刷新间隔
const TICK_INTERVAL: Duration = Duration::from_millis(10);

/// 主缓冲区缺块时最长等待时间, 超时后强制恢复时钟
const MAX_STALL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(name = "liu-sim", version, about = "Liu 缓冲与同步引擎播放模拟器")]
struct Cli {
    /// 媒体时长 (秒)
    #[arg(short = 't', long, default_value_t = 10.0)]
    duration: f64,

    /// 视频帧率
    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// 视频分辨率 (如 "320x180")
    #[arg(short = 's', long = "size", default_value = "320x180")]
    size: String,

    /// 关键帧间隔 (帧)
    #[arg(long, default_value_t = 12)]
    gop: u32,

    /// 音频采样率 (Hz)
    #[arg(long = "ar", default_value_t = 48_000)]
    sample_rate: u32,

    /// 音频声道数
    #[arg(long = "ac", default_value_t = 2)]
    channels: u32,

    /// 每个音频块的采样数
    #[arg(long = "audio-block", default_value_t = 1_024)]
    samples_per_block: u32,

    /// 合成流的实际码率 (bit/s)
    #[arg(short = 'b', long = "bitrate", default_value_t = 2_000_000)]
    bitrate: u64,

    /// 容器声明的码率 (bit/s), 0 表示未知, 由引擎估算
    #[arg(long = "declared-bitrate", default_value_t = 0)]
    declared_bitrate: u64,

    /// 禁用视频轨道
    #[arg(long = "novideo")]
    no_video: bool,

    /// 禁用音频轨道
    #[arg(long = "noaudio")]
    no_audio: bool,

    /// 启用字幕轨道
    #[arg(long)]
    subtitles: bool,

    /// 模拟直播流
    #[arg(long)]
    live: bool,

    /// 模拟网络流
    #[arg(long)]
    network: bool,

    /// 播放倍速
    #[arg(long, default_value_t = 4.0)]
    speed: f64,

    /// 读包速度相对播放速度的倍数
    #[arg(long = "read-speed", default_value_t = 1.5)]
    read_speed: f64,

    /// 最多超前播放位置读取的时长 (秒)
    #[arg(long = "read-ahead", default_value_t = 8.0)]
    read_ahead: f64,

    /// 引擎配置文件 (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 打印生效的引擎配置后退出
    #[arg(long = "dump-config")]
    dump_config: bool,

    /// 结束时把视频关键帧索引保存到该文件
    #[arg(long = "seek-index")]
    seek_index: Option<PathBuf>,

    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = logging::init("liu-sim", cli.verbose) {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{e:#}");
        process::exit(1);
    }
}

/// 解析 "宽x高"
fn parse_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once(['x', 'X'])?;
    let w = w.trim().parse().ok()?;
    let h = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("无法读取配置 '{}'", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn build_tracks(cli: &Cli) -> Result<Vec<TrackSpec>> {
    let mut tracks = Vec::new();
    if !cli.no_video {
        let (width, height) =
            parse_size(&cli.size).with_context(|| format!("无效的分辨率 '{}'", cli.size))?;
        tracks.push(TrackSpec::Video {
            fps: cli.fps,
            width,
            height,
            gop: cli.gop,
        });
    }
    if !cli.no_audio {
        tracks.push(TrackSpec::Audio {
            sample_rate: cli.sample_rate,
            channels: cli.channels,
            samples_per_block: cli.samples_per_block,
        });
    }
    if cli.subtitles {
        tracks.push(TrackSpec::Subtitle {
            interval: 2 * TICKS_PER_SECOND,
        });
    }
    if tracks.is_empty() {
        bail!("至少需要启用一条轨道");
    }
    Ok(tracks)
}

/// 按轨道权重分配总码率 (byte/s)
fn track_byte_rate(spec: &TrackSpec, tracks: &[TrackSpec], bitrate: u64) -> u64 {
    fn weight(spec: &TrackSpec) -> u64 {
        match spec {
            TrackSpec::Video { .. } => 16,
            TrackSpec::Audio { .. } => 3,
            TrackSpec::Subtitle { .. } => 1,
        }
    }
    let total: u64 = tracks.iter().map(weight).sum();
    bitrate / 8 * weight(spec) / total.max(1)
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    if cli.dump_config {
        println!("{}", config.to_json_string()?);
        return Ok(());
    }

    let tracks = build_tracks(cli)?;
    let mut buffers = config.create_buffers(tracks.iter().map(TrackSpec::media_type))?;
    let main = buffers
        .main_buffer()
        .cloned()
        .context("没有可作为主轨道的缓冲区")?;

    let (tx, rx) = mpsc::channel();
    let engine = EngineState::new(config, Arc::new(tx));
    let duration = ticks::from_seconds(cli.duration);

    engine.begin_open();
    engine.complete_open(&StreamProfile {
        is_live: cli.live,
        is_network: cli.network,
        is_seekable: !cli.live,
        declared_bitrate: cli.declared_bitrate,
        natural_duration: (!cli.live).then_some(duration),
    });
    info!(
        "打开合成流: 时长 {}, {} 条轨道, 主轨道 {}, 缓冲阈值 {} 字节",
        ticks::format(duration),
        tracks.len(),
        main.media_type(),
        engine.buffer_cache_length()
    );

    let clock = WallClock::new(cli.speed);
    let queue = Arc::new(PacketQueue::default());
    let stop = Arc::new(AtomicBool::new(false));
    let video_stream = tracks
        .iter()
        .position(|t| t.media_type() == MediaType::Video)
        .map_or(-1, |i| i as i32);
    let seek_index = Arc::new(Mutex::new(SeekIndex::new(
        format!("liu-sim://synthetic/{}s", cli.duration),
        video_stream,
    )));

    let mut handles = Vec::with_capacity(tracks.len());
    for (stream_index, spec) in tracks.iter().enumerate() {
        let buffer = buffers
            .get(spec.media_type())
            .cloned()
            .with_context(|| format!("缺少 {} 缓冲区", spec.media_type()))?;
        let ctx = ProducerContext {
            clock: clock.clone(),
            queue: queue.clone(),
            stop: stop.clone(),
            duration,
            byte_rate: track_byte_rate(spec, &tracks, cli.bitrate),
            read_speed: cli.read_speed,
            read_ahead: ticks::from_seconds(cli.read_ahead),
            seek_index: (spec.media_type() == MediaType::Video).then(|| seek_index.clone()),
        };
        let handle = producer::spawn(stream_index as i32, *spec, buffer, ctx)
            .context("创建解码线程失败")?;
        handles.push(handle);
    }

    engine.set_media_state(MediaState::Play);
    let rendered = play(&engine, &main, &clock, &queue, duration, &rx, &buffers);

    stop.store(true, Ordering::Release);
    let stats: Vec<ProducerStats> = handles
        .into_iter()
        .filter_map(|h| h.join().ok())
        .collect();
    engine.set_media_state(MediaState::Stop);
    drain_events(&rx);

    report(&engine, &buffers, &stats, rendered);

    let index = seek_index
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(path) = &cli.seek_index {
        index
            .save_to_path(path)
            .with_context(|| format!("无法保存跳转索引 '{}'", path.display()))?;
        info!("跳转索引已保存: {} ({} 个关键帧)", path.display(), index.len());
    }
    if let Some(entry) = index.find(duration / 2) {
        debug!(
            "跳转到 {} 最近的关键帧: {}",
            ticks::format(duration / 2),
            ticks::format(entry.start_time)
        );
    }

    buffers.dispose_all();
    engine.reset();
    drain_events(&rx);
    Ok(())
}

/// 主线程播放循环, 返回渲染的块数
fn play(
    engine: &EngineState,
    main: &BlockBuffer,
    clock: &WallClock,
    queue: &PacketQueue,
    duration: Ticks,
    events: &Receiver<EngineEvent>,
    buffers: &BlockBuffers,
) -> u64 {
    let mut previous = engine.snapshot();
    let mut last_rendered: Option<Ticks> = None;
    let mut rendered = 0u64;
    let mut stall_since: Option<Instant> = None;

    loop {
        thread::sleep(TICK_INTERVAL);
        let position = clock.position().min(duration);

        if position >= duration {
            engine.update_position(main, position);
            engine.set_media_ended(true);
            engine.update_buffering(queue.length(), queue.count(), queue.can_read_more());
            drain_events(events);
            return rendered;
        }

        engine.update_position(main, position);
        match render(main, position) {
            Some(start) => {
                if last_rendered != Some(start) {
                    last_rendered = Some(start);
                    rendered += 1;
                }
                if stall_since.take().is_some() {
                    info!("主轨道恢复: {}", ticks::format(position));
                    clock.set_paused(false);
                }
            }
            None => match stall_since {
                None => {
                    debug!("主轨道缺块, 暂停时钟: {}", ticks::format(position));
                    stall_since = Some(Instant::now());
                    clock.set_paused(true);
                }
                Some(since) if since.elapsed() > MAX_STALL => {
                    warn!("主轨道长时间缺块, 跳过 {}", ticks::format(position));
                    stall_since = None;
                    clock.set_paused(false);
                }
                Some(_) => {}
            },
        }

        engine.update_buffering(queue.length(), queue.count(), queue.can_read_more());
        if engine.guess_byte_rate(buffers) {
            info!(
                "估算字节率 {} byte/s, 缓冲阈值调整为 {} 字节",
                engine.guessed_byte_rate().unwrap_or_default(),
                engine.buffer_cache_length()
            );
        }
        engine.update_decoding_bitrate(buffers);

        let snapshot = engine.snapshot();
        let changed = snapshot.diff(&previous);
        if changed.intersects(
            ChangedFields::IS_BUFFERING
                | ChangedFields::BUFFER_CACHE_LENGTH
                | ChangedFields::MEDIA_STATE,
        ) {
            debug!(
                "状态变化 {:?}: 缓冲 {} 进度 {:.1}% 队列 {} 字节/{} 包",
                changed,
                snapshot.is_buffering,
                snapshot.buffering_progress * 100.0,
                snapshot.packet_buffer_length,
                snapshot.packet_buffer_count
            );
        }
        previous = snapshot;
        drain_events(events);
    }
}

/// 读取主轨道当前块, 返回块开始时间
fn render(main: &BlockBuffer, position: Ticks) -> Option<Ticks> {
    let block = main.lookup(position)?;
    let guard = block.acquire_read()?;
    let checksum = guard
        .buffer()
        .iter()
        .take(64)
        .fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)));
    if let Some(video) = guard.video() {
        trace!(
            "渲染 #{} {} 校验和 {}",
            video.display_picture_number, video.smpte_timecode, checksum
        );
    }
    Some(block.start_time())
}

fn drain_events(events: &Receiver<EngineEvent>) {
    for event in events.try_iter() {
        match event {
            EngineEvent::BufferingStarted => info!("开始缓冲"),
            EngineEvent::BufferingEnded => info!("缓冲结束"),
            EngineEvent::StateChanged { old, new } => debug!("媒体状态: {old} -> {new}"),
            EngineEvent::PositionChanged { old, new } => {
                trace!("位置: {} -> {}", ticks::format(old), ticks::format(new));
            }
            EngineEvent::MediaEnded => info!("播放结束"),
        }
    }
}

fn report(
    engine: &EngineState,
    buffers: &BlockBuffers,
    stats: &[ProducerStats],
    rendered: u64,
) {
    for s in stats {
        if let Some(media_type) = s.media_type {
            info!(
                "{media_type} 轨道: 读取 {} 解码 {} 拒绝 {}",
                s.read, s.decoded, s.rejected
            );
        }
    }
    for buffer in buffers.iter() {
        info!(
            "{} 缓冲区: 累计 {} 块 / {} / {} 字节, 当前 {}/{} 块, 区间 {} - {}, 单调 {}",
            buffer.media_type(),
            buffer.lifetime_count(),
            ticks::format(buffer.lifetime_duration()),
            buffer.lifetime_bytes_read(),
            buffer.count(),
            buffer.capacity(),
            ticks::format(buffer.range_start_time()),
            ticks::format(buffer.range_end_time()),
            buffer.is_monotonic()
        );
    }
    info!(
        "渲染 {} 帧, 解码码率 {} bit/s, 字节率 {}, 位置 {}",
        rendered,
        engine.decoding_bitrate(),
        engine
            .guessed_byte_rate()
            .map_or_else(|| "未知".to_string(), |r| format!("{r} byte/s")),
        ticks::format(engine.position())
    );
}
