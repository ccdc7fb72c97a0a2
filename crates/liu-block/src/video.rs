//! 视频块元数据与填充.

use liu_core::{LiuError, LiuResult};

use crate::block::{Block, BlockKind, BlockTiming};

/// 视频块: 一帧已转换好的图像
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoBlock {
    /// 宽度 (像素)
    pub pixel_width: u32,
    /// 高度 (像素)
    pub pixel_height: u32,
    /// 每行字节数
    pub stride: usize,
    /// 显示宽高比分子
    pub aspect_width: u32,
    /// 显示宽高比分母
    pub aspect_height: u32,
    /// SMPTE 时间码, 例如 `00:00:01:12`
    pub smpte_timecode: String,
    /// 显示顺序图片编号
    pub display_picture_number: i64,
    /// 编码顺序图片编号
    pub coded_picture_number: i64,
    /// 隐藏字幕 (按出现顺序)
    pub closed_captions: Vec<String>,
    /// 是否由硬件解码器输出
    pub is_hardware_frame: bool,
    /// 硬件解码器名称, 软件解码时为空
    pub hardware_decoder_name: String,
}

impl VideoBlock {
    /// 创建视频元数据, 宽高比默认为 1:1
    pub fn new(pixel_width: u32, pixel_height: u32, stride: usize) -> Self {
        Self {
            pixel_width,
            pixel_height,
            stride,
            aspect_width: 1,
            aspect_height: 1,
            ..Self::default()
        }
    }

    /// 一帧图像所需的最少字节数
    pub fn frame_size(&self) -> usize {
        self.stride * self.pixel_height as usize
    }
}

impl Block {
    /// 用转换后的图像数据填充视频块
    ///
    /// 负载长度必须至少覆盖 `stride * pixel_height`.
    pub fn fill_video(&self, timing: BlockTiming, picture: &[u8], video: VideoBlock) -> LiuResult<()> {
        if video.stride < video.pixel_width as usize {
            return Err(LiuError::InvalidArgument(format!(
                "行字节数 {} 小于宽度 {}",
                video.stride, video.pixel_width
            )));
        }
        if picture.len() < video.frame_size() {
            return Err(LiuError::InvalidArgument(format!(
                "图像数据不足: 需要 {} 字节, 实际 {} 字节",
                video.frame_size(),
                picture.len()
            )));
        }
        self.fill(timing, picture, BlockKind::Video(video))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liu_core::MediaType;

    fn timing() -> BlockTiming {
        BlockTiming {
            start_time: 400_000,
            duration: 400_000,
            stream_index: 0,
            ..BlockTiming::default()
        }
    }

    #[test]
    fn test_fill_video_元数据() {
        let block = Block::new(MediaType::Video);
        let mut video = VideoBlock::new(4, 2, 16);
        video.smpte_timecode = "00:00:00:01".into();
        video.closed_captions = vec!["CC1".into(), "CC2".into()];
        video.hardware_decoder_name = "vaapi".into();
        video.is_hardware_frame = true;
        block.fill_video(timing(), &[9u8; 32], video).expect("填充");

        let guard = block.acquire_read().expect("读守卫");
        let video = guard.video().expect("视频元数据");
        assert_eq!(video.pixel_width, 4);
        assert_eq!(video.closed_captions, ["CC1", "CC2"]);
        assert_eq!(video.smpte_timecode, "00:00:00:01");
        assert_eq!(guard.buffer().len(), 32);
        assert_eq!(block.end_time(), 800_000);
    }

    #[test]
    fn test_fill_video_数据不足() {
        let block = Block::new(MediaType::Video);
        let err = block.fill_video(timing(), &[0u8; 8], VideoBlock::new(4, 2, 16));
        assert!(matches!(err, Err(LiuError::InvalidArgument(_))));
        let err = block.fill_video(timing(), &[0u8; 64], VideoBlock::new(8, 2, 4));
        assert!(matches!(err, Err(LiuError::InvalidArgument(_))));
    }

    #[test]
    fn test_fill_video_复用槽位() {
        let block = Block::new(MediaType::Video);
        block
            .fill_video(timing(), &[1u8; 32], VideoBlock::new(4, 2, 16))
            .expect("第一次填充");
        let next = BlockTiming {
            start_time: 800_000,
            ..timing()
        };
        block
            .fill_video(next, &[2u8; 32], VideoBlock::new(4, 2, 16))
            .expect("第二次填充");
        assert_eq!(block.start_time(), 800_000);
        let guard = block.acquire_read().expect("读守卫");
        assert!(guard.buffer().iter().all(|&b| b == 2));
    }
}
