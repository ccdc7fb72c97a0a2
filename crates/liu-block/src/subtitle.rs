//! 字幕块元数据与填充.

use liu_core::{LiuError, LiuResult};

use crate::block::{Block, BlockKind, BlockTiming};

/// 字幕原始格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubtitleFormat {
    /// 纯文本
    #[default]
    Plain,
    /// SubRip
    Srt,
    /// Advanced SubStation Alpha
    Ass,
}

/// 字幕块: 一段时间内显示的文本行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitleBlock {
    /// 去除样式后的文本行
    pub text_lines: Vec<String>,
    /// 原始文本 (含样式标签)
    pub original_text: String,
    /// 原始格式
    pub format: SubtitleFormat,
}

impl SubtitleBlock {
    /// 从原始文本创建字幕元数据, 按行拆分并去除 ASS 样式标签
    pub fn from_text(original_text: &str, format: SubtitleFormat) -> Self {
        let text_lines = original_text
            .split(['\n', '\r'])
            .flat_map(|line| line.split("\\N"))
            .map(strip_style_tags)
            .filter(|line| !line.is_empty())
            .collect();
        Self {
            text_lines,
            original_text: original_text.to_string(),
            format,
        }
    }
}

/// 去除 `{...}` 样式块和 `<...>` 标签
fn strip_style_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth_brace = 0u32;
    let mut depth_angle = 0u32;
    for c in line.chars() {
        match c {
            '{' => depth_brace += 1,
            '}' if depth_brace > 0 => depth_brace -= 1,
            '<' => depth_angle += 1,
            '>' if depth_angle > 0 => depth_angle -= 1,
            _ if depth_brace == 0 && depth_angle == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

impl Block {
    /// 用字幕文本填充字幕块, 负载为原始文本的 UTF-8 字节
    pub fn fill_subtitle(&self, timing: BlockTiming, subtitle: SubtitleBlock) -> LiuResult<()> {
        if subtitle.original_text.is_empty() {
            return Err(LiuError::InvalidArgument("字幕文本为空".into()));
        }
        let payload = subtitle.original_text.clone().into_bytes();
        self.fill(timing, &payload, BlockKind::Subtitle(subtitle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liu_core::MediaType;

    #[test]
    fn test_subtitle_from_text_去除样式() {
        let sub = SubtitleBlock::from_text("{\\an8}第一行\\N<i>第二行</i>", SubtitleFormat::Ass);
        assert_eq!(sub.text_lines, ["第一行", "第二行"]);
    }

    #[test]
    fn test_fill_subtitle() {
        let block = Block::new(MediaType::Subtitle);
        let timing = BlockTiming {
            start_time: 0,
            duration: 20_000_000,
            ..BlockTiming::default()
        };
        block
            .fill_subtitle(timing, SubtitleBlock::from_text("你好\n世界", SubtitleFormat::Srt))
            .expect("填充");
        let guard = block.acquire_read().expect("读守卫");
        assert_eq!(guard.buffer(), "你好\n世界".as_bytes());
        assert_eq!(guard.subtitle().map(|s| s.text_lines.len()), Some(2));
    }

    #[test]
    fn test_fill_subtitle_空文本() {
        let block = Block::new(MediaType::Subtitle);
        let err = block.fill_subtitle(BlockTiming::default(), SubtitleBlock::default());
        assert!(matches!(err, Err(LiuError::InvalidArgument(_))));
    }
}
