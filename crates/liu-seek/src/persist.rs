//! 关键帧索引的文本持久化.
//!
//! 格式 (UTF-8, 按行):
//!
//! ```text
//! v1:SeekIndex.Entries
//! StreamIndex,SourceUrl
//! 0,"http://host/a ""b"".mp4"
//! v1:SeekIndex.Entries
//! StreamIndex,StreamTimeBaseNum,StreamTimeBaseDen,StartTime,PresentationTime,DecodingTime
//! 0,1,90000,0,0,-3000
//! ```
//!
//! 加载时忽略空行, 数值字段无法解析的行单独跳过.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, warn};

use liu_core::{LiuError, LiuResult, Rational};

use crate::entry::SeekIndexEntry;
use crate::index::SeekIndex;

/// 段头 (索引头段和条目段共用)
pub const SECTION_HEADER: &str = "v1:SeekIndex.Entries";

/// 索引头段列名
pub const INDEX_FIELDS: &str = "StreamIndex,SourceUrl";

/// 条目段列名
pub const ENTRY_FIELDS: &str =
    "StreamIndex,StreamTimeBaseNum,StreamTimeBaseDen,StartTime,PresentationTime,DecodingTime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Index,
    Entries,
}

impl SeekIndex {
    /// 写出索引
    pub fn save<W: Write>(&self, mut writer: W) -> LiuResult<()> {
        writeln!(writer, "{SECTION_HEADER}")?;
        writeln!(writer, "{INDEX_FIELDS}")?;
        writeln!(
            writer,
            "{},\"{}\"",
            self.stream_index(),
            self.source_url().replace('"', "\"\"")
        )?;
        writeln!(writer, "{SECTION_HEADER}")?;
        writeln!(writer, "{ENTRY_FIELDS}")?;
        for e in self.entries() {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                e.stream_index,
                e.time_base.num,
                e.time_base.den,
                e.start_time,
                e.presentation_time,
                e.decoding_time
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    /// 读取索引
    ///
    /// 缺少段头时返回 `InvalidData`; 单行格式错误只跳过该行.
    pub fn load<R: BufRead>(reader: R) -> LiuResult<SeekIndex> {
        let mut section = Section::Preamble;
        let mut index: Option<SeekIndex> = None;
        let mut pending: Vec<SeekIndexEntry> = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == SECTION_HEADER {
                section = match section {
                    Section::Preamble => Section::Index,
                    _ => Section::Entries,
                };
                continue;
            }
            if line == INDEX_FIELDS || line == ENTRY_FIELDS {
                continue;
            }

            let parsed = match section {
                Section::Preamble => false,
                Section::Index => match parse_index_row(line) {
                    Some((stream_index, source_url)) => {
                        index = Some(SeekIndex::new(source_url, stream_index));
                        true
                    }
                    None => false,
                },
                Section::Entries => match parse_entry_row(line) {
                    Some(entry) => {
                        pending.push(entry);
                        true
                    }
                    None => false,
                },
            };
            if !parsed {
                skipped += 1;
                warn!("跳过无法解析的索引行 {}: {}", line_no + 1, line);
            }
        }

        if section == Section::Preamble {
            return Err(LiuError::InvalidData(format!("缺少段头 {SECTION_HEADER}")));
        }
        let mut index = index.unwrap_or_else(|| SeekIndex::new(String::new(), -1));
        for entry in pending {
            index.insert(entry);
        }
        debug!(
            "加载关键帧索引: stream={}, 条目={}, 跳过={}",
            index.stream_index(),
            index.len(),
            skipped
        );
        Ok(index)
    }

    /// 保存到文件
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> LiuResult<()> {
        let file = File::create(path.as_ref())?;
        self.save(BufWriter::new(file))
    }

    /// 从文件加载
    pub fn load_from_path(path: impl AsRef<Path>) -> LiuResult<SeekIndex> {
        let file = File::open(path.as_ref())?;
        Self::load(BufReader::new(file))
    }
}

/// 解析 `<streamIndex>,"<sourceUrl>"`
fn parse_index_row(row: &str) -> Option<(i32, String)> {
    let (stream_index, source_url) = row.split_once(',')?;
    let stream_index = stream_index.trim().parse().ok()?;
    Some((stream_index, unquote(source_url.trim())))
}

/// 去掉首尾引号并还原内部成对的引号
fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => value.to_string(),
    }
}

fn parse_entry_row(row: &str) -> Option<SeekIndexEntry> {
    let mut fields = row.split(',').map(str::trim);
    let stream_index = fields.next()?.parse().ok()?;
    let num = fields.next()?.parse().ok()?;
    let den = fields.next()?.parse().ok()?;
    let start_time = fields.next()?.parse().ok()?;
    let presentation_time = fields.next()?.parse().ok()?;
    let decoding_time = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(SeekIndexEntry::new(
        stream_index,
        Rational::new(num, den),
        start_time,
        presentation_time,
        decoding_time,
    ))
}
