//! 日志初始化.
//!
//! 控制台与按天滚动的文件 (`logs/{prefix}.{date}.log`) 使用同一过滤级别,
//! `LIU_LOG` 环境变量优先于 `-v` 计数. 库 crate 的 `log` 记录经 tracing-log 桥接.

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::OnceLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FormatEvent, FormatFields, format::Writer},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// 日志环境变量
const ENV_VAR: &str = "LIU_LOG";

/// 日志目录
const LOG_DIR: &str = "logs";

static FILE_WRITER_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    OnceLock::new();

/// 本项目 crate, `-vv` 时只对它们开启 trace
const OWN_TARGETS: &[&str] = &["liu", "liu_core", "liu_block", "liu_seek", "liu_engine", "liu_sim"];

/// `-v` 计数对应的过滤指令
fn directives(verbosity: u8) -> String {
    match verbosity {
        0 => "info".into(),
        1 => "debug".into(),
        2 => OWN_TARGETS
            .iter()
            .map(|t| format!("{t}=trace"))
            .chain(std::iter::once("info".into()))
            .collect::<Vec<_>>()
            .join(","),
        _ => "trace".into(),
    }
}

fn filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_env(ENV_VAR).unwrap_or_else(|_| EnvFilter::new(directives(verbosity)))
}

/// 初始化日志系统
pub fn init(file_prefix: &str, verbosity: u8) -> Result<()> {
    std::fs::create_dir_all(LOG_DIR).context("创建日志目录失败")?;
    let appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(file_prefix)
        .filename_suffix("log")
        .build(LOG_DIR)
        .context("创建日志文件失败")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);
    FILE_WRITER_GUARD.set(guard).ok();

    let console = fmt::Layer::default()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(LineFormat { colored: true })
        .with_filter(filter(verbosity));
    let file = fmt::Layer::default()
        .with_writer(file_writer)
        .with_ansi(false)
        .event_format(LineFormat { colored: false })
        .with_filter(filter(verbosity));

    Registry::default()
        .with(console)
        .with(file)
        .try_init()
        .context("注册日志订阅器失败")
}

/// 单行格式: `[月-日 时:分:秒.毫秒] 级别 > 字段`, 控制台按级别着色
struct LineFormat {
    colored: bool,
}

impl LineFormat {
    fn level_color(level: tracing::Level) -> &'static str {
        match level {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let level = *event.metadata().level();
        write!(writer, "[{}] ", Local::now().format("%m-%d %H:%M:%S%.3f"))?;
        if self.colored {
            write!(writer, "{}{level:5}\x1b[0m > ", Self::level_color(level))?;
        } else {
            write!(writer, "{level:5} > ")?;
        }
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_按计数() {
        assert_eq!(directives(0), "info");
        assert_eq!(directives(1), "debug");
        let own = directives(2);
        assert!(own.starts_with("liu=trace,"));
        assert!(own.contains("liu_engine=trace"));
        assert!(own.ends_with(",info"));
        assert_eq!(directives(7), "trace");
    }
}
