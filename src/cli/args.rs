//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// PingBot - HTTP(S) 端点存活监控
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pingbot",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "PINGBOT_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别（默认使用配置文件中的级别）",
        env = "PINGBOT_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 是否启用详细输出
    #[arg(short, long, help = "启用详细输出", global = true)]
    pub verbose: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 在前台启动监控，直到收到 Ctrl-C
    Start {
        /// 监控周期间隔（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "监控周期间隔（秒）",
            env = "PINGBOT_INTERVAL"
        )]
        interval: Option<u64>,

        /// 最大并发探测数
        #[arg(
            long,
            value_name = "COUNT",
            help = "最大并发探测数",
            env = "PINGBOT_MAX_CONCURRENT"
        )]
        max_concurrent: Option<usize>,
    },

    /// 对单个URL执行一次探测
    Check {
        /// 要探测的URL
        #[arg(value_name = "URL", help = "要探测的URL")]
        url: String,

        /// 超时时间（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            default_value = "4",
            help = "超时时间（秒）"
        )]
        timeout: u64,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },

    /// 查看可用率统计
    Uptime {
        /// 只查看指定用户
        #[arg(short, long, value_name = "USER_ID", help = "用户ID")]
        user: Option<String>,

        /// 统计窗口（小时）
        #[arg(long, value_name = "HOURS", help = "统计窗口（小时）")]
        hours: Option<u32>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 查看告警历史
    Alerts {
        /// 用户ID
        #[arg(short, long, value_name = "USER_ID", help = "用户ID")]
        user: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 生成示例配置文件
    Init {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径", default_value = "pingbot.toml")]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        self.verbose || matches!(self.log_level, Some(LogLevel::Debug | LogLevel::Trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_check_command() {
        let args = Args::try_parse_from(["pingbot", "check", "https://example.com", "--format", "json"]).unwrap();
        match args.command {
            Commands::Check { url, timeout, format } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(timeout, 4);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let args = Args::try_parse_from(["pingbot", "uptime", "--config", "/tmp/p.toml", "--hours", "12"]).unwrap();
        assert_eq!(args.get_config_path(), PathBuf::from("/tmp/p.toml"));
        assert!(matches!(args.command, Commands::Uptime { hours: Some(12), .. }));
    }

    #[test]
    fn test_alerts_requires_user() {
        assert!(Args::try_parse_from(["pingbot", "alerts"]).is_err());
    }
}
