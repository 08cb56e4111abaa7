//! 应用程序核心逻辑
//!
//! 包含主函数、日志初始化和命令分发

use crate::cli::args::{Args, Commands};
use crate::cli::commands::{
    AlertsCommand, CheckCommand, Command, InitCommand, StartCommand, UptimeCommand,
    ValidateCommand, VersionCommand,
};
use crate::config::{ConfigLoader, TomlConfigLoader};
use crate::logging::{parse_level, LogConfig, LoggingSystem};
use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use tracing::{error, info};

/// 应用程序主函数
pub async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = resolve_log_config(&args).await;
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("PingBot v{} 启动", crate::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 确定日志配置
///
/// 级别以命令行优先，其次是配置文件，最后默认 info。
/// 只有 `start` 命令读取配置中的日志文件和格式，其余命令始终输出到控制台。
async fn resolve_log_config(args: &Args) -> LogConfig {
    let mut log_config = LogConfig::default();

    let global = if matches!(args.command, Commands::Start { .. }) {
        TomlConfigLoader::new(true)
            .load_from_file(args.get_config_path())
            .await
            .ok()
            .map(|config| config.global)
    } else {
        None
    };

    if let Some(global) = &global {
        if let Some(path) = &global.log_file {
            log_config.file_path = Some(path.clone());
            log_config.console = false;
        }
        log_config.json_format = global.log_json;
    }

    log_config.level = if let Some(level) = args.log_level {
        level.into()
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        global
            .and_then(|global| parse_level(&global.log_level))
            .unwrap_or(LevelFilter::Info)
    };

    log_config
}

/// 执行CLI命令
pub async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => {
            info!("启动监控服务...");
            Box::new(StartCommand)
        }
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Uptime { .. } => Box::new(UptimeCommand),
        Commands::Alerts { .. } => Box::new(AlertsCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    command.execute(args).await.map_err(anyhow::Error::from)
}
