//! 日志初始化模块
//!
//! 统一各服务的 tracing 订阅器配置：优先使用环境变量 `RUST_LOG`，
//! 其次使用配置文件中的日志级别；配置了目录与文件名时输出到滚动日志文件。

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// 从配置初始化日志系统
///
/// 返回的 guard 在进程存活期间必须持有，否则异步写入线程会提前退出。
pub fn init_tracing_from_config(config: &LogConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.debug { "debug" } else { "info" })
    });

    match (config.dir.as_deref(), config.filename.as_deref()) {
        (Some(dir), Some(filename)) => {
            let appender = tracing_appender::rolling::daily(dir, filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}
