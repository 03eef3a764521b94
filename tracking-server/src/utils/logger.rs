//! 日志初始化
//!
//! 控制台输出为主；设置 LOG_DIR 时追加按日滚动的文件日志。
//! 过滤规则：RUST_LOG 优先，其次 LOG_LEVEL，缺省 info。

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Console-only logger with the default filter
pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// Initialize the logger, optionally teeing into a daily-rolling file
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    if let Some(dir) = log_dir
        && Path::new(dir).exists()
    {
        let file_appender = tracing_appender::rolling::daily(dir, "tracking-server");
        subscriber.with_writer(file_appender).init();
        return;
    }

    subscriber.init();
}
