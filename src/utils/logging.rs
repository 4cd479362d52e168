//! # 日志初始化
//!
//! 安装 `tracing-subscriber`，日志写到 stderr，避免与表格输出混在一起。
//! `RUST_LOG` 优先；否则由 `-v` 的次数决定级别：
//! 0 -> warn, 1 -> info, 2 -> debug, 3+ -> trace。
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 使用 `tracing-subscriber` crate

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `-v` 次数对应的默认过滤规则
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "qeflow=warn",
        1 => "qeflow=info",
        2 => "qeflow=debug",
        _ => "qeflow=trace",
    }
}

/// 安装全局 subscriber；重复调用时静默忽略
pub fn init_tracing(verbosity: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
}
