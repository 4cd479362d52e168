//! # defaults 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/defaults.rs`

use crate::models::Protocol;

use clap::Args;
use std::path::PathBuf;

/// defaults 子命令参数
#[derive(Args, Debug)]
pub struct DefaultsArgs {
    /// Protocol whose presets seed the basic and advanced sections
    #[arg(long, value_enum, default_value = "moderate")]
    pub protocol: Protocol,

    /// Write the document to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
