//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `run`: 构建请求并运行工作流
//! - `clean`: 对已持久化的工作流记录重新执行清理钩子
//! - `plugins`: 列出已注册的插件
//! - `defaults`: 打印默认参数文档
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: run, clean, defaults

pub mod clean;
pub mod defaults;
pub mod run;

use clap::{ArgAction, Parser, Subcommand};

/// qeflow - Quantum ESPRESSO 工作流编排器
#[derive(Parser)]
#[command(name = "qeflow")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Orchestrate Quantum ESPRESSO relax/bands/PDOS workflows with plugin sub-workflows", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Build a workflow request from a parameters file and run it
    Run(run::RunArgs),

    /// Re-run the remote-folder cleanup on persisted workflow records
    Clean(clean::CleanArgs),

    /// List registered plugins, their exit codes and settings panels
    Plugins,

    /// Print the default parameters document
    Defaults(defaults::DefaultsArgs),
}
