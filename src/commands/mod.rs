//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `configure/`, `workflow/`, `engine/`, `utils/`
//! - 子模块: run, clean, plugins, defaults

pub mod clean;
pub mod defaults;
pub mod plugins;
pub mod run;

use crate::cli::Commands;
use crate::error::Result;
use crate::workflow::registry;

/// 执行命令；每次都读取注册表的当前快照
pub fn run(cmd: Commands) -> Result<()> {
    let registry = registry::load();
    match cmd {
        Commands::Run(args) => run::execute(args, &registry),
        Commands::Clean(args) => clean::execute(args),
        Commands::Plugins => plugins::execute(&registry),
        Commands::Defaults(args) => defaults::execute(args, &registry),
    }
}
