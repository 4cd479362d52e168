//! # qeflow - Quantum ESPRESSO 工作流编排器
//!
//! 按 relax -> bands -> pdos -> 插件 -> 汇总的顺序编排 QE 子工作流，
//! 子过程由本地 launcher 或 Slurm 作业执行。
//!
//! ## 子命令
//! - `run`      - 构建请求并运行工作流
//! - `clean`    - 对工作流记录重新执行远程目录清理
//! - `plugins`  - 列出已注册的插件
//! - `defaults` - 打印默认参数文档
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── configure/ (参数文档与设置面板)
//!   │     ├── workflow/  (编排器、阶段、注册表)
//!   │     ├── engine/    (子过程引擎)
//!   │     └── models/    (数据模型)
//!   ├── plugins/    (内置插件 eos, xps)
//!   ├── utils/      (工具函数)
//!   └── error.rs    (错误处理)
//! ```

mod cli;
mod commands;
mod configure;
mod engine;
mod error;
mod models;
mod plugins;
mod utils;
mod workflow;

use clap::Parser;
use cli::Cli;
use error::QeAppError;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();
    utils::logging::init_tracing(cli.verbose);

    if let Err(e) = workflow::registry::initialize(plugins::builtin_entries()) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        let code = match e {
            QeAppError::WorkflowFailed { .. } => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}
