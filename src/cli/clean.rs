//! # clean 子命令 CLI 定义
//!
//! 对 `workflow-<pk>.json` 记录重新执行终止钩子
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/clean.rs`

use clap::Args;

/// clean 子命令参数
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Workflow record files, directories or glob patterns (e.g. 'jobs/workflow-*.json')
    #[arg(required = true)]
    pub records: Vec<String>,

    /// Clean even if the workflow was run without --clean-workdir
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Only list what would be cleaned
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
