//! # run 子命令 CLI 定义
//!
//! 读取参数文档和结构文件，构建工作流请求并在选定的引擎上运行
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use crate::models::Protocol;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// 子过程引擎选择
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum EngineKind {
    /// Run the launcher directly on a local worker pool
    Local,
    /// Submit one sbatch job per sub-workflow
    Slurm,
}

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Parameters document (JSON with workflow/basic/advanced/codes sections)
    #[arg(short, long)]
    pub parameters: PathBuf,

    /// Input structure (JSON)
    #[arg(short, long)]
    pub structure: PathBuf,

    /// Root directory for job folders and workflow records
    #[arg(long, env = "QEFLOW_JOBS_ROOT", default_value = "jobs")]
    pub jobs_root: PathBuf,

    /// Sub-process engine
    #[arg(long, value_enum, default_value = "local")]
    pub engine: EngineKind,

    /// Launcher command invoked as `<launcher> <process_label> <job_dir>`
    #[arg(long, env = "QEFLOW_LAUNCHER", default_value = "qeflow-launch")]
    pub launcher: PathBuf,

    /// Override the protocol given in the parameters document
    #[arg(long, value_enum)]
    pub protocol: Option<Protocol>,

    /// Clean remote folders of all calculations when the workflow terminates
    #[arg(long, default_value_t = false)]
    pub clean_workdir: bool,

    /// Append a summary row to this CSV file
    #[arg(long)]
    pub summary: Option<PathBuf>,

    // ─────────────────────────────────────────────────────────────
    // Global overrides
    // ─────────────────────────────────────────────────────────────
    /// K-points distance for every PwBaseWorkChain except NSCF (1/Å)
    #[arg(long)]
    pub kpoints_distance_override: Option<f64>,

    /// Smearing width for every PwBaseWorkChain except NSCF (Ry)
    #[arg(long)]
    pub degauss_override: Option<f64>,

    /// Smearing type for every PwBaseWorkChain except NSCF
    #[arg(long)]
    pub smearing_override: Option<String>,

    // ─────────────────────────────────────────────────────────────
    // Local engine options
    // ─────────────────────────────────────────────────────────────
    /// Number of concurrent launcher processes (0 = all CPUs)
    #[arg(short, long, default_value_t = 0)]
    pub jobs: usize,

    // ─────────────────────────────────────────────────────────────
    // Slurm options
    // ─────────────────────────────────────────────────────────────
    /// Slurm partition
    #[arg(long, default_value = "cpu")]
    pub partition: String,

    /// Slurm constraint
    #[arg(long)]
    pub constraint: Option<String>,

    /// Number of nodes
    #[arg(long, default_value_t = 1)]
    pub nodes: u32,

    /// Number of tasks
    #[arg(long, default_value_t = 32)]
    pub ntasks: u32,

    /// CPUs per task
    #[arg(long, default_value_t = 1)]
    pub cpus_per_task: u32,

    /// Memory per CPU
    #[arg(long, default_value = "3G")]
    pub mem_per_cpu: String,

    /// Time limit (e.g., '24:00:00')
    #[arg(long, default_value = "24:00:00")]
    pub time: String,

    /// Modules to load in the job script (comma-separated)
    #[arg(long, default_value = "")]
    pub modules: String,

    /// Seconds between completion checks
    #[arg(long, default_value_t = 30)]
    pub poll_interval: u64,
}
