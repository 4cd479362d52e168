//! # 子过程引擎模块
//!
//! 编排器只通过 `Engine::submit` 提交子工作流并拿到不透明的句柄；
//! 句柄阻塞等待子过程进入终态并返回 `ProcessNode`。
//!
//! ## 引擎
//! - `local`: 在 rayon 线程池中直接运行 launcher 命令
//! - `slurm`: 生成 sbatch 脚本并轮询完成标记
//! - `scripted`: 测试用，回放预设的过程节点
//!
//! ## 依赖关系
//! - 被 `workflow/executor.rs`, `workflow/inspector.rs`, `commands/run.rs` 使用
//! - 子模块: jobdir, local, slurm

pub mod jobdir;
pub mod local;
#[cfg(test)]
pub mod scripted;
pub mod slurm;

pub use jobdir::JobStore;
pub use local::LocalEngine;
pub use slurm::{SlurmConfig, SlurmEngine};

use crate::error::Result;
use crate::models::{Namespace, ProcessNode};

/// 一次子工作流提交
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// 子工作流入口名，如 `quantumespresso.pw.relax`
    pub process_label: String,
    /// 调用链接标签（阶段名）
    pub link_label: String,
    pub inputs: Namespace,
}

/// 已提交子过程的句柄
pub trait ProcessHandle: Send {
    fn pk(&self) -> u64;

    /// 阻塞直到子过程进入终态
    fn wait(&mut self) -> Result<ProcessNode>;
}

/// 子过程引擎
pub trait Engine: Send + Sync {
    /// 引擎名，用于日志
    fn name(&self) -> &str;

    /// 为父工作流本身分配一个 pk
    fn allocate_pk(&self) -> u64;

    /// 异步提交；只在无法启动子过程时返回错误
    fn submit(&self, submission: Submission) -> Result<Box<dyn ProcessHandle>>;
}
