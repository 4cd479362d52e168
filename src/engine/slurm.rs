//! # Slurm 引擎
//!
//! 为每次提交生成 sbatch 脚本并用 `sbatch --parsable` 提交。脚本运行
//! launcher 后把退出码写入作业目录的 `exit_code` 文件，句柄轮询这个
//! 完成标记；若作业已从 `squeue` 消失却没有标记（被取消或超时），
//! 节点记为 killed。`squeue` 持续无法执行时同样按作业消失处理。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `engine/jobdir.rs`

use super::jobdir::{JobDir, JobStore, EXIT_CODE_FILE};
use super::{Engine, ProcessHandle, Submission};
use crate::error::{QeAppError, Result};
use crate::models::{ProcessNode, ProcessState};

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Slurm 作业配置
#[derive(Debug, Clone)]
pub struct SlurmConfig {
    pub partition: String,
    pub constraint: Option<String>,
    pub nodes: u32,
    pub ntasks: u32,
    pub cpus_per_task: u32,
    pub mem_per_cpu: String,
    pub time_limit: String,
    pub modules: Vec<String>,
    /// 轮询完成标记的间隔
    pub poll_interval: Duration,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        SlurmConfig {
            partition: "cpu".to_string(),
            constraint: None,
            nodes: 1,
            ntasks: 32,
            cpus_per_task: 1,
            mem_per_cpu: "3G".to_string(),
            time_limit: "24:00:00".to_string(),
            modules: vec![],
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// 生成 sbatch 脚本内容
pub fn generate_sbatch_script(
    config: &SlurmConfig,
    job_name: &str,
    workdir: &Path,
    launcher: &Path,
    process_label: &str,
) -> String {
    let module_loads = config
        .modules
        .iter()
        .map(|m| format!("module load {}", m))
        .collect::<Vec<_>>()
        .join("\n");
    let constraint = config
        .constraint
        .as_ref()
        .map(|c| format!("#SBATCH --constraint \"{}\"\n", c))
        .unwrap_or_default();

    format!(
        r#"#!/bin/bash
{constraint}#SBATCH --partition {partition}
#SBATCH --nodes={nodes}
#SBATCH --mem-per-cpu {mem}
#SBATCH --time {time}
#SBATCH -c {cpus}
#SBATCH -n {ntasks}
#SBATCH -J {job_name}
#SBATCH -o launcher.out
#SBATCH -e launcher.err

module purge 2>&1 || true
{module_loads}

cd "{workdir}"
rm -f {marker}
"{launcher}" {process_label} "{workdir}"
echo $? > {marker}
"#,
        constraint = constraint,
        partition = config.partition,
        nodes = config.nodes,
        mem = config.mem_per_cpu,
        time = config.time_limit,
        cpus = config.cpus_per_task,
        ntasks = config.ntasks,
        job_name = job_name,
        module_loads = module_loads,
        workdir = workdir.display(),
        marker = EXIT_CODE_FILE,
        launcher = launcher.display(),
        process_label = process_label,
    )
}

/// Slurm 引擎
pub struct SlurmEngine {
    store: Arc<JobStore>,
    launcher: PathBuf,
    config: SlurmConfig,
}

impl SlurmEngine {
    pub fn new(store: Arc<JobStore>, launcher: impl Into<PathBuf>, config: SlurmConfig) -> Self {
        SlurmEngine {
            store,
            launcher: launcher.into(),
            config,
        }
    }
}

impl Engine for SlurmEngine {
    fn name(&self) -> &str {
        "slurm"
    }

    fn allocate_pk(&self) -> u64 {
        self.store.allocate_pk()
    }

    fn submit(&self, submission: Submission) -> Result<Box<dyn ProcessHandle>> {
        let job = self.store.prepare(&submission)?;
        let job_name = format!("qeflow-{}-{}", job.pk, job.link_label);
        let script = generate_sbatch_script(
            &self.config,
            &job_name,
            &job.path,
            &self.launcher,
            &job.process_label,
        );

        let script_path = job.path.join("job.sbatch");
        fs::write(&script_path, script).map_err(|e| QeAppError::FileWriteError {
            path: script_path.display().to_string(),
            source: e,
        })?;

        let out = Command::new("sbatch")
            .arg("--parsable")
            .arg(&script_path)
            .current_dir(&job.path)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => QeAppError::CommandNotFound {
                    command: "sbatch".to_string(),
                },
                _ => QeAppError::CommandFailed {
                    command: "sbatch".to_string(),
                    stderr: e.to_string(),
                },
            })?;

        if !out.status.success() {
            return Err(QeAppError::CommandFailed {
                command: "sbatch".to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        // --parsable 输出 "<jobid>[;cluster]"
        let stdout = String::from_utf8_lossy(&out.stdout);
        let job_id = stdout
            .trim()
            .split(';')
            .next()
            .unwrap_or_default()
            .to_string();
        debug!(pk = job.pk, job_id = %job_id, "submitted to slurm");

        Ok(Box::new(SlurmHandle {
            job,
            job_id,
            store: Arc::clone(&self.store),
            poll_interval: self.config.poll_interval,
        }))
    }
}

/// 连续几次不在队列才判定作业消失
const MISSING_POLLS: u32 = 2;
/// 连续几次无法执行 squeue 后放弃等待
const UNAVAILABLE_POLLS: u32 = 5;

/// 一次 squeue 查询的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueStatus {
    Queued,
    Missing,
    Unavailable,
}

/// 跟踪连续的队列查询结果
#[derive(Debug, Default)]
struct QueueWatch {
    missing: u32,
    unavailable: u32,
}

impl QueueWatch {
    /// 记录一次查询，返回作业是否应判定为已消失
    fn observe(&mut self, status: QueueStatus) -> bool {
        match status {
            QueueStatus::Queued => {
                self.missing = 0;
                self.unavailable = 0;
            }
            QueueStatus::Missing => {
                self.missing += 1;
                self.unavailable = 0;
            }
            QueueStatus::Unavailable => self.unavailable += 1,
        }
        self.missing >= MISSING_POLLS || self.unavailable >= UNAVAILABLE_POLLS
    }
}

/// Slurm 作业句柄
struct SlurmHandle {
    job: JobDir,
    job_id: String,
    store: Arc<JobStore>,
    poll_interval: Duration,
}

impl SlurmHandle {
    fn queue_status(&self) -> QueueStatus {
        match Command::new("squeue")
            .args(["-h", "-j", &self.job_id])
            .output()
        {
            Ok(out) if String::from_utf8_lossy(&out.stdout).trim().is_empty() => {
                QueueStatus::Missing
            }
            Ok(_) => QueueStatus::Queued,
            Err(e) => {
                warn!("squeue failed for job {}: {}", self.job_id, e);
                QueueStatus::Unavailable
            }
        }
    }
}

impl ProcessHandle for SlurmHandle {
    fn pk(&self) -> u64 {
        self.job.pk
    }

    fn wait(&mut self) -> Result<ProcessNode> {
        let mut watch = QueueWatch::default();
        loop {
            if let Some(code) = self.job.read_exit_code() {
                return self.job.collect(&self.store, Some(code));
            }

            if watch.observe(self.queue_status()) {
                // 标记可能在最后一次查询期间写入
                if let Some(code) = self.job.read_exit_code() {
                    return self.job.collect(&self.store, Some(code));
                }
                warn!(
                    "slurm job {} (pk {}) left the queue without an exit marker",
                    self.job_id, self.job.pk
                );
                let mut node = self.job.collect(&self.store, None)?;
                node.state = ProcessState::Killed;
                return Ok(node);
            }

            thread::sleep(self.poll_interval);
        }
    }
}
