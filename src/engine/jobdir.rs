//! # 作业目录
//!
//! 每次提交对应 `<jobs_root>/<pk>-<link_label>/` 目录：
//! - `inputs.json`：入口名与输入命名空间，供 launcher 读取
//! - `outputs.json`：launcher 写出的 `{exit_status, outputs, called}`
//! - `exit_code`：Slurm 脚本写出的 launcher 退出码（完成标记）
//!
//! pk 在 `JobStore` 内单调递增，打开已有目录时从现有最大 pk 之后继续。
//!
//! ## 依赖关系
//! - 被 `engine/local.rs`, `engine/slurm.rs` 使用
//! - 使用 `models/`

use super::Submission;
use crate::error::{QeAppError, Result};
use crate::models::{Namespace, ProcessNode, ProcessState, ProcessType};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const INPUTS_FILE: &str = "inputs.json";
pub const OUTPUTS_FILE: &str = "outputs.json";
pub const EXIT_CODE_FILE: &str = "exit_code";

/// 写给 launcher 的输入文件
#[derive(Debug, Serialize, Deserialize)]
struct InputsFile {
    process_label: String,
    link_label: String,
    inputs: Namespace,
}

/// launcher 写回的输出文件
#[derive(Debug, Deserialize)]
struct LauncherOutput {
    exit_status: i32,
    #[serde(default)]
    outputs: Namespace,
    #[serde(default)]
    called: Vec<ProcessNode>,
}

/// 作业目录根
#[derive(Debug)]
pub struct JobStore {
    root: PathBuf,
    next_pk: AtomicU64,
}

impl JobStore {
    /// 打开（必要时创建）作业根目录
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| QeAppError::FileWriteError {
            path: root.display().to_string(),
            source: e,
        })?;

        let pattern = Regex::new(r"^(?:workflow-)?(\d+)(?:-|\.json$)").expect("valid job pattern");
        let max_pk = fs::read_dir(&root)
            .map_err(|e| QeAppError::FileReadError {
                path: root.display().to_string(),
                source: e,
            })?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                pattern
                    .captures(&name)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u64>().ok())
            })
            .max()
            .unwrap_or(0);

        Ok(JobStore {
            root,
            next_pk: AtomicU64::new(max_pk + 1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allocate_pk(&self) -> u64 {
        self.next_pk.fetch_add(1, Ordering::Relaxed)
    }

    /// 创建作业目录并写入 `inputs.json`
    pub fn prepare(&self, submission: &Submission) -> Result<JobDir> {
        let pk = self.allocate_pk();
        let path = self.root.join(format!("{}-{}", pk, submission.link_label));
        fs::create_dir_all(&path).map_err(|e| QeAppError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;

        let inputs = InputsFile {
            process_label: submission.process_label.clone(),
            link_label: submission.link_label.clone(),
            inputs: submission.inputs.clone(),
        };
        let inputs_path = path.join(INPUTS_FILE);
        let content = serde_json::to_string_pretty(&inputs)?;
        fs::write(&inputs_path, content).map_err(|e| QeAppError::FileWriteError {
            path: inputs_path.display().to_string(),
            source: e,
        })?;

        Ok(JobDir {
            pk,
            path,
            process_label: submission.process_label.clone(),
            link_label: submission.link_label.clone(),
        })
    }
}

/// 单个作业目录
#[derive(Debug, Clone)]
pub struct JobDir {
    pub pk: u64,
    pub path: PathBuf,
    pub process_label: String,
    pub link_label: String,
}

impl JobDir {
    /// 读取 Slurm 完成标记；尚未完成时返回 None
    pub fn read_exit_code(&self) -> Option<i32> {
        fs::read_to_string(self.path.join(EXIT_CODE_FILE))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// 根据 `outputs.json` 构造过程节点
    ///
    /// launcher 没有写出输出文件时节点状态为 excepted，exit status 取
    /// launcher 的退出码；输出文件无法解析时返回错误。
    pub fn collect(&self, store: &JobStore, launcher_code: Option<i32>) -> Result<ProcessNode> {
        let mut node = ProcessNode::new(self.pk, &self.link_label, &self.process_label);
        node.process_type = ProcessType::WorkChain;

        let outputs_path = self.path.join(OUTPUTS_FILE);
        if !outputs_path.exists() {
            node.state = ProcessState::Excepted;
            node.exit_status = launcher_code;
            return Ok(node);
        }

        let content = fs::read_to_string(&outputs_path).map_err(|e| QeAppError::FileReadError {
            path: outputs_path.display().to_string(),
            source: e,
        })?;
        let output: LauncherOutput =
            serde_json::from_str(&content).map_err(|e| QeAppError::ParseError {
                format: "outputs.json".to_string(),
                path: outputs_path.display().to_string(),
                reason: e.to_string(),
            })?;

        node.exit_status = Some(output.exit_status);
        node.outputs = output.outputs;
        node.called = output.called;
        node.assign_pks(|| store.allocate_pk());
        Ok(node)
    }
}
