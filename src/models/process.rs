//! # 子过程节点模型
//!
//! 记录一个已提交子过程的终态：exit status、输出命名空间以及
//! 它调用的子节点（calcjob 的远程目录在清理时使用）。
//!
//! ## 依赖关系
//! - 被 `engine/`, `workflow/` 使用
//! - 使用 `models/namespace.rs`, `models/data.rs`

use super::data::RemoteFolder;
use super::namespace::Namespace;

use serde::{Deserialize, Serialize};
use std::fmt;

/// 过程类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    WorkChain,
    CalcJob,
}

impl Default for ProcessType {
    fn default() -> Self {
        ProcessType::CalcJob
    }
}

/// 过程终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Finished,
    Excepted,
    Killed,
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::Finished
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Finished => write!(f, "finished"),
            ProcessState::Excepted => write!(f, "excepted"),
            ProcessState::Killed => write!(f, "killed"),
        }
    }
}

/// 子过程节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessNode {
    /// 0 表示尚未分配，由引擎在读取 launcher 输出时补齐
    #[serde(default)]
    pub pk: u64,

    /// 调用链接标签（`relax`, `scf`, 插件名...）
    #[serde(default)]
    pub link_label: String,

    /// 子工作流入口名，如 `quantumespresso.pw.bands`
    #[serde(default)]
    pub process_label: String,

    #[serde(default)]
    pub process_type: ProcessType,

    #[serde(default)]
    pub state: ProcessState,

    #[serde(default)]
    pub exit_status: Option<i32>,

    #[serde(default)]
    pub outputs: Namespace,

    #[serde(default)]
    pub called: Vec<ProcessNode>,
}

impl ProcessNode {
    pub fn new(pk: u64, link_label: impl Into<String>, process_label: impl Into<String>) -> Self {
        ProcessNode {
            pk,
            link_label: link_label.into(),
            process_label: process_label.into(),
            process_type: ProcessType::WorkChain,
            state: ProcessState::Finished,
            exit_status: Some(0),
            outputs: Namespace::new(),
            called: Vec::new(),
        }
    }

    /// 终态为 finished 且 exit status 为 0
    pub fn is_finished_ok(&self) -> bool {
        self.state == ProcessState::Finished && self.exit_status == Some(0)
    }

    /// 唯一一个带有该链接标签的直接子节点；零个或多个时返回 None
    pub fn get_outgoing(&self, link_label: &str) -> Option<&ProcessNode> {
        let mut matches = self.called.iter().filter(|c| c.link_label == link_label);
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    /// `outputs.remote_folder`
    pub fn remote_folder(&self) -> Option<&RemoteFolder> {
        self.outputs
            .get_value("remote_folder")
            .and_then(|d| d.as_remote_folder())
    }

    /// 本节点之下的所有后代（深度优先，不含自身）
    pub fn called_descendants(&self) -> Vec<&ProcessNode> {
        let mut out = Vec::new();
        for child in &self.called {
            out.push(child);
            out.extend(child.called_descendants());
        }
        out
    }

    /// 为尚未分配 pk 的子节点分配 pk
    pub fn assign_pks(&mut self, mut next_pk: impl FnMut() -> u64) {
        fn walk(node: &mut ProcessNode, next_pk: &mut dyn FnMut() -> u64) {
            for child in &mut node.called {
                if child.pk == 0 {
                    child.pk = next_pk();
                }
                walk(child, next_pk);
            }
        }
        walk(self, &mut next_pk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Data;

    fn calc(label: &str, path: &str) -> ProcessNode {
        let mut node = ProcessNode::new(0, label, "quantumespresso.pw");
        node.process_type = ProcessType::CalcJob;
        node.outputs.insert(
            "remote_folder",
            Data::RemoteFolder(RemoteFolder::new("localhost", path)),
        );
        node
    }

    #[test]
    fn test_is_finished_ok() {
        let mut node = ProcessNode::new(1, "bands", "quantumespresso.pw.bands");
        assert!(node.is_finished_ok());

        node.exit_status = Some(378);
        assert!(!node.is_finished_ok());

        node.exit_status = Some(0);
        node.state = ProcessState::Excepted;
        assert!(!node.is_finished_ok());
    }

    #[test]
    fn test_get_outgoing_requires_single_match() {
        let mut node = ProcessNode::new(1, "bands", "quantumespresso.pw.bands");
        node.called.push(calc("scf", "/scratch/scf"));
        node.called.push(calc("bands", "/scratch/bands"));

        let scf = node.get_outgoing("scf").unwrap();
        assert_eq!(scf.remote_folder().unwrap().path.to_str(), Some("/scratch/scf"));

        node.called.push(calc("scf", "/scratch/scf-2"));
        assert!(node.get_outgoing("scf").is_none());
    }

    #[test]
    fn test_assign_pks_and_descendants() {
        let mut base = ProcessNode::new(0, "scf", "quantumespresso.pw.base");
        base.called.push(calc("iteration_01", "/scratch/a"));
        let mut node = ProcessNode::new(10, "bands", "quantumespresso.pw.bands");
        node.called.push(base);
        node.called.push(calc("bands", "/scratch/b"));

        let mut counter = 10;
        node.assign_pks(|| {
            counter += 1;
            counter
        });

        let pks: Vec<u64> = node.called_descendants().iter().map(|n| n.pk).collect();
        assert_eq!(pks, vec![11, 12, 13]);
    }
}
