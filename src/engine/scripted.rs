//! # 回放引擎（测试用）
//!
//! 按链接标签回放预设的过程节点，并记录每一次提交，便于断言
//! 哪些阶段被提交、提交时的输入是什么。
//!
//! ## 依赖关系
//! - 被 `workflow/` 下的测试使用

use super::{Engine, ProcessHandle, Submission};
use crate::error::{QeAppError, Result};
use crate::models::{Data, ProcessNode, ProcessState, ProcessType, RemoteFolder};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct ScriptedEngine {
    nodes: Mutex<HashMap<String, ProcessNode>>,
    rejected: Mutex<HashSet<String>>,
    submissions: Mutex<Vec<Submission>>,
    next_pk: AtomicU64,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        ScriptedEngine {
            next_pk: AtomicU64::new(100),
            ..Default::default()
        }
    }

    /// 预设某个链接标签返回的节点；未预设的提交返回空输出的成功节点
    pub fn script(self, link_label: &str, node: ProcessNode) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .insert(link_label.to_string(), node);
        self
    }

    /// 让某个链接标签的提交直接失败
    pub fn reject(self, link_label: &str) -> Self {
        self.rejected.lock().unwrap().insert(link_label.to_string());
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitted_labels(&self) -> Vec<String> {
        self.submissions()
            .into_iter()
            .map(|s| s.link_label)
            .collect()
    }

    pub fn submission(&self, link_label: &str) -> Option<Submission> {
        self.submissions()
            .into_iter()
            .find(|s| s.link_label == link_label)
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn allocate_pk(&self) -> u64 {
        self.next_pk.fetch_add(1, Ordering::Relaxed)
    }

    fn submit(&self, submission: Submission) -> Result<Box<dyn ProcessHandle>> {
        if self.rejected.lock().unwrap().contains(&submission.link_label) {
            return Err(QeAppError::CommandFailed {
                command: "scripted".to_string(),
                stderr: format!("submission of {} rejected", submission.link_label),
            });
        }

        let pk = self.allocate_pk();
        let mut node = self
            .nodes
            .lock()
            .unwrap()
            .get(&submission.link_label)
            .cloned()
            .unwrap_or_else(|| ok_node(&submission.link_label));
        node.pk = pk;
        node.link_label = submission.link_label.clone();
        node.process_label = submission.process_label.clone();
        node.assign_pks(|| self.allocate_pk());

        self.submissions.lock().unwrap().push(submission);
        Ok(Box::new(ScriptedHandle { node }))
    }
}

struct ScriptedHandle {
    node: ProcessNode,
}

impl ProcessHandle for ScriptedHandle {
    fn pk(&self) -> u64 {
        self.node.pk
    }

    fn wait(&mut self) -> Result<ProcessNode> {
        Ok(self.node.clone())
    }
}

// ─────────────────────────────────────────────────────────────
// 节点构造
// ─────────────────────────────────────────────────────────────

pub fn ok_node(link_label: &str) -> ProcessNode {
    ProcessNode::new(0, link_label, "")
}

pub fn failed_node(link_label: &str, exit_status: i32) -> ProcessNode {
    let mut node = ok_node(link_label);
    node.exit_status = Some(exit_status);
    node
}

pub fn excepted_node(link_label: &str) -> ProcessNode {
    let mut node = ok_node(link_label);
    node.state = ProcessState::Excepted;
    node.exit_status = None;
    node
}

/// 带远程目录输出的 calcjob 子节点
pub fn calcjob(link_label: &str, remote: &Path) -> ProcessNode {
    let mut node = ok_node(link_label);
    node.process_type = ProcessType::CalcJob;
    node.outputs.insert(
        "remote_folder",
        Data::RemoteFolder(RemoteFolder::new("localhost", remote)),
    );
    node
}

pub fn with_output(mut node: ProcessNode, name: &str, data: Data) -> ProcessNode {
    node.outputs.insert(name, data);
    node
}

pub fn with_child(mut node: ProcessNode, child: ProcessNode) -> ProcessNode {
    node.called.push(child);
    node
}

pub fn dict(value: serde_json::Value) -> Data {
    Data::dict(value).expect("json object")
}
