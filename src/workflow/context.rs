//! # 阶段上下文
//!
//! 一次运行中可变的执行状态。上下文按值在阶段函数之间传递，
//! 每个阶段函数返回更新后的上下文交给下一个阶段；结构和能带数只会
//! 向后传播。
//!
//! ## 依赖关系
//! - 被 `workflow/executor.rs`, `workflow/inspector.rs`, `workflow/orchestrator.rs` 使用
//! - 使用 `engine/`, `models/`

use crate::engine::ProcessHandle;
use crate::models::{Crystal, ProcessNode, RemoteFolder};

use std::collections::BTreeMap;

pub struct StageContext {
    /// 当前结构；relax 之后为优化结构，bands 之后为原胞
    pub current_structure: Crystal,
    /// relax 报告的能带数
    pub current_number_of_bands: Option<u64>,
    /// bands 中 scf 计算的远程目录，供 pdos 复用
    pub scf_parent_folder: Option<RemoteFolder>,
    running: BTreeMap<String, Box<dyn ProcessHandle>>,
    finished: Vec<(String, ProcessNode)>,
}

impl StageContext {
    pub fn new(structure: Crystal) -> Self {
        StageContext {
            current_structure: structure,
            current_number_of_bands: None,
            scf_parent_folder: None,
            running: BTreeMap::new(),
            finished: Vec::new(),
        }
    }

    /// 登记一个已提交的句柄
    pub fn with_running(mut self, stage: &str, handle: Box<dyn ProcessHandle>) -> Self {
        self.running.insert(stage.to_string(), handle);
        self
    }

    pub fn take_running(&mut self, stage: &str) -> Option<Box<dyn ProcessHandle>> {
        self.running.remove(stage)
    }

    pub fn record_finished(&mut self, stage: &str, node: ProcessNode) {
        self.finished.push((stage.to_string(), node));
    }

    pub fn finished(&self, stage: &str) -> Option<&ProcessNode> {
        self.finished
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, node)| node)
    }

    /// 按完成顺序排列的全部阶段节点
    pub fn finished_nodes(&self) -> impl Iterator<Item = &ProcessNode> {
        self.finished.iter().map(|(_, node)| node)
    }
}
