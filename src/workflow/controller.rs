//! # 阶段控制器
//!
//! 固定的阶段大纲 `relax -> bands -> pdos -> 插件...` 以及各阶段的
//! 执行条件：阶段命名空间出现在请求中才会运行。跳过某个阶段不影响
//! 后续阶段的资格。
//!
//! ## 依赖关系
//! - 被 `workflow/executor.rs`, `workflow/inspector.rs`, `workflow/orchestrator.rs` 使用
//! - 使用 `workflow/request.rs`, `workflow/registry.rs`

use super::registry::PluginRegistry;
use super::request::{WorkflowRequest, BANDS, PDOS, RELAX};

use std::fmt;

/// 工作流阶段
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    Relax,
    Bands,
    Pdos,
    Plugin(String),
}

impl Stage {
    /// 阶段名，同时是请求中的命名空间名和调用链接标签
    pub fn name(&self) -> &str {
        match self {
            Stage::Relax => RELAX,
            Stage::Bands => BANDS,
            Stage::Pdos => PDOS,
            Stage::Plugin(name) => name,
        }
    }

    /// 子工作流入口名
    pub fn process_label(&self, registry: &PluginRegistry) -> Option<String> {
        match self {
            Stage::Relax => Some("quantumespresso.pw.relax".to_string()),
            Stage::Bands => Some("quantumespresso.pw.bands".to_string()),
            Stage::Pdos => Some("quantumespresso.pdos".to_string()),
            Stage::Plugin(name) => registry.plugin(name).map(|d| d.process_label.clone()),
        }
    }

    /// 日志中的子工作流名
    pub fn report_name(&self, registry: &PluginRegistry) -> String {
        match self {
            Stage::Relax => "PwRelaxWorkChain".to_string(),
            Stage::Bands => "PwBandsWorkChain".to_string(),
            Stage::Pdos => "PdosWorkChain".to_string(),
            Stage::Plugin(name) => registry
                .plugin(name)
                .map(|d| d.report_name.clone())
                .unwrap_or_else(|| name.clone()),
        }
    }

    pub fn is_plugin(&self) -> bool {
        matches!(self, Stage::Plugin(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 阶段大纲与执行条件
pub struct StageController<'a> {
    request: &'a WorkflowRequest,
    registry: &'a PluginRegistry,
}

impl<'a> StageController<'a> {
    pub fn new(request: &'a WorkflowRequest, registry: &'a PluginRegistry) -> Self {
        StageController { request, registry }
    }

    /// 固定大纲：内置阶段在前，插件按注册顺序
    pub fn outline(&self) -> Vec<Stage> {
        let mut stages = vec![Stage::Relax, Stage::Bands, Stage::Pdos];
        stages.extend(
            self.registry
                .list_plugins()
                .iter()
                .map(|(name, _)| Stage::Plugin(name.clone())),
        );
        stages
    }

    pub fn should_run(&self, stage: &Stage) -> bool {
        self.request.has_stage(stage.name())
    }

    /// 请求中启用的插件阶段（注册顺序）
    pub fn enabled_plugins(&self) -> Vec<Stage> {
        self.outline()
            .into_iter()
            .filter(|s| s.is_plugin() && self.should_run(s))
            .collect()
    }
}
