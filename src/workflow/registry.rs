//! # 插件注册表
//!
//! 进程级的插件注册表，按两个命名空间组织：
//! - `aiidalab_qe.configuration`：设置面板（标题与默认值）
//! - `aiidalab_qe.subworkchain`：子工作流描述（输入 schema 与 builder）
//!
//! 注册表由 `initialize` 显式填充，之后只读；每次定义工作流时通过
//! `load` 重新读取当前快照，因此重新初始化即可加入新插件。
//!
//! ## 依赖关系
//! - 被 `workflow/`, `configure/`, `commands/`, `main.rs` 使用
//! - 使用 `workflow/schema.rs`, `workflow/exit_codes.rs`, `workflow/aggregate.rs`, `models/`

use super::aggregate::FIXED_OUTPUTS;
use super::exit_codes::ExitCodeTable;
use super::request::ProcessBuilder;
use super::schema::InputSchema;
use crate::error::{QeAppError, Result};
use crate::models::{Codes, Crystal, InputParameters};

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// 设置面板命名空间
pub const PANEL_GROUP: &str = "aiidalab_qe.configuration";
/// 子工作流命名空间
pub const SUBWORKFLOW_GROUP: &str = "aiidalab_qe.subworkchain";

/// 子工作流 builder：根据代码、结构和参数构造完整的调用输入
pub type BuilderFn = fn(&Codes, &Crystal, &InputParameters) -> Result<ProcessBuilder>;

/// 子工作流描述
#[derive(Clone)]
pub struct SubWorkflowDescriptor {
    /// 子工作流入口名，如 `quantumespresso.xps`
    pub process_label: String,
    /// 日志中使用的名字，如 `XpsWorkChain`
    pub report_name: String,
    pub input_schema: InputSchema,
    pub get_builder: BuilderFn,
}

/// 设置面板描述
#[derive(Clone)]
pub struct PanelDescriptor {
    pub title: String,
    pub defaults: fn() -> Value,
}

/// 注册表条目
#[derive(Clone)]
pub enum PluginEntry {
    Panel(PanelDescriptor),
    SubWorkflow(SubWorkflowDescriptor),
}

impl PluginEntry {
    pub fn group(&self) -> &'static str {
        match self {
            PluginEntry::Panel(_) => PANEL_GROUP,
            PluginEntry::SubWorkflow(_) => SUBWORKFLOW_GROUP,
        }
    }
}

/// 注册表快照
#[derive(Clone, Default)]
pub struct PluginRegistry {
    panels: Vec<(String, PanelDescriptor)>,
    subworkflows: Vec<(String, SubWorkflowDescriptor)>,
    exit_codes: ExitCodeTable,
}

impl PluginRegistry {
    /// 从 (名字, 条目) 列表构建注册表
    ///
    /// 名字必须是小写标识符，同一命名空间内不能重复；子工作流不能与
    /// 固定输出同名，并按注册顺序分配退出码。
    pub fn new(entries: Vec<(String, PluginEntry)>) -> Result<Self> {
        let name_pattern = Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid plugin name pattern");
        let mut seen: HashSet<(&'static str, String)> = HashSet::new();
        let mut registry = PluginRegistry::default();

        for (name, entry) in entries {
            if !name_pattern.is_match(&name) {
                return Err(QeAppError::InvalidPluginName(name));
            }
            if !seen.insert((entry.group(), name.clone())) {
                return Err(QeAppError::DuplicateEntry {
                    group: entry.group().to_string(),
                    name,
                });
            }

            match entry {
                PluginEntry::Panel(panel) => registry.panels.push((name, panel)),
                PluginEntry::SubWorkflow(descriptor) => {
                    if FIXED_OUTPUTS.contains(&name.as_str()) {
                        return Err(QeAppError::ReservedPluginName(name));
                    }
                    registry.exit_codes.assign_plugin(&name)?;
                    registry.subworkflows.push((name, descriptor));
                }
            }
        }

        Ok(registry)
    }

    /// 已注册的子工作流（注册顺序）
    pub fn list_plugins(&self) -> &[(String, SubWorkflowDescriptor)] {
        &self.subworkflows
    }

    pub fn plugin(&self, name: &str) -> Option<&SubWorkflowDescriptor> {
        self.subworkflows
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
    }

    pub fn panels(&self) -> &[(String, PanelDescriptor)] {
        &self.panels
    }

    pub fn panel(&self, name: &str) -> Option<&PanelDescriptor> {
        self.panels.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn exit_codes(&self) -> &ExitCodeTable {
        &self.exit_codes
    }
}

// ─────────────────────────────────────────────────────────────
// 进程级快照
// ─────────────────────────────────────────────────────────────

static REGISTRY: RwLock<Option<Arc<PluginRegistry>>> = RwLock::new(None);

/// 用给定条目（重新）初始化进程级注册表
pub fn initialize(entries: Vec<(String, PluginEntry)>) -> Result<Arc<PluginRegistry>> {
    let registry = Arc::new(PluginRegistry::new(entries)?);
    let mut guard = REGISTRY.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(Arc::clone(&registry));
    Ok(registry)
}

/// 读取当前快照；尚未初始化时返回空注册表
pub fn load() -> Arc<PluginRegistry> {
    let guard = REGISTRY.read().unwrap_or_else(|e| e.into_inner());
    guard
        .as_ref()
        .map(Arc::clone)
        .unwrap_or_else(|| Arc::new(PluginRegistry::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Namespace;
    use serde_json::json;

    fn dummy_builder(_: &Codes, _: &Crystal, _: &InputParameters) -> Result<ProcessBuilder> {
        Ok(ProcessBuilder::new("dummy.workflow", Namespace::new()))
    }

    fn subworkflow(label: &str) -> PluginEntry {
        PluginEntry::SubWorkflow(SubWorkflowDescriptor {
            process_label: label.to_string(),
            report_name: "DummyWorkChain".to_string(),
            input_schema: InputSchema::new(),
            get_builder: dummy_builder,
        })
    }

    fn panel() -> PluginEntry {
        PluginEntry::Panel(PanelDescriptor {
            title: "Dummy".to_string(),
            defaults: || json!({}),
        })
    }

    #[test]
    fn test_registry_preserves_order_and_assigns_codes() {
        let registry = PluginRegistry::new(vec![
            ("xps".to_string(), subworkflow("quantumespresso.xps")),
            ("xps".to_string(), panel()),
            ("eos".to_string(), subworkflow("qeapp.eos")),
        ])
        .unwrap();

        let names: Vec<&str> = registry.list_plugins().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["xps", "eos"]);
        assert_eq!(registry.exit_codes().for_stage("xps").unwrap().status, 405);
        assert_eq!(registry.exit_codes().for_stage("eos").unwrap().status, 406);
        assert!(registry.panel("xps").is_some());
        assert!(registry.panel("eos").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates_and_bad_names() {
        let err = PluginRegistry::new(vec![
            ("eos".to_string(), subworkflow("a")),
            ("eos".to_string(), subworkflow("b")),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, QeAppError::DuplicateEntry { .. }));

        let err = PluginRegistry::new(vec![("Bad-Name".to_string(), panel())])
            .err()
            .unwrap();
        assert!(matches!(err, QeAppError::InvalidPluginName(_)));
    }

    #[test]
    fn test_registry_rejects_fixed_output_names() {
        for name in ["structure", "dos", "band_parameters", "projections"] {
            let err = PluginRegistry::new(vec![(name.to_string(), subworkflow("test.shadow"))])
                .err()
                .unwrap();
            assert!(matches!(err, QeAppError::ReservedPluginName(ref n) if n == name));
        }

        // 面板不产生输出，可以同名
        assert!(PluginRegistry::new(vec![("dos".to_string(), panel())]).is_ok());
    }

    #[test]
    fn test_initialize_replaces_snapshot() {
        initialize(vec![("eos".to_string(), subworkflow("qeapp.eos"))]).unwrap();
        assert_eq!(load().list_plugins().len(), 1);

        initialize(vec![
            ("eos".to_string(), subworkflow("qeapp.eos")),
            ("xps".to_string(), subworkflow("quantumespresso.xps")),
        ])
        .unwrap();
        assert_eq!(load().list_plugins().len(), 2);
    }
}
