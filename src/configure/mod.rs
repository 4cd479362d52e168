//! # 参数收集模块
//!
//! 把内置分区（workflow, basic, advanced）和注册表中的插件面板组合成
//! 一个表单，负责参数文档与 `InputParameters` 之间的转换：
//! - `get_input_parameters`: 导出完整参数文档
//! - `set_input_parameters`: 载入（部分）参数文档
//! - `into_parameters`: 得到类型化的 `InputParameters`
//!
//! ## 依赖关系
//! - 被 `commands/run.rs`, `commands/defaults.rs` 使用
//! - 使用 `workflow/registry.rs`, `models/parameters.rs`
//! - 子模块: panels

pub mod panels;

pub use panels::{Panel, PluginSettings, SettingsPanel};

use crate::error::{QeAppError, Result};
use crate::models::parameters::{AdvancedSettings, BasicSettings, PwSettings, WorkflowSettings};
use crate::models::{Codes, InputParameters, Protocol};
use crate::workflow::registry::PluginRegistry;

use serde_json::{Map, Value};

/// 设置表单
#[derive(Debug, Clone)]
pub struct ConfigurationForm {
    panels: Vec<SettingsPanel>,
    codes: Codes,
}

impl ConfigurationForm {
    /// 默认值表单：每个已注册的子工作流在 workflow 分区中有一个关闭的性质
    pub fn new(registry: &PluginRegistry) -> Self {
        let mut workflow = WorkflowSettings::default();
        for (name, _) in registry.list_plugins() {
            workflow.properties.entry(name.clone()).or_insert(false);
        }

        let mut panels = vec![
            SettingsPanel::Workflow(workflow),
            SettingsPanel::Basic(BasicSettings::default()),
            SettingsPanel::Advanced(AdvancedSettings::default()),
        ];
        for (name, panel) in registry.panels() {
            panels.push(SettingsPanel::Plugin(PluginSettings {
                name: name.clone(),
                title: panel.title.clone(),
                values: (panel.defaults)(),
            }));
        }

        ConfigurationForm {
            panels,
            codes: Codes::new(),
        }
    }

    /// 以某个协议的预设作为 basic 与 advanced 的初值
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        for panel in &mut self.panels {
            match panel {
                SettingsPanel::Basic(basic) => basic.protocol = protocol,
                SettingsPanel::Advanced(advanced) => advanced.pw = PwSettings::from_protocol(protocol),
                _ => {}
            }
        }
        self
    }

    pub fn panels(&self) -> &[SettingsPanel] {
        &self.panels
    }

    pub fn get_input_parameters(&self) -> Value {
        let mut doc = Map::new();
        for panel in &self.panels {
            doc.insert(panel.name().to_string(), panel.get_values());
        }
        let codes = self
            .codes
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        doc.insert("codes".to_string(), Value::Object(codes));
        Value::Object(doc)
    }

    /// 载入参数文档；未知分区按插件分区保留
    pub fn set_input_parameters(&mut self, doc: &Value) -> Result<()> {
        let Some(sections) = doc.as_object() else {
            return Err(QeAppError::InvalidParameters(
                "parameters document must be a JSON object".to_string(),
            ));
        };

        for (key, values) in sections {
            let key = if key == "advance" { "advanced" } else { key.as_str() };
            if key == "codes" {
                let codes: Codes = serde_json::from_value(values.clone())
                    .map_err(|e| QeAppError::InvalidParameters(format!("codes: {}", e)))?;
                self.codes.extend(codes);
                continue;
            }
            match self.panels.iter_mut().find(|p| p.name() == key) {
                Some(panel) => panel.load_values(values)?,
                None => {
                    tracing::debug!("section '{}' has no panel, keeping it as plugin settings", key);
                    self.panels.push(SettingsPanel::Plugin(PluginSettings {
                        name: key.to_string(),
                        title: key.to_string(),
                        values: values.clone(),
                    }));
                }
            }
        }
        Ok(())
    }

    pub fn into_parameters(self) -> Result<InputParameters> {
        let doc = self.get_input_parameters();
        serde_json::from_value(doc).map_err(|e| QeAppError::InvalidParameters(e.to_string()))
    }
}
