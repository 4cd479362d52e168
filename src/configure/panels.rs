//! # 设置面板
//!
//! 每个面板持有参数文档中的一个分区，通过 `get_values` 导出为 JSON、
//! 通过 `load_values` 从 JSON 载入。载入是增量的：文档中缺少的键
//! 保持面板的当前值。
//!
//! ## 依赖关系
//! - 被 `configure/mod.rs` 使用
//! - 使用 `models/parameters.rs`, `workflow/protocol.rs`

use crate::error::{QeAppError, Result};
use crate::models::parameters::{AdvancedSettings, BasicSettings, WorkflowSettings};
use crate::workflow::protocol::merge_json;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// 参数文档中一个分区的编辑器
pub trait Panel {
    /// 分区名（参数文档中的键）
    fn name(&self) -> &str;

    fn get_values(&self) -> Value;

    fn load_values(&mut self, values: &Value) -> Result<()>;
}

/// 把 `values` 合并到当前值上再反序列化
fn load_merged<T: Serialize + DeserializeOwned>(section: &str, current: &T, values: &Value) -> Result<T> {
    if !values.is_object() {
        return Err(QeAppError::InvalidParameters(format!(
            "section '{}' must be an object",
            section
        )));
    }
    let mut merged = serde_json::to_value(current)?;
    merge_json(&mut merged, values);
    serde_json::from_value(merged)
        .map_err(|e| QeAppError::InvalidParameters(format!("{}: {}", section, e)))
}

/// 插件面板：标题加上一个不透明的 JSON 对象
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSettings {
    pub name: String,
    pub title: String,
    pub values: Value,
}

/// 设置面板
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsPanel {
    Workflow(WorkflowSettings),
    Basic(BasicSettings),
    Advanced(AdvancedSettings),
    Plugin(PluginSettings),
}

impl SettingsPanel {
    pub fn title(&self) -> &str {
        match self {
            SettingsPanel::Workflow(_) => "Workflow",
            SettingsPanel::Basic(_) => "Basic Settings",
            SettingsPanel::Advanced(_) => "Advanced Settings",
            SettingsPanel::Plugin(plugin) => &plugin.title,
        }
    }
}

impl Panel for SettingsPanel {
    fn name(&self) -> &str {
        match self {
            SettingsPanel::Workflow(_) => "workflow",
            SettingsPanel::Basic(_) => "basic",
            SettingsPanel::Advanced(_) => "advanced",
            SettingsPanel::Plugin(plugin) => &plugin.name,
        }
    }

    fn get_values(&self) -> Value {
        let values = match self {
            SettingsPanel::Workflow(settings) => serde_json::to_value(settings),
            SettingsPanel::Basic(settings) => serde_json::to_value(settings),
            SettingsPanel::Advanced(settings) => serde_json::to_value(settings),
            SettingsPanel::Plugin(plugin) => Ok(plugin.values.clone()),
        };
        values.unwrap_or(Value::Null)
    }

    fn load_values(&mut self, values: &Value) -> Result<()> {
        match self {
            SettingsPanel::Workflow(settings) => {
                *settings = load_merged("workflow", settings, values)?;
            }
            SettingsPanel::Basic(settings) => {
                *settings = load_merged("basic", settings, values)?;
            }
            SettingsPanel::Advanced(settings) => {
                *settings = load_merged("advanced", settings, values)?;
            }
            SettingsPanel::Plugin(plugin) => {
                let name = plugin.name.clone();
                plugin.values = load_merged(&name, &plugin.values, values)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parameters::SpinType;
    use crate::models::Protocol;
    use serde_json::json;

    #[test]
    fn test_basic_panel_partial_load() {
        let mut panel = SettingsPanel::Basic(BasicSettings::default());
        panel
            .load_values(&json!({"protocol": "precise", "spin_type": "collinear"}))
            .unwrap();
        match &panel {
            SettingsPanel::Basic(settings) => {
                assert_eq!(settings.protocol, Protocol::Precise);
                assert_eq!(settings.spin_type, SpinType::Collinear);
            }
            other => panic!("unexpected panel: {:?}", other),
        }
        assert_eq!(panel.get_values()["electronic_type"], json!("metal"));
    }

    #[test]
    fn test_panel_values_round_trip() {
        let mut advanced = AdvancedSettings::default();
        advanced.pw.degauss = 0.02;
        let source = SettingsPanel::Advanced(advanced);

        let mut target = SettingsPanel::Advanced(AdvancedSettings::default());
        target.load_values(&source.get_values()).unwrap();
        assert_eq!(target, source);
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let mut panel = SettingsPanel::Basic(BasicSettings::default());
        let err = panel.load_values(&json!({"protocol": "sloppy"})).unwrap_err();
        assert!(err.to_string().contains("basic"));
        assert!(panel.load_values(&json!(["fast"])).is_err());
        assert_eq!(panel, SettingsPanel::Basic(BasicSettings::default()));
    }

    #[test]
    fn test_plugin_panel_merges_keys() {
        let mut panel = SettingsPanel::Plugin(PluginSettings {
            name: "eos".to_string(),
            title: "Equation of State (EOS)".to_string(),
            values: json!({"scale_count": 7, "scale_increment": 0.02}),
        });
        panel.load_values(&json!({"scale_count": 9})).unwrap();
        assert_eq!(
            panel.get_values(),
            json!({"scale_count": 9, "scale_increment": 0.02})
        );
        assert_eq!(panel.name(), "eos");
        assert_eq!(panel.title(), "Equation of State (EOS)");
    }
}
