//! # 工作流参数模型
//!
//! 参数收集边界上的类型化参数：结构优化方式、电子/自旋类型、
//! 计算精度协议、高级 pw 设置以及代码标签。
//!
//! 参数文档的 JSON 布局：
//! ```text
//! {
//!   "workflow": {"relax_type": "positions_cell", "properties": {"bands": true, "pdos": false}},
//!   "basic":    {"protocol": "moderate", "electronic_type": "metal", "spin_type": "none"},
//!   "advanced": {"pseudo_family": "SSSP/1.3/PBEsol/efficiency",
//!                "pw": {"kpoints_distance": 0.15, "degauss": 0.01, "smearing": "cold"}},
//!   "codes":    {"pw_code": "pw@localhost", "dos_code": "...", "projwfc_code": "..."},
//!   "<plugin>": {...}
//! }
//! ```
//!
//! ## 依赖关系
//! - 被 `configure/`, `workflow/protocol.rs`, `plugins/` 使用
//! - 无外部模块依赖

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// 代码标签表，键为 `pw_code`, `dos_code`, `projwfc_code` 等
pub type Codes = BTreeMap<String, String>;

/// 默认赝势族
pub const DEFAULT_PSEUDO_FAMILY: &str = "SSSP/1.3/PBEsol/efficiency";

// ─────────────────────────────────────────────────────────────
// 枚举类型
// ─────────────────────────────────────────────────────────────

/// 结构优化的自由度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaxType {
    /// 结构保持不变，只做自洽计算
    None,
    /// 只优化原子坐标
    Positions,
    /// 同时优化原子坐标和晶胞
    PositionsCell,
}

impl RelaxType {
    /// 对应 pw.x 的 `CONTROL.calculation`
    pub fn calculation(&self) -> Option<&'static str> {
        match self {
            RelaxType::None => None,
            RelaxType::Positions => Some("relax"),
            RelaxType::PositionsCell => Some("vc-relax"),
        }
    }
}

impl fmt::Display for RelaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaxType::None => write!(f, "none"),
            RelaxType::Positions => write!(f, "positions"),
            RelaxType::PositionsCell => write!(f, "positions_cell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectronicType {
    Metal,
    Insulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinType {
    None,
    Collinear,
}

/// 计算精度协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Fast, low-precision defaults
    Fast,
    /// Trade-off between accuracy and speed
    Moderate,
    /// Best accuracy at higher cost
    Precise,
}

/// 协议预设的数值参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolPreset {
    /// SCF k 点间距 (1/Å)
    pub kpoints_distance: f64,
    /// 展宽宽度 (Ry)
    pub degauss: f64,
    pub smearing: &'static str,
    /// 电子自洽收敛阈值（每原子）
    pub conv_thr_per_atom: f64,
}

impl Protocol {
    pub fn preset(&self) -> ProtocolPreset {
        match self {
            Protocol::Fast => ProtocolPreset {
                kpoints_distance: 0.50,
                degauss: 0.0275,
                smearing: "cold",
                conv_thr_per_atom: 4e-10,
            },
            Protocol::Moderate => ProtocolPreset {
                kpoints_distance: 0.15,
                degauss: 0.01,
                smearing: "cold",
                conv_thr_per_atom: 2e-10,
            },
            Protocol::Precise => ProtocolPreset {
                kpoints_distance: 0.10,
                degauss: 0.0075,
                smearing: "cold",
                conv_thr_per_atom: 1e-10,
            },
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Fast => write!(f, "fast"),
            Protocol::Moderate => write!(f, "moderate"),
            Protocol::Precise => write!(f, "precise"),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// 各设置分区
// ─────────────────────────────────────────────────────────────

/// workflow 分区：结构优化方式与需要计算的性质
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    pub relax_type: RelaxType,
    /// 性质名 -> 是否计算（`bands`, `pdos` 以及各插件名）
    #[serde(default)]
    pub properties: BTreeMap<String, bool>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        let properties = [("bands", false), ("pdos", false)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        WorkflowSettings {
            relax_type: RelaxType::PositionsCell,
            properties,
        }
    }
}

impl WorkflowSettings {
    pub fn property(&self, name: &str) -> bool {
        self.properties.get(name).copied().unwrap_or(false)
    }
}

/// basic 分区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicSettings {
    pub protocol: Protocol,
    pub electronic_type: ElectronicType,
    pub spin_type: SpinType,
}

impl Default for BasicSettings {
    fn default() -> Self {
        BasicSettings {
            protocol: Protocol::Moderate,
            electronic_type: ElectronicType::Metal,
            spin_type: SpinType::None,
        }
    }
}

/// 高级 pw 设置：k 点密度与展宽
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwSettings {
    pub kpoints_distance: f64,
    pub degauss: f64,
    pub smearing: String,
}

impl PwSettings {
    pub fn from_protocol(protocol: Protocol) -> Self {
        let preset = protocol.preset();
        PwSettings {
            kpoints_distance: preset.kpoints_distance,
            degauss: preset.degauss,
            smearing: preset.smearing.to_string(),
        }
    }
}

/// advanced 分区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default)]
    pub pseudo_family: Option<String>,
    pub pw: PwSettings,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        AdvancedSettings {
            pseudo_family: Some(DEFAULT_PSEUDO_FAMILY.to_string()),
            pw: PwSettings::from_protocol(Protocol::Moderate),
        }
    }
}

impl AdvancedSettings {
    /// PwBaseWorkChain 风格的 overrides：
    /// `{kpoints_distance, pseudo_family, pw: {parameters: {SYSTEM: {degauss, smearing}}}}`
    pub fn pw_overrides(&self) -> Value {
        let mut overrides = json!({
            "kpoints_distance": self.pw.kpoints_distance,
            "pw": {
                "parameters": {
                    "SYSTEM": {
                        "degauss": self.pw.degauss,
                        "smearing": self.pw.smearing,
                    }
                }
            }
        });
        if let (Some(family), Some(map)) = (&self.pseudo_family, overrides.as_object_mut()) {
            map.insert("pseudo_family".to_string(), json!(family));
        }
        overrides
    }
}

/// 收集完成的全部参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputParameters {
    #[serde(default)]
    pub workflow: WorkflowSettings,
    #[serde(default)]
    pub basic: BasicSettings,
    #[serde(default, alias = "advance")]
    pub advanced: AdvancedSettings,
    #[serde(default)]
    pub codes: Codes,
    /// 插件专属分区，键为插件名
    #[serde(flatten)]
    pub plugins: BTreeMap<String, Value>,
}

impl InputParameters {
    /// 插件分区（对象）；不存在或不是对象时返回空表
    pub fn plugin_section(&self, name: &str) -> Map<String, Value> {
        self.plugins
            .get(name)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_moderate_protocol() {
        let params = InputParameters::default();
        assert_eq!(params.basic.protocol, Protocol::Moderate);
        assert_eq!(params.workflow.relax_type, RelaxType::PositionsCell);
        assert!(!params.workflow.property("bands"));
        assert!((params.advanced.pw.kpoints_distance - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_parse_document_with_plugin_section() {
        let doc = json!({
            "workflow": {"relax_type": "positions", "properties": {"bands": true, "eos": true}},
            "basic": {"protocol": "fast", "electronic_type": "insulator", "spin_type": "collinear"},
            "advance": {"pseudo_family": "SSSP/1.3/PBE/precision",
                        "pw": {"kpoints_distance": 0.3, "degauss": 0.02, "smearing": "gaussian"}},
            "codes": {"pw_code": "pw@localhost"},
            "eos": {"scale_count": 5}
        });
        let params: InputParameters = serde_json::from_value(doc).unwrap();

        assert_eq!(params.workflow.relax_type, RelaxType::Positions);
        assert!(params.workflow.property("eos"));
        assert_eq!(params.basic.electronic_type, ElectronicType::Insulator);
        assert_eq!(params.codes["pw_code"], "pw@localhost");
        assert_eq!(params.plugin_section("eos")["scale_count"], json!(5));
        assert!(params.plugin_section("xps").is_empty());
    }

    #[test]
    fn test_pw_overrides_layout() {
        let advanced = AdvancedSettings::default();
        let overrides = advanced.pw_overrides();
        assert_eq!(overrides["kpoints_distance"], json!(0.15));
        assert_eq!(overrides["pw"]["parameters"]["SYSTEM"]["smearing"], json!("cold"));
        assert_eq!(overrides["pseudo_family"], json!(DEFAULT_PSEUDO_FAMILY));
    }

    #[test]
    fn test_relax_type_calculation() {
        assert_eq!(RelaxType::None.calculation(), None);
        assert_eq!(RelaxType::Positions.calculation(), Some("relax"));
        assert_eq!(RelaxType::PositionsCell.calculation(), Some("vc-relax"));
    }
}
