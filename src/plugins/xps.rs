//! # xps 插件
//!
//! X 射线光电子能谱：对选定元素分别做芯空穴（core-hole）scf，
//! 可选计算结合能。
//!
//! 参数分区 `xps`：
//! ```text
//! {"core_hole_treatment": "full", "pseudo_group": "core_hole",
//!  "elements_list": ["C_1s", "O"], "structure_type": "crystal",
//!  "supercell_min_parameter": 8.0, "calc_binding_energy": true,
//!  "correction_energies": "C:339.79,O:668.22"}
//! ```
//! `elements_list` 的每一项为赝势标签，`_` 之前是元素符号；为空时计算
//! 结构中的全部元素。`correction_energies` 既可以是对象也可以是
//! `元素:能量` 的逗号分隔文本。
//!
//! ## 依赖关系
//! - 被 `plugins/mod.rs` 使用
//! - 使用 `workflow/protocol.rs` 的 `PwBuilder`

use crate::error::{QeAppError, Result};
use crate::models::{Codes, Crystal, Data, DataKind, InputParameters, Namespace};
use crate::workflow::protocol::{require_code, PwBuilder};
use crate::workflow::registry::{PanelDescriptor, SubWorkflowDescriptor};
use crate::workflow::request::ProcessBuilder;
use crate::workflow::schema::InputSchema;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const PROCESS_LABEL: &str = "quantumespresso.xps";

/// 芯空穴处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreHoleTreatment {
    /// 移除一个完整的芯电子
    Full,
    /// 移除半个芯电子（过渡态近似）
    Half,
    /// 激发电子放入最低导带，固定占据
    XchFixed,
    /// 激发电子放入最低导带，展宽占据
    #[default]
    XchSmear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    Molecule,
    #[default]
    Crystal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpsSettings {
    pub core_hole_treatment: CoreHoleTreatment,
    pub pseudo_group: String,
    pub elements_list: Vec<String>,
    pub structure_type: StructureType,
    /// 超胞最短边长 (Å)
    pub supercell_min_parameter: f64,
    pub calc_binding_energy: bool,
    /// 元素 -> 结合能修正 (eV)
    pub correction_energies: BTreeMap<String, f64>,
}

impl Default for XpsSettings {
    fn default() -> Self {
        XpsSettings {
            core_hole_treatment: CoreHoleTreatment::default(),
            pseudo_group: "core_hole".to_string(),
            elements_list: Vec::new(),
            structure_type: StructureType::Crystal,
            supercell_min_parameter: 8.0,
            calc_binding_energy: false,
            correction_energies: BTreeMap::new(),
        }
    }
}

impl XpsSettings {
    pub fn from_parameters(parameters: &InputParameters) -> Result<Self> {
        let mut section = parameters.plugin_section("xps");
        if let Some(Value::String(text)) = section.get("correction_energies") {
            let table = parse_correction_energies(text)?;
            section.insert("correction_energies".to_string(), json!(table));
        }
        let settings: XpsSettings = serde_json::from_value(Value::Object(section))
            .map_err(|e| QeAppError::InvalidParameters(format!("xps: {}", e)))?;

        if settings.supercell_min_parameter <= 0.0 {
            return Err(QeAppError::InvalidParameters(format!(
                "xps: supercell_min_parameter must be positive, got {}",
                settings.supercell_min_parameter
            )));
        }
        if settings.pseudo_group.trim().is_empty() {
            return Err(QeAppError::InvalidParameters(
                "xps: pseudo_group must not be empty".to_string(),
            ));
        }
        Ok(settings)
    }

    /// (赝势标签, 元素) 列表；标签的元素必须出现在结构中
    fn selected_elements(&self, structure: &Crystal) -> Result<Vec<(String, String)>> {
        let present = structure.elements();
        if self.elements_list.is_empty() {
            return Ok(present
                .into_iter()
                .map(|el| (el.to_string(), el.to_string()))
                .collect());
        }

        let mut selected = Vec::new();
        for label in &self.elements_list {
            let element = label.split('_').next().unwrap_or_default();
            if !present.contains(&element) {
                return Err(QeAppError::InvalidParameters(format!(
                    "xps: element '{}' (from '{}') is not in structure '{}'",
                    element, label, structure.name
                )));
            }
            selected.push((label.clone(), element.to_string()));
        }
        Ok(selected)
    }
}

/// 解析 `C:339.79,O:668.22`
pub fn parse_correction_energies(text: &str) -> Result<BTreeMap<String, f64>> {
    let mut table = BTreeMap::new();
    for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = item
            .split_once(':')
            .and_then(|(el, value)| Some((el.trim(), value.trim().parse::<f64>().ok()?)));
        match parsed {
            Some((el, value)) if !el.is_empty() => {
                table.insert(el.to_string(), value);
            }
            _ => {
                return Err(QeAppError::InvalidParameters(format!(
                    "xps: invalid correction energy '{}', expected 'Element:value'",
                    item
                )))
            }
        }
    }
    Ok(table)
}

fn input_schema() -> InputSchema {
    InputSchema::new()
        .required_value("structure", DataKind::Structure, "The input structure.")
        .optional_value("clean_workdir", DataKind::Bool, "Clean remote folders at the end.")
        .optional_namespace("relax", "Inputs for an optional relaxation.")
        .required_namespace("ch_scf", "Inputs for the core-hole PwBaseWorkChain.")
        .required_value("elements_list", DataKind::List, "Elements to compute spectra for.")
        .required_value("pseudos", DataKind::Dict, "Core-hole and ground-state pseudos per element.")
        .required_value(
            "core_hole_treatments",
            DataKind::Dict,
            "Core-hole treatment per element.",
        )
        .optional_value("calc_binding_energy", DataKind::Bool, "Compute binding energies.")
        .optional_value(
            "correction_energies",
            DataKind::Dict,
            "Binding-energy correction per element (eV).",
        )
        .optional_value(
            "structure_preparation_settings",
            DataKind::Dict,
            "Supercell generation settings.",
        )
}

fn get_builder(codes: &Codes, structure: &Crystal, parameters: &InputParameters) -> Result<ProcessBuilder> {
    let settings = XpsSettings::from_parameters(parameters)?;
    let selected = settings.selected_elements(structure)?;
    let pw_code = require_code(codes, "pw_code", "xps")?;
    let pw = PwBuilder::new(structure, parameters)?;

    let treatment = json!(settings.core_hole_treatment);
    let mut pseudos = Map::new();
    let mut treatments = Map::new();
    let mut elements = Vec::new();
    for (label, element) in &selected {
        pseudos.insert(
            element.clone(),
            json!({
                "group": settings.pseudo_group,
                "core_hole": label,
                "gipaw": format!("{}_gs", element),
            }),
        );
        treatments.insert(element.clone(), treatment.clone());
        elements.push(Value::from(element.as_str()));
    }

    if settings.calc_binding_energy {
        for (_, element) in &selected {
            if !settings.correction_energies.contains_key(element) {
                warn!("xps: no correction energy for {}, binding energy will be uncorrected", element);
            }
        }
    }

    let corrections: Map<String, Value> = settings
        .correction_energies
        .iter()
        .map(|(el, e)| (el.clone(), json!(e)))
        .collect();
    let preparation = json!({
        "supercell_min_parameter": settings.supercell_min_parameter,
        "is_molecule_input": settings.structure_type == StructureType::Molecule,
    });

    let mut inputs = Namespace::new()
        .with("structure", Data::Structure(structure.clone()))
        .with("clean_workdir", Data::Bool(false))
        .with("ch_scf", pw.base(pw_code, "scf", true))
        .with("elements_list", Data::List(elements))
        .with("pseudos", Data::Dict(pseudos))
        .with("core_hole_treatments", Data::Dict(treatments))
        .with("calc_binding_energy", Data::Bool(settings.calc_binding_energy))
        .with("correction_energies", Data::Dict(corrections));
    if let Some(data) = Data::dict(preparation) {
        inputs.insert("structure_preparation_settings", data);
    }

    Ok(ProcessBuilder::new(PROCESS_LABEL, inputs))
}

pub fn descriptor() -> SubWorkflowDescriptor {
    SubWorkflowDescriptor {
        process_label: PROCESS_LABEL.to_string(),
        report_name: "XpsWorkChain".to_string(),
        input_schema: input_schema(),
        get_builder,
    }
}

fn defaults() -> Value {
    let mut values = json!(XpsSettings::default());
    values["core_hole_treatment"] = json!(CoreHoleTreatment::Full);
    values
}

pub fn panel() -> PanelDescriptor {
    PanelDescriptor {
        title: "XPS Settings".to_string(),
        defaults,
    }
}
