//! # eos 插件
//!
//! 状态方程：以输入结构为中心，对晶胞做一组等比缩放并分别做 scf，
//! 由子工作流拟合能量-体积曲线。
//!
//! 参数分区 `eos`：
//! - `scale_count`: 缩放点数（至少 3）
//! - `scale_increment`: 相邻两点的缩放步长
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
use serde_json::{json, Value};

pub const PROCESS_LABEL: &str = "qeapp.eos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EosSettings {
    pub scale_count: u32,
    pub scale_increment: f64,
}

impl Default for EosSettings {
    fn default() -> Self {
        EosSettings {
            scale_count: 7,
            scale_increment: 0.02,
        }
    }
}

impl EosSettings {
    pub fn from_parameters(parameters: &InputParameters) -> Result<Self> {
        let section = Value::Object(parameters.plugin_section("eos"));
        let settings: EosSettings = serde_json::from_value(section)
            .map_err(|e| QeAppError::InvalidParameters(format!("eos: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.scale_count < 3 {
            return Err(QeAppError::InvalidParameters(format!(
                "eos: scale_count must be at least 3, got {}",
                self.scale_count
            )));
        }
        if self.scale_increment <= 0.0 {
            return Err(QeAppError::InvalidParameters(format!(
                "eos: scale_increment must be positive, got {}",
                self.scale_increment
            )));
        }
        // 最小的缩放因子必须仍为正
        let half_span = self.scale_increment * (self.scale_count - 1) as f64 / 2.0;
        if half_span >= 1.0 {
            return Err(QeAppError::InvalidParameters(format!(
                "eos: {} points with increment {} shrink the cell to zero",
                self.scale_count, self.scale_increment
            )));
        }
        Ok(())
    }

    /// 以 1.0 为中心、步长 `scale_increment` 的缩放因子
    pub fn scale_factors(&self) -> Vec<f64> {
        let center = (self.scale_count - 1) as f64 / 2.0;
        (0..self.scale_count)
            .map(|i| 1.0 + (i as f64 - center) * self.scale_increment)
            .collect()
    }
}

fn input_schema() -> InputSchema {
    InputSchema::new()
        .required_value("structure", DataKind::Structure, "The input structure.")
        .optional_value("clean_workdir", DataKind::Bool, "Clean remote folders at the end.")
        .required_namespace("scf", "Inputs for each scaled-volume PwBaseWorkChain.")
        .required_value("scale_factors", DataKind::List, "Volume scaling factors.")
}

fn get_builder(codes: &Codes, structure: &Crystal, parameters: &InputParameters) -> Result<ProcessBuilder> {
    let settings = EosSettings::from_parameters(parameters)?;
    let pw_code = require_code(codes, "pw_code", "eos")?;
    let pw = PwBuilder::new(structure, parameters)?;

    let factors = settings.scale_factors().into_iter().map(Value::from).collect();
    let inputs = Namespace::new()
        .with("structure", Data::Structure(structure.clone()))
        .with("clean_workdir", Data::Bool(false))
        .with("scf", pw.base(pw_code, "scf", true))
        .with("scale_factors", Data::List(factors));

    Ok(ProcessBuilder::new(PROCESS_LABEL, inputs))
}

pub fn descriptor() -> SubWorkflowDescriptor {
    SubWorkflowDescriptor {
        process_label: PROCESS_LABEL.to_string(),
        report_name: "EquationOfStateWorkChain".to_string(),
        input_schema: input_schema(),
        get_builder,
    }
}

fn defaults() -> Value {
    json!(EosSettings::default())
}

pub fn panel() -> PanelDescriptor {
    PanelDescriptor {
        title: "Equation of State (EOS)".to_string(),
        defaults,
    }
}
