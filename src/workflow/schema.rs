//! # 输入 schema
//!
//! 描述子工作流接受的顶层端口，用于在参数收集边界校验
//! 阶段命名空间，以及在提交前暴露过滤后的输入视图。
//!
//! ## 依赖关系
//! - 被 `workflow/registry.rs`, `workflow/request.rs`, `workflow/executor.rs`,
//!   `plugins/` 使用
//! - 使用 `models/`

use crate::models::{DataKind, Namespace, Port};

/// 端口类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    /// 叶子值；None 表示接受任意类型
    Value(Option<DataKind>),
    /// 嵌套命名空间（内容对编排器不透明）
    Namespace,
}

/// 单个端口声明
#[derive(Debug, Clone, PartialEq)]
pub struct PortSpec {
    pub name: String,
    pub kind: PortKind,
    pub required: bool,
    pub help: String,
}

/// 子工作流的输入 schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    ports: Vec<PortSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, name: &str, kind: PortKind, required: bool, help: &str) -> Self {
        self.ports.push(PortSpec {
            name: name.to_string(),
            kind,
            required,
            help: help.to_string(),
        });
        self
    }

    pub fn required_namespace(self, name: &str, help: &str) -> Self {
        self.port(name, PortKind::Namespace, true, help)
    }

    pub fn optional_namespace(self, name: &str, help: &str) -> Self {
        self.port(name, PortKind::Namespace, false, help)
    }

    pub fn required_value(self, name: &str, kind: DataKind, help: &str) -> Self {
        self.port(name, PortKind::Value(Some(kind)), true, help)
    }

    pub fn optional_value(self, name: &str, kind: DataKind, help: &str) -> Self {
        self.port(name, PortKind::Value(Some(kind)), false, help)
    }

    pub fn port_spec(&self, name: &str) -> Option<&PortSpec> {
        self.ports.iter().find(|p| p.name == name)
    }

    /// 去掉父工作流自行提供的端口（如 `structure`, `clean_workdir`）
    pub fn excluding(&self, names: &[&str]) -> InputSchema {
        InputSchema {
            ports: self
                .ports
                .iter()
                .filter(|p| !names.contains(&p.name.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// 只保留 schema 声明过的顶层端口
    pub fn expose(&self, inputs: &Namespace) -> Namespace {
        let mut exposed = Namespace::new();
        for (name, port) in inputs.iter() {
            if self.port_spec(name).is_some() {
                exposed.insert(name, port.clone());
            }
        }
        exposed
    }

    /// 校验命名空间，返回全部错误信息（空表示通过）
    pub fn validate(&self, inputs: &Namespace) -> Vec<String> {
        let mut errors = Vec::new();

        for spec in &self.ports {
            if spec.required && !inputs.contains(&spec.name) {
                errors.push(format!("required port '{}' is missing", spec.name));
            }
        }

        for (name, port) in inputs.iter() {
            let Some(spec) = self.port_spec(name) else {
                errors.push(format!("unexpected port '{}'", name));
                continue;
            };
            match (spec.kind, port) {
                (PortKind::Namespace, Port::Namespace(_)) => {}
                (PortKind::Value(None), Port::Value(_)) => {}
                (PortKind::Value(Some(kind)), Port::Value(data)) if data.kind() == kind => {}
                (PortKind::Value(Some(kind)), Port::Value(data)) => errors.push(format!(
                    "port '{}' expects {} but got {}",
                    name,
                    kind,
                    data.kind()
                )),
                (PortKind::Namespace, Port::Value(_)) => {
                    errors.push(format!("port '{}' expects a namespace", name))
                }
                (PortKind::Value(_), Port::Namespace(_)) => {
                    errors.push(format!("port '{}' expects a value, not a namespace", name))
                }
            }
        }

        errors
    }
}

// ─────────────────────────────────────────────────────────────
// 内置子工作流的 schema
// ─────────────────────────────────────────────────────────────

/// `quantumespresso.pw.relax`
pub fn pw_relax_schema() -> InputSchema {
    InputSchema::new()
        .required_value("structure", DataKind::Structure, "The input structure.")
        .optional_value("clean_workdir", DataKind::Bool, "Clean remote folders at the end.")
        .required_namespace("base", "Inputs for the main PwBaseWorkChain.")
        .optional_namespace("base_final_scf", "Inputs for the final SCF PwBaseWorkChain.")
        .optional_value("relax_type", DataKind::Str, "Degrees of freedom to optimize.")
        .optional_value(
            "max_meta_convergence_iterations",
            DataKind::Int,
            "Maximum number of relaxation restarts.",
        )
        .optional_value("meta_convergence", DataKind::Bool, "Restart until the volume converges.")
        .optional_value("volume_convergence", DataKind::Float, "Relative volume tolerance.")
}

/// `quantumespresso.pw.bands`
pub fn pw_bands_schema() -> InputSchema {
    InputSchema::new()
        .required_value("structure", DataKind::Structure, "The input structure.")
        .optional_value("clean_workdir", DataKind::Bool, "Clean remote folders at the end.")
        .optional_namespace("relax", "Inputs for an optional relaxation.")
        .required_namespace("scf", "Inputs for the SCF PwBaseWorkChain.")
        .required_namespace("bands", "Inputs for the bands PwBaseWorkChain.")
        .optional_value("bands_kpoints", DataKind::Array, "Explicit k-point path.")
        .optional_value(
            "bands_kpoints_distance",
            DataKind::Float,
            "Distance between k-points along the seekpath.",
        )
        .optional_value("nbands_factor", DataKind::Float, "Multiplier for the number of bands.")
}

/// `quantumespresso.pdos`
pub fn pdos_schema() -> InputSchema {
    InputSchema::new()
        .required_value("structure", DataKind::Structure, "The input structure.")
        .optional_value("clean_workdir", DataKind::Bool, "Clean remote folders at the end.")
        .optional_value("serial_clean", DataKind::Bool, "Clean each calculation once done.")
        .optional_value("dry_run", DataKind::Bool, "Stop after the input preparation.")
        .optional_namespace("scf", "Inputs for the SCF PwBaseWorkChain.")
        .required_namespace("nscf", "Inputs for the NSCF PwBaseWorkChain.")
        .required_namespace("dos", "Inputs for the dos.x calculation.")
        .required_namespace("projwfc", "Inputs for the projwfc.x calculation.")
}
