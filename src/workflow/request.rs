//! # 工作流请求
//!
//! `WorkflowRequest` 是一次运行的不可变输入：目标结构、各阶段的输入命名空间、
//! 代码标签、协议、清理标志以及全局 overrides。它只能通过 `RequestBuilder`
//! 构建，构建时对每个阶段命名空间做 schema 校验，错误在提交之前返回。
//!
//! ## 依赖关系
//! - 被 `workflow/protocol.rs`, `workflow/orchestrator.rs`, `commands/run.rs` 使用
//! - 使用 `workflow/schema.rs`, `workflow/registry.rs`, `models/`

use super::registry::PluginRegistry;
use super::schema::{self, InputSchema};
use crate::error::{QeAppError, Result};
use crate::models::{Crystal, Namespace, Protocol};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RELAX: &str = "relax";
pub const BANDS: &str = "bands";
pub const PDOS: &str = "pdos";

/// 父工作流自己提供、不从阶段命名空间暴露的端口
pub fn excluded_ports(stage: &str) -> &'static [&'static str] {
    match stage {
        BANDS => &["structure", "clean_workdir", "relax"],
        _ => &["structure", "clean_workdir"],
    }
}

/// 内置阶段的 schema（已去掉父工作流提供的端口）
pub fn builtin_schema(stage: &str) -> Option<InputSchema> {
    let full = match stage {
        RELAX => schema::pw_relax_schema(),
        BANDS => schema::pw_bands_schema(),
        PDOS => schema::pdos_schema(),
        _ => return None,
    };
    Some(full.excluding(excluded_ports(stage)))
}

/// 子工作流调用：入口名 + 输入命名空间
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessBuilder {
    pub process_label: String,
    pub inputs: Namespace,
}

impl ProcessBuilder {
    pub fn new(process_label: impl Into<String>, inputs: Namespace) -> Self {
        ProcessBuilder {
            process_label: process_label.into(),
            inputs,
        }
    }

    /// 移除未使用的可选命名空间或端口
    pub fn pop(&mut self, name: &str) -> bool {
        self.inputs.pop(name).is_some()
    }
}

/// 全局 overrides：作用于除 nscf 以外的所有 PwBaseWorkChain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpoints_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degauss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smearing: Option<String>,
}

impl GlobalOverrides {
    pub fn is_empty(&self) -> bool {
        self.kpoints_distance.is_none() && self.degauss.is_none() && self.smearing.is_none()
    }
}

/// 不可变的工作流请求
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    structure: Crystal,
    stages: BTreeMap<String, Namespace>,
    protocol: Protocol,
    clean_workdir: bool,
    overrides: GlobalOverrides,
}

impl WorkflowRequest {
    pub fn builder(structure: Crystal) -> RequestBuilder {
        RequestBuilder {
            structure,
            stages: BTreeMap::new(),
            protocol: Protocol::Moderate,
            clean_workdir: false,
            overrides: GlobalOverrides::default(),
        }
    }

    pub fn structure(&self) -> &Crystal {
        &self.structure
    }

    /// 阶段命名空间；阶段未启用时为 None
    pub fn stage_inputs(&self, stage: &str) -> Option<&Namespace> {
        self.stages.get(stage)
    }

    pub fn has_stage(&self, stage: &str) -> bool {
        self.stages.contains_key(stage)
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn clean_workdir(&self) -> bool {
        self.clean_workdir
    }

    pub fn overrides(&self) -> &GlobalOverrides {
        &self.overrides
    }

    /// 列表展示用的结构优化信息
    pub fn relax_info(&self) -> String {
        match self
            .stages
            .get(RELAX)
            .and_then(|ns| ns.get_value("relax_type"))
            .and_then(|d| d.as_str())
        {
            Some(kind) => format!("relax: {}", kind),
            None if self.has_stage(RELAX) => "relax: yes".to_string(),
            None => "relax: none".to_string(),
        }
    }

    /// 列表展示用的性质信息
    pub fn properties_info(&self) -> String {
        let props: Vec<&str> = self.stage_names().filter(|s| *s != RELAX).collect();
        if props.is_empty() {
            "properties: none".to_string()
        } else {
            format!("properties: {}", props.join(", "))
        }
    }
}

/// `WorkflowRequest` 的构建器
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    structure: Crystal,
    stages: BTreeMap<String, Namespace>,
    protocol: Protocol,
    clean_workdir: bool,
    overrides: GlobalOverrides,
}

impl RequestBuilder {
    pub fn stage(mut self, name: impl Into<String>, inputs: Namespace) -> Self {
        self.stages.insert(name.into(), inputs);
        self
    }

    /// 去掉某个阶段（对应 builder.pop）
    pub fn pop(mut self, name: &str) -> Self {
        self.stages.remove(name);
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn clean_workdir(mut self, clean: bool) -> Self {
        self.clean_workdir = clean;
        self
    }

    pub fn overrides(mut self, overrides: GlobalOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// 校验所有阶段命名空间并冻结请求
    pub fn build(self, registry: &PluginRegistry) -> Result<WorkflowRequest> {
        for (name, inputs) in &self.stages {
            let schema = match builtin_schema(name) {
                Some(schema) => schema,
                None => registry
                    .plugin(name)
                    .map(|d| d.input_schema.excluding(excluded_ports(name)))
                    .ok_or_else(|| QeAppError::UnknownStage(name.clone()))?,
            };

            let errors = schema.validate(inputs);
            if !errors.is_empty() {
                return Err(QeAppError::InvalidInputs {
                    namespace: name.clone(),
                    errors,
                });
            }
        }

        if let Some(d) = self.overrides.kpoints_distance {
            if d <= 0.0 {
                return Err(QeAppError::InvalidParameters(format!(
                    "kpoints_distance_override must be positive, got {}",
                    d
                )));
            }
        }
        if let Some(d) = self.overrides.degauss {
            if d < 0.0 {
                return Err(QeAppError::InvalidParameters(format!(
                    "degauss_override must not be negative, got {}",
                    d
                )));
            }
        }

        Ok(WorkflowRequest {
            structure: self.structure,
            stages: self.stages,
            protocol: self.protocol,
            clean_workdir: self.clean_workdir,
            overrides: self.overrides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Data, Lattice};

    fn silicon() -> Crystal {
        let lattice = Lattice::from_vectors([[0.0, 2.7, 2.7], [2.7, 0.0, 2.7], [2.7, 2.7, 0.0]]);
        Crystal::new(
            "Si",
            lattice,
            vec![
                Atom::new("Si", [0.0, 0.0, 0.0]),
                Atom::new("Si", [0.25, 0.25, 0.25]),
            ],
        )
    }

    #[test]
    fn test_build_rejects_unknown_stage() {
        let registry = PluginRegistry::default();
        let err = WorkflowRequest::builder(silicon())
            .stage("phonons", Namespace::new())
            .build(&registry)
            .unwrap_err();
        assert!(matches!(err, QeAppError::UnknownStage(name) if name == "phonons"));
    }

    #[test]
    fn test_build_rejects_malformed_namespace() {
        let registry = PluginRegistry::default();
        let err = WorkflowRequest::builder(silicon())
            .stage(PDOS, Namespace::new().with("nscf", Namespace::new()))
            .build(&registry)
            .unwrap_err();
        match err {
            QeAppError::InvalidInputs { namespace, errors } => {
                assert_eq!(namespace, "pdos");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_builder_pop_and_info() {
        let registry = PluginRegistry::default();
        let relax = Namespace::new()
            .with("base", Namespace::new())
            .with("relax_type", Data::Str("positions".into()));
        let bands = Namespace::new()
            .with("scf", Namespace::new())
            .with("bands", Namespace::new());

        let request = WorkflowRequest::builder(silicon())
            .stage(RELAX, relax)
            .stage(BANDS, bands)
            .stage(PDOS, Namespace::new())
            .pop(PDOS)
            .build(&registry)
            .unwrap();

        assert!(request.has_stage(RELAX));
        assert!(!request.has_stage(PDOS));
        assert_eq!(request.relax_info(), "relax: positions");
        assert_eq!(request.properties_info(), "properties: bands");
    }

    #[test]
    fn test_build_rejects_negative_overrides() {
        let registry = PluginRegistry::default();
        let err = WorkflowRequest::builder(silicon())
            .overrides(GlobalOverrides {
                kpoints_distance: Some(-0.1),
                ..Default::default()
            })
            .build(&registry)
            .unwrap_err();
        assert!(matches!(err, QeAppError::InvalidParameters(_)));
    }
}
