//! # 阶段执行器
//!
//! 为一个阶段构造提交输入并通过引擎提交：
//! 1. 按阶段 schema 暴露请求中的命名空间（去掉父工作流提供的端口）
//! 2. 设置调用链接标签并注入当前结构
//! 3. 把 relax 得到的能带数以 setdefault 方式写入 `SYSTEM.nbnd`
//! 4. pdos 复用 bands 的 scf 远程目录时去掉 `scf` 命名空间
//! 5. 把全局 overrides 写入除 nscf 以外的 PwBase 命名空间
//!
//! ## 依赖关系
//! - 被 `workflow/orchestrator.rs` 使用
//! - 使用 `workflow/controller.rs`, `workflow/context.rs`, `workflow/request.rs`, `engine/`

use super::context::StageContext;
use super::controller::Stage;
use super::registry::PluginRegistry;
use super::request::{self, GlobalOverrides, WorkflowRequest};
use crate::engine::{Engine, Submission};
use crate::error::{QeAppError, Result};
use crate::models::{Data, Namespace};

use serde_json::{json, Value};
use tracing::info;

/// 接受全局 overrides 的 PwBase 命名空间，以及是否应用 k 点间距
fn override_targets(stage: &Stage) -> &'static [(&'static str, bool)] {
    match stage {
        Stage::Relax => &[("base", true), ("base_final_scf", true)],
        // bands.bands 使用显式的高对称路径
        Stage::Bands => &[("scf", true), ("bands", false)],
        Stage::Pdos => &[("scf", true)],
        Stage::Plugin(_) => &[],
    }
}

pub struct StageExecutor<'a> {
    request: &'a WorkflowRequest,
    registry: &'a PluginRegistry,
    engine: &'a dyn Engine,
}

impl<'a> StageExecutor<'a> {
    pub fn new(
        request: &'a WorkflowRequest,
        registry: &'a PluginRegistry,
        engine: &'a dyn Engine,
    ) -> Self {
        StageExecutor {
            request,
            registry,
            engine,
        }
    }

    /// 构造某阶段的提交输入
    pub fn build_inputs(&self, stage: &Stage, context: &StageContext) -> Result<Namespace> {
        let name = stage.name();
        let raw = self
            .request
            .stage_inputs(name)
            .ok_or_else(|| QeAppError::UnknownStage(name.to_string()))?;

        let schema = match stage {
            Stage::Plugin(_) => self
                .registry
                .plugin(name)
                .map(|d| d.input_schema.excluding(request::excluded_ports(name)))
                .ok_or_else(|| QeAppError::UnknownStage(name.to_string()))?,
            _ => request::builtin_schema(name)
                .ok_or_else(|| QeAppError::UnknownStage(name.to_string()))?,
        };

        let mut inputs = schema.expose(raw);
        inputs.set("metadata.call_link_label", Data::Str(name.to_string()));
        inputs.set(
            "structure",
            Data::Structure(context.current_structure.clone()),
        );

        if let Some(nbnd) = context.current_number_of_bands {
            let path = match stage {
                Stage::Bands => Some("scf.pw.parameters"),
                Stage::Pdos => Some("nscf.pw.parameters"),
                _ => None,
            };
            if let Some(path) = path {
                inputs.setdefault_in_dict(path, "SYSTEM", "nbnd", json!(nbnd));
            }
        }

        if *stage == Stage::Pdos {
            if let Some(folder) = &context.scf_parent_folder {
                inputs.pop("scf");
                inputs.set("nscf.pw.parent_folder", Data::RemoteFolder(folder.clone()));
            }
        }

        apply_overrides(&mut inputs, stage, self.request.overrides());
        Ok(inputs)
    }

    /// 提交阶段；上下文总是被交还，提交失败时错误放在第二个返回值中
    pub fn run_stage(&self, stage: &Stage, context: StageContext) -> (StageContext, Result<u64>) {
        let report_name = stage.report_name(self.registry);
        let inputs = match self.build_inputs(stage, &context) {
            Ok(inputs) => inputs,
            Err(e) => return (context, Err(submission_error(stage, &report_name, e))),
        };
        let process_label = match stage.process_label(self.registry) {
            Some(label) => label,
            None => {
                let err = QeAppError::UnknownStage(stage.name().to_string());
                return (context, Err(submission_error(stage, &report_name, err)));
            }
        };

        let submission = Submission {
            process_label,
            link_label: stage.name().to_string(),
            inputs,
        };
        match self.engine.submit(submission) {
            Ok(handle) => {
                let pk = handle.pk();
                info!(stage = %stage, pk, "launching {}<{}>", report_name, pk);
                (context.with_running(stage.name(), handle), Ok(pk))
            }
            Err(e) => (context, Err(submission_error(stage, &report_name, e))),
        }
    }
}

fn submission_error(stage: &Stage, process: &str, err: QeAppError) -> QeAppError {
    QeAppError::SubmissionError {
        stage: stage.name().to_string(),
        process: process.to_string(),
        reason: err.to_string(),
    }
}

fn apply_overrides(inputs: &mut Namespace, stage: &Stage, overrides: &GlobalOverrides) {
    if overrides.is_empty() {
        return;
    }

    for (namespace, with_kpoints) in override_targets(stage) {
        if !inputs.contains(namespace) {
            continue;
        }
        if let (true, Some(distance)) = (*with_kpoints, overrides.kpoints_distance) {
            inputs.set(&format!("{}.kpoints_distance", namespace), Data::Float(distance));
        }

        let parameters = format!("{}.pw.parameters", namespace);
        if let Some(degauss) = overrides.degauss {
            override_in_dict(inputs, &parameters, "degauss", json!(degauss));
        }
        if let Some(smearing) = &overrides.smearing {
            override_in_dict(inputs, &parameters, "smearing", json!(smearing));
        }
    }
}

/// 覆盖 `path` 处 Dict 中的 `SYSTEM.key`
fn override_in_dict(inputs: &mut Namespace, path: &str, key: &str, value: Value) {
    inputs.setdefault_in_dict(path, "SYSTEM", key, value.clone());
    if let Some(system) = inputs
        .get_value_mut(path)
        .and_then(Data::as_dict_mut)
        .and_then(|dict| dict.get_mut("SYSTEM"))
        .and_then(Value::as_object_mut)
    {
        system.insert(key.to_string(), value);
    }
}
