//! # 阶段检查器
//!
//! 等待阶段句柄进入终态，把失败映射为阶段的退出码，把成功阶段的
//! 输出传递给后续阶段：
//! - relax：优化结构成为当前结构，记录能带数，输出 `structure`
//! - bands：scf 子过程的远程目录留给 pdos，原胞成为当前结构
//! - pdos 与插件：无需传递
//!
//! 检查器不返回错误；句柄丢失或等待失败同样记为阶段失败。
//!
//! ## 依赖关系
//! - 被 `workflow/orchestrator.rs` 使用
//! - 使用 `workflow/context.rs`, `workflow/controller.rs`, `workflow/exit_codes.rs`

use super::context::StageContext;
use super::controller::Stage;
use super::exit_codes::ExitCode;
use super::registry::PluginRegistry;
use crate::models::structure::GEOMETRY_TOLERANCE;
use crate::models::{Data, Namespace};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 单个阶段的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<u64>,
    /// 失败时父工作流使用的退出码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<ExitCode>,
    /// 子过程自身报告的 exit status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_exit_status: Option<i32>,
    /// 本阶段直接产生的父工作流输出
    #[serde(default)]
    pub emitted: Namespace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageResult {
    fn success(stage: &Stage, pk: u64) -> Self {
        StageResult {
            stage: stage.name().to_string(),
            success: true,
            pk: Some(pk),
            exit_code: None,
            sub_exit_status: Some(0),
            emitted: Namespace::new(),
            reason: None,
        }
    }

    fn failure(
        stage: &Stage,
        registry: &PluginRegistry,
        pk: Option<u64>,
        sub_exit_status: Option<i32>,
        reason: String,
    ) -> Self {
        StageResult {
            stage: stage.name().to_string(),
            success: false,
            pk,
            exit_code: registry.exit_codes().for_stage(stage.name()).cloned(),
            sub_exit_status,
            emitted: Namespace::new(),
            reason: Some(reason),
        }
    }

    /// 失败时的父工作流退出码
    pub fn status(&self) -> Option<u32> {
        self.exit_code.as_ref().map(|c| c.status)
    }
}

/// 等待并检查某阶段
pub fn inspect_stage(
    stage: &Stage,
    mut context: StageContext,
    registry: &PluginRegistry,
) -> (StageContext, StageResult) {
    let report_name = stage.report_name(registry);

    let Some(mut handle) = context.take_running(stage.name()) else {
        let result = StageResult::failure(
            stage,
            registry,
            None,
            None,
            format!("{} was never launched", report_name),
        );
        return (context, result);
    };
    let pk = handle.pk();

    let node = match handle.wait() {
        Ok(node) => node,
        Err(e) => {
            warn!(stage = %stage, pk, "{}<{}> could not be awaited: {}", report_name, pk, e);
            let result = StageResult::failure(stage, registry, Some(pk), None, e.to_string());
            return (context, result);
        }
    };

    if !node.is_finished_ok() {
        let status = node
            .exit_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "None".to_string());
        warn!(
            stage = %stage,
            pk,
            exit_status = %status,
            "{} failed with exit status {}",
            report_name,
            status
        );
        let reason = format!(
            "{}<{}> {} with exit status {}",
            report_name, pk, node.state, status
        );
        let result = StageResult::failure(stage, registry, Some(pk), node.exit_status, reason);
        context.record_finished(stage.name(), node);
        return (context, result);
    }

    let mut result = StageResult::success(stage, pk);
    match stage {
        Stage::Relax => {
            if let Some(structure) = node
                .outputs
                .get_value("output_structure")
                .and_then(Data::as_structure)
            {
                let changed = !structure.same_geometry(&context.current_structure, GEOMETRY_TOLERANCE);
                context.current_structure = structure.clone();
                context.current_number_of_bands = node
                    .outputs
                    .get_value("output_parameters")
                    .and_then(Data::as_dict)
                    .and_then(|p| p.get("number_of_bands"))
                    .and_then(|n| n.as_u64());
                result
                    .emitted
                    .insert("structure", Data::Structure(structure.clone()));
                debug!(
                    pk,
                    nbnd = ?context.current_number_of_bands,
                    changed,
                    "relaxed structure threaded forward"
                );
            }
        }
        Stage::Bands => {
            context.scf_parent_folder = node
                .get_outgoing("scf")
                .and_then(|scf| scf.remote_folder())
                .cloned();
            if context.scf_parent_folder.is_none() {
                debug!(pk, "bands has no unique scf child with a remote folder");
            }
            if let Some(primitive) = node
                .outputs
                .get_value("primitive_structure")
                .and_then(Data::as_structure)
            {
                context.current_structure = primitive.clone();
            }
        }
        Stage::Pdos | Stage::Plugin(_) => {}
    }

    context.record_finished(stage.name(), node);
    (context, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{self, ScriptedEngine};
    use crate::engine::{Engine, Submission};
    use crate::models::{Atom, Crystal, Lattice, ProcessNode};
    use serde_json::json;
    use std::path::Path;

    fn crystal(name: &str, a: f64) -> Crystal {
        let lattice = Lattice::from_vectors([[0.0, a, a], [a, 0.0, a], [a, a, 0.0]]);
        Crystal::new(name, lattice, vec![Atom::new("Si", [0.0, 0.0, 0.0])])
    }

    fn submitted(engine: &ScriptedEngine, stage: &Stage) -> StageContext {
        let handle = engine
            .submit(Submission {
                process_label: "test".to_string(),
                link_label: stage.name().to_string(),
                inputs: Namespace::new(),
            })
            .unwrap();
        StageContext::new(crystal("Si", 2.7)).with_running(stage.name(), handle)
    }

    fn relax_node(nbnd: u64) -> ProcessNode {
        let node = scripted::with_output(
            scripted::ok_node("relax"),
            "output_structure",
            Data::Structure(crystal("Si-relaxed", 2.72)),
        );
        scripted::with_output(
            node,
            "output_parameters",
            scripted::dict(json!({"number_of_bands": nbnd})),
        )
    }

    #[test]
    fn test_relax_threads_structure_and_bands() {
        let engine = ScriptedEngine::new().script("relax", relax_node(42));
        let registry = PluginRegistry::default();
        let context = submitted(&engine, &Stage::Relax);

        let (context, result) = inspect_stage(&Stage::Relax, context, &registry);
        assert!(result.success);
        assert_eq!(context.current_structure.name, "Si-relaxed");
        assert_eq!(context.current_number_of_bands, Some(42));
        assert!(result.emitted.contains("structure"));
        assert!(context.finished("relax").is_some());
    }

    #[test]
    fn test_relax_without_output_structure_emits_nothing() {
        let engine = ScriptedEngine::new();
        let registry = PluginRegistry::default();
        let context = submitted(&engine, &Stage::Relax);

        let (context, result) = inspect_stage(&Stage::Relax, context, &registry);
        assert!(result.success);
        assert!(result.emitted.is_empty());
        assert_eq!(context.current_number_of_bands, None);
    }

    #[test]
    fn test_bands_failure_maps_to_exit_code() {
        let engine = ScriptedEngine::new().script("bands", scripted::failed_node("bands", 378));
        let registry = PluginRegistry::default();
        let context = submitted(&engine, &Stage::Bands);

        let (_, result) = inspect_stage(&Stage::Bands, context, &registry);
        assert!(!result.success);
        assert_eq!(result.status(), Some(403));
        assert_eq!(result.sub_exit_status, Some(378));
    }

    #[test]
    fn test_bands_threads_scf_folder_and_primitive() {
        let bands = scripted::with_child(
            scripted::with_output(
                scripted::ok_node("bands"),
                "primitive_structure",
                Data::Structure(crystal("Si-primitive", 2.7)),
            ),
            scripted::with_output(
                scripted::ok_node("scf"),
                "remote_folder",
                Data::RemoteFolder(crate::models::RemoteFolder::new("localhost", "/scratch/scf")),
            ),
        );
        let engine = ScriptedEngine::new().script("bands", bands);
        let registry = PluginRegistry::default();
        let context = submitted(&engine, &Stage::Bands);

        let (context, result) = inspect_stage(&Stage::Bands, context, &registry);
        assert!(result.success);
        assert_eq!(context.current_structure.name, "Si-primitive");
        assert_eq!(
            context.scf_parent_folder.unwrap().path,
            Path::new("/scratch/scf")
        );
    }

    #[test]
    fn test_missing_handle_is_a_failure() {
        let registry = PluginRegistry::default();
        let context = StageContext::new(crystal("Si", 2.7));
        let (_, result) = inspect_stage(&Stage::Pdos, context, &registry);
        assert!(!result.success);
        assert_eq!(result.status(), Some(404));
        assert_eq!(result.pk, None);
    }
}
