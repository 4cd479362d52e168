//! # 工作流记录
//!
//! 一次运行的持久化结果，写为作业根目录下的 `workflow-<pk>.json`，
//! 供 `qeflow clean` 重新执行终止钩子以及列表展示使用。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs`, `commands/clean.rs` 使用
//! - 使用 `workflow/orchestrator.rs`, `workflow/inspector.rs`, `models/`

use super::cleanup::CleanupReport;
use super::inspector::StageResult;
use super::orchestrator::{WorkflowOutcome, WorkflowState};
use super::request::WorkflowRequest;
use crate::error::{QeAppError, Result};
use crate::models::{Namespace, ProcessNode};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub pk: u64,
    pub state: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_message: Option<String>,
    /// 中断运行的提交错误
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_error: Option<String>,
    pub formula: String,
    pub relax_info: String,
    pub properties_info: String,
    pub clean_workdir: bool,
    #[serde(default)]
    pub outputs: Namespace,
    #[serde(default)]
    pub stages: Vec<StageResult>,
    #[serde(default)]
    pub descendants: Vec<ProcessNode>,
    /// 已清理的 calcjob pk（含之后 `qeflow clean` 的结果）
    #[serde(default)]
    pub cleaned: Vec<u64>,
}

impl WorkflowRecord {
    pub fn from_outcome(request: &WorkflowRequest, outcome: &WorkflowOutcome) -> Self {
        WorkflowRecord {
            pk: outcome.pk,
            state: outcome.state,
            exit_status: outcome.exit_code.as_ref().map(|c| c.status),
            exit_message: outcome.exit_code.as_ref().map(|c| c.message.clone()),
            submission_error: outcome.submission_error.as_ref().map(|e| e.to_string()),
            formula: request.structure().formula(),
            relax_info: request.relax_info(),
            properties_info: request.properties_info(),
            clean_workdir: request.clean_workdir(),
            outputs: outcome.outputs.clone(),
            stages: outcome.stages.clone(),
            descendants: outcome.descendants.clone(),
            cleaned: outcome
                .cleanup
                .as_ref()
                .map(|r| r.cleaned.clone())
                .unwrap_or_default(),
        }
    }

    pub fn file_name(pk: u64) -> String {
        format!("workflow-{}.json", pk)
    }

    /// 写入 `<dir>/workflow-<pk>.json`，返回文件路径
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(self.pk));
        self.write_to(&path)?;
        Ok(path)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| QeAppError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| QeAppError::FileReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| QeAppError::ParseError {
            format: "workflow record".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// 合并一次清理的结果
    pub fn absorb_cleanup(&mut self, report: &CleanupReport) {
        for pk in &report.cleaned {
            if !self.cleaned.contains(pk) {
                self.cleaned.push(*pk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{self, ScriptedEngine};
    use crate::models::{Atom, Crystal, Lattice};
    use crate::workflow::orchestrator::QeAppWorkflow;
    use crate::workflow::registry::PluginRegistry;
    use crate::workflow::request::BANDS;

    #[test]
    fn test_record_write_and_read() {
        let lattice = Lattice::from_vectors([[0.0, 2.7, 2.7], [2.7, 0.0, 2.7], [2.7, 2.7, 0.0]]);
        let structure = Crystal::new(
            "Si",
            lattice,
            vec![Atom::new("Si", [0.0; 3]), Atom::new("Si", [0.25; 3])],
        );
        let registry = PluginRegistry::default();
        let request = WorkflowRequest::builder(structure)
            .stage(
                BANDS,
                Namespace::new()
                    .with("scf", Namespace::new())
                    .with("bands", Namespace::new()),
            )
            .build(&registry)
            .unwrap();
        let engine = ScriptedEngine::new().script(BANDS, scripted::failed_node(BANDS, 378));
        let outcome = QeAppWorkflow::new(&request, &registry, &engine).run();

        let record = WorkflowRecord::from_outcome(&request, &outcome);
        assert_eq!(record.formula, "Si2");
        assert_eq!(record.exit_status, Some(403));
        assert_eq!(record.properties_info, "properties: bands");

        let dir = tempfile::tempdir().unwrap();
        let path = record.write(dir.path()).unwrap();
        assert!(path.ends_with(format!("workflow-{}.json", record.pk)));
        let back = WorkflowRecord::read(&path).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_keeps_submission_error() {
        let lattice = Lattice::from_vectors([[0.0, 2.7, 2.7], [2.7, 0.0, 2.7], [2.7, 2.7, 0.0]]);
        let structure = Crystal::new("Si", lattice, vec![Atom::new("Si", [0.0; 3])]);
        let registry = PluginRegistry::default();
        let request = WorkflowRequest::builder(structure)
            .stage(
                BANDS,
                Namespace::new()
                    .with("scf", Namespace::new())
                    .with("bands", Namespace::new()),
            )
            .build(&registry)
            .unwrap();
        let engine = ScriptedEngine::new().reject(BANDS);
        let outcome = QeAppWorkflow::new(&request, &registry, &engine).run();

        let record = WorkflowRecord::from_outcome(&request, &outcome);
        assert_eq!(record.state, WorkflowState::Failed);
        assert_eq!(record.exit_status, None);
        assert!(record.submission_error.unwrap().contains("'bands'"));
    }

    #[test]
    fn test_absorb_cleanup_deduplicates() {
        let mut record: WorkflowRecord = serde_json::from_value(serde_json::json!({
            "pk": 7, "state": "SUCCESS", "formula": "Si2",
            "relax_info": "relax: none", "properties_info": "properties: none",
            "clean_workdir": true, "cleaned": [11]
        }))
        .unwrap();
        record.absorb_cleanup(&CleanupReport {
            cleaned: vec![11, 12],
            skipped: 0,
        });
        assert_eq!(record.cleaned, vec![11, 12]);
    }
}
