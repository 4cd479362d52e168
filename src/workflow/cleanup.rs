//! # 远程目录清理
//!
//! 工作流终止时遍历所有阶段节点的调用树，清理每个 calcjob 的远程
//! 工作目录。单个目录的失败（已不存在、权限不足）被吞掉并记 debug
//! 日志；成功清理的 pk 汇总报告。重复运行不会报错。
//!
//! ## 依赖关系
//! - 被 `workflow/orchestrator.rs`, `commands/clean.rs` 使用
//! - 使用 `models/`

use crate::models::{ProcessNode, ProcessType};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// 清理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// 成功清理的 calcjob pk
    pub cleaned: Vec<u64>,
    /// 未清理（目录缺失或删除失败）的 calcjob 数
    pub skipped: usize,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.cleaned.is_empty()
    }
}

/// 清理给定节点调用树中所有 calcjob 的远程目录
pub fn clean_workdir<'a>(nodes: impl IntoIterator<Item = &'a ProcessNode>) -> CleanupReport {
    let mut report = CleanupReport::default();

    for node in nodes {
        let tree = std::iter::once(node).chain(node.called_descendants());
        for calc in tree.filter(|n| n.process_type == ProcessType::CalcJob) {
            let Some(folder) = calc.remote_folder() else {
                continue;
            };
            match folder.clean() {
                Ok(files) => {
                    debug!(pk = calc.pk, files, "cleaned {}", folder.path.display());
                    report.cleaned.push(calc.pk);
                }
                Err(e) => {
                    debug!(pk = calc.pk, "failed to clean {}: {}", folder.path.display(), e);
                    report.skipped += 1;
                }
            }
        }
    }

    if !report.is_empty() {
        let pks: Vec<String> = report.cleaned.iter().map(|pk| pk.to_string()).collect();
        info!("cleaned remote folders of calculations: {}", pks.join(" "));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted;
    use std::fs;

    #[test]
    fn test_clean_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let scf_dir = dir.path().join("scf");
        let nscf_dir = dir.path().join("nscf");
        for d in [&scf_dir, &nscf_dir] {
            fs::create_dir_all(d).unwrap();
            fs::write(d.join("aiida.out"), "JOB DONE").unwrap();
        }

        let mut scf = scripted::calcjob("scf", &scf_dir);
        scf.pk = 11;
        let mut nscf = scripted::calcjob("nscf", &nscf_dir);
        nscf.pk = 12;
        let bands = scripted::with_child(scripted::ok_node("bands"), scf);
        let pdos = scripted::with_child(scripted::ok_node("pdos"), nscf);
        let nodes = vec![bands, pdos];

        let first = clean_workdir(&nodes);
        assert_eq!(first.cleaned, vec![11, 12]);
        assert!(!scf_dir.exists());

        let second = clean_workdir(&nodes);
        assert!(second.cleaned.is_empty());
        assert_eq!(second.skipped, 2);
    }

    #[test]
    fn test_workchain_remote_folders_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let node = scripted::with_output(
            scripted::ok_node("relax"),
            "remote_folder",
            crate::models::Data::RemoteFolder(crate::models::RemoteFolder::new(
                "localhost",
                dir.path(),
            )),
        );
        let report = clean_workdir([&node]);
        assert!(report.is_empty());
        assert!(dir.path().exists());
    }
}
