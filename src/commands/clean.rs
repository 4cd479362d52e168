//! # clean 子命令实现
//!
//! 对持久化的工作流记录重新执行终止钩子：遍历记录中保存的调用树，
//! 清理每个 calcjob 的远程目录，并把清理结果写回记录。重复执行是安全的。
//!
//! ## 依赖关系
//! - 使用 `cli/clean.rs` 定义的参数
//! - 使用 `workflow/record.rs`, `workflow/cleanup.rs`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::cli::clean::CleanArgs;
use crate::error::{QeAppError, Result};
use crate::models::ProcessType;
use crate::utils::{output, progress};
use crate::workflow::cleanup;
use crate::workflow::WorkflowRecord;

use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use walkdir::WalkDir;

/// 记录列表行
#[derive(Debug, Clone, Tabled)]
struct RecordRow {
    #[tabled(rename = "PK")]
    pk: u64,
    #[tabled(rename = "Formula")]
    formula: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Relax")]
    relax: String,
    #[tabled(rename = "Properties")]
    properties: String,
    #[tabled(rename = "Cleaned")]
    cleaned: String,
}

/// 执行 clean
pub fn execute(args: CleanArgs) -> Result<()> {
    output::print_header("Cleaning Remote Folders");

    let paths = resolve_records(&args.records)?;
    output::print_info(&format!("Found {} workflow record(s)", paths.len()));

    let pb = progress::create_progress_bar(paths.len() as u64, "Cleaning");
    let mut rows = Vec::new();
    let mut total_cleaned = 0;

    for path in &paths {
        let mut record = WorkflowRecord::read(path)?;

        if !record.clean_workdir && !args.force {
            pb.suspend(|| {
                output::print_skip(&format!(
                    "Workflow<{}> was run without --clean-workdir (use --force)",
                    record.pk
                ))
            });
        } else if args.dry_run {
            let pending = pending_calcjobs(&record);
            pb.suspend(|| {
                output::print_info(&format!(
                    "Workflow<{}>: {} calculation(s) with a remote folder",
                    record.pk,
                    pending.len()
                ))
            });
        } else {
            let report = cleanup::clean_workdir(&record.descendants);
            total_cleaned += report.cleaned.len();
            record.absorb_cleanup(&report);
            record.write_to(path)?;
        }

        rows.push(RecordRow {
            pk: record.pk,
            formula: record.formula.clone(),
            state: record.state.to_string(),
            relax: record.relax_info.trim_start_matches("relax: ").to_string(),
            properties: record
                .properties_info
                .trim_start_matches("properties: ")
                .to_string(),
            cleaned: record.cleaned.len().to_string(),
        });
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("{}", Table::new(&rows));
    println!();
    output::print_separator();
    if args.dry_run {
        output::print_done("Dry run, nothing was removed");
    } else {
        output::print_done(&format!("Cleaned {} remote folder(s)", total_cleaned));
    }
    Ok(())
}

/// 调用树中仍有远程目录的 calcjob
fn pending_calcjobs(record: &WorkflowRecord) -> Vec<u64> {
    record
        .descendants
        .iter()
        .flat_map(|node| std::iter::once(node).chain(node.called_descendants()))
        .filter(|n| n.process_type == ProcessType::CalcJob)
        .filter(|n| n.remote_folder().map_or(false, |f| f.path.exists()))
        .map(|n| n.pk)
        .collect()
}

fn is_record_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.starts_with("workflow-") && n.ends_with(".json"))
}

/// 展开文件、目录与 glob 模式
fn resolve_records(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            paths.extend(
                WalkDir::new(path)
                    .max_depth(1)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|e| e.into_path())
                    .filter(|p| is_record_file(p)),
            );
        } else if path.is_file() {
            paths.push(path.to_path_buf());
        } else {
            let matches = glob::glob(input).map_err(|e| {
                QeAppError::InvalidArgument(format!("invalid pattern '{}': {}", input, e))
            })?;
            paths.extend(matches.filter_map(|m| m.ok()).filter(|p| p.is_file()));
        }
    }

    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        return Err(QeAppError::NoFilesFound {
            pattern: inputs.join(" "),
        });
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_records_from_dir_and_glob() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["workflow-3.json", "workflow-12.json", "12-bands"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }

        let from_dir = resolve_records(&[dir.path().display().to_string()]).unwrap();
        assert_eq!(from_dir.len(), 2);

        let pattern = format!("{}/workflow-1*.json", dir.path().display());
        let from_glob = resolve_records(&[pattern]).unwrap();
        assert_eq!(from_glob, vec![dir.path().join("workflow-12.json")]);

        let err = resolve_records(&[format!("{}/none-*.json", dir.path().display())]).unwrap_err();
        assert!(matches!(err, QeAppError::NoFilesFound { .. }));
    }
}
