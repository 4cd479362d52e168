//! # 本地引擎
//!
//! 在 rayon 线程池中运行 launcher：
//! `<launcher> <process_label> <job_dir>`，标准输出/错误写入作业目录下的
//! `launcher.out` / `launcher.err`。提交立即返回，句柄在 `wait` 时阻塞
//! 等待线程池回报 launcher 的退出状态。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `engine/jobdir.rs`
//! - 使用 `rayon`, `num_cpus`

use super::jobdir::{JobDir, JobStore};
use super::{Engine, ProcessHandle, Submission};
use crate::error::{QeAppError, Result};
use crate::models::ProcessNode;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use tracing::debug;

/// 本地 launcher 引擎
pub struct LocalEngine {
    store: Arc<JobStore>,
    launcher: PathBuf,
    pool: rayon::ThreadPool,
}

impl LocalEngine {
    /// `jobs` 为 0 时使用全部 CPU 核数
    pub fn new(store: Arc<JobStore>, launcher: impl Into<PathBuf>, jobs: usize) -> Result<Self> {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("qeflow-local-{}", i))
            .build()
            .map_err(|e| QeAppError::Other(format!("Failed to build thread pool: {}", e)))?;

        Ok(LocalEngine {
            store,
            launcher: launcher.into(),
            pool,
        })
    }
}

impl Engine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    fn allocate_pk(&self) -> u64 {
        self.store.allocate_pk()
    }

    fn submit(&self, submission: Submission) -> Result<Box<dyn ProcessHandle>> {
        let job = self.store.prepare(&submission)?;
        let launcher = self.launcher.clone();
        let dir = job.path.clone();
        let label = job.process_label.clone();
        let (tx, rx) = mpsc::channel();

        debug!(pk = job.pk, dir = %dir.display(), "queueing local launcher");
        self.pool.spawn(move || {
            let status = run_launcher(&launcher, &label, &dir);
            // 句柄被丢弃时接收端已关闭，忽略即可
            let _ = tx.send(status);
        });

        Ok(Box::new(LocalHandle {
            job,
            store: Arc::clone(&self.store),
            launcher: self.launcher.clone(),
            rx,
        }))
    }
}

fn run_launcher(launcher: &Path, process_label: &str, dir: &Path) -> io::Result<Option<i32>> {
    let stdout = File::create(dir.join("launcher.out"))?;
    let stderr = File::create(dir.join("launcher.err"))?;
    let status = Command::new(launcher)
        .arg(process_label)
        .arg(dir)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status()?;
    Ok(status.code())
}

/// 本地作业句柄
struct LocalHandle {
    job: JobDir,
    store: Arc<JobStore>,
    launcher: PathBuf,
    rx: Receiver<io::Result<Option<i32>>>,
}

impl ProcessHandle for LocalHandle {
    fn pk(&self) -> u64 {
        self.job.pk
    }

    fn wait(&mut self) -> Result<ProcessNode> {
        let status = self
            .rx
            .recv()
            .map_err(|_| QeAppError::Other(format!("Launcher thread for pk {} vanished", self.job.pk)))?;

        let code = match status {
            Ok(code) => code,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(QeAppError::CommandNotFound {
                    command: self.launcher.display().to_string(),
                })
            }
            Err(e) => {
                return Err(QeAppError::CommandFailed {
                    command: self.launcher.display().to_string(),
                    stderr: e.to_string(),
                })
            }
        };

        debug!(pk = self.job.pk, ?code, "launcher exited");
        self.job.collect(&self.store, code)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{Data, Namespace, ProcessState};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_launcher(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("launcher.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn submission() -> Submission {
        Submission {
            process_label: "quantumespresso.pw.relax".to_string(),
            link_label: "relax".to_string(),
            inputs: Namespace::new().with("relax_type", Data::Str("positions".into())),
        }
    }

    #[test]
    fn test_local_engine_collects_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = write_launcher(
            dir.path(),
            r#"echo '{"exit_status": 0, "outputs": {"output_structure": {"type": "bool", "value": true}}}' > "$2/outputs.json""#,
        );
        let store = Arc::new(JobStore::open(dir.path().join("jobs")).unwrap());
        let engine = LocalEngine::new(store, &launcher, 1).unwrap();

        let mut handle = engine.submit(submission()).unwrap();
        let node = handle.wait().unwrap();
        assert!(node.is_finished_ok());
        assert_eq!(node.pk, handle.pk());
        assert!(node.outputs.contains("output_structure"));
    }

    #[test]
    fn test_local_engine_without_outputs_is_excepted() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = write_launcher(dir.path(), "exit 3");
        let store = Arc::new(JobStore::open(dir.path().join("jobs")).unwrap());
        let engine = LocalEngine::new(store, &launcher, 1).unwrap();

        let node = engine.submit(submission()).unwrap().wait().unwrap();
        assert_eq!(node.state, ProcessState::Excepted);
        assert_eq!(node.exit_status, Some(3));
    }

    #[test]
    fn test_missing_launcher_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JobStore::open(dir.path().join("jobs")).unwrap());
        let engine = LocalEngine::new(store, dir.path().join("no-such-launcher"), 1).unwrap();

        let err = engine.submit(submission()).unwrap().wait().unwrap_err();
        assert!(matches!(err, QeAppError::CommandNotFound { .. }));
    }
}
