//! # 顶层编排器
//!
//! 状态机：
//! ```text
//! INIT -> (RELAX?) -> (BANDS?) -> (PDOS?) -> RUN_PLUGINS -> AGGREGATE -> SUCCESS
//!            \___________\___________\____________\______________________-> FAILED
//! ```
//! - 内置阶段严格串行；任一失败立即以该阶段的退出码进入 FAILED，
//!   后续阶段不会提交
//! - 启用的插件先全部提交，再按注册顺序逐个等待；成功插件的输出保留，
//!   工作流以第一个失败插件的退出码结束
//! - 提交错误使工作流进入 FAILED；已完成阶段的输出照常保留，
//!   错误随结果一起交给调用方
//! - 无论结果如何都会执行终止钩子（`clean_workdir` 清理）
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `workflow/` 下的全部子模块, `engine/`

use super::aggregate;
use super::cleanup::{self, CleanupReport};
use super::context::StageContext;
use super::controller::{Stage, StageController};
use super::executor::StageExecutor;
use super::exit_codes::ExitCode;
use super::inspector::{self, StageResult};
use super::registry::PluginRegistry;
use super::request::WorkflowRequest;
use crate::engine::Engine;
use crate::error::QeAppError;
use crate::models::{Namespace, ProcessNode};

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// 编排器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Init,
    Relax,
    Bands,
    Pdos,
    RunPlugins,
    Aggregate,
    Success,
    Failed,
}

impl WorkflowState {
    fn for_stage(stage: &Stage) -> Self {
        match stage {
            Stage::Relax => WorkflowState::Relax,
            Stage::Bands => WorkflowState::Bands,
            Stage::Pdos => WorkflowState::Pdos,
            Stage::Plugin(_) => WorkflowState::RunPlugins,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Init => "INIT",
            WorkflowState::Relax => "RELAX",
            WorkflowState::Bands => "BANDS",
            WorkflowState::Pdos => "PDOS",
            WorkflowState::RunPlugins => "RUN_PLUGINS",
            WorkflowState::Aggregate => "AGGREGATE",
            WorkflowState::Success => "SUCCESS",
            WorkflowState::Failed => "FAILED",
        };
        write!(f, "{}", name)
    }
}

/// 一次运行的最终结果
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub pk: u64,
    pub state: WorkflowState,
    /// FAILED 时的退出码
    pub exit_code: Option<ExitCode>,
    pub outputs: Namespace,
    pub stages: Vec<StageResult>,
    /// 各阶段的过程节点（含完整调用树）
    pub descendants: Vec<ProcessNode>,
    /// 未设置 `clean_workdir` 时为 None
    pub cleanup: Option<CleanupReport>,
    /// 中断运行的提交错误
    pub submission_error: Option<QeAppError>,
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        self.state == WorkflowState::Success
    }
}

/// 阶段中止原因
enum Halt {
    Failed(ExitCode),
    Submission(QeAppError),
}

/// QE app 顶层工作流
pub struct QeAppWorkflow<'a> {
    request: &'a WorkflowRequest,
    registry: &'a PluginRegistry,
    engine: &'a dyn Engine,
}

impl<'a> QeAppWorkflow<'a> {
    pub fn new(
        request: &'a WorkflowRequest,
        registry: &'a PluginRegistry,
        engine: &'a dyn Engine,
    ) -> Self {
        QeAppWorkflow {
            request,
            registry,
            engine,
        }
    }

    /// 运行到终态，终止钩子在返回前执行
    pub fn run(&self) -> WorkflowOutcome {
        let pk = self.engine.allocate_pk();
        let controller = StageController::new(self.request, self.registry);
        let executor = StageExecutor::new(self.request, self.registry, self.engine);

        let mut context = StageContext::new(self.request.structure().clone());
        let mut outputs = Namespace::new();
        let mut stages: Vec<StageResult> = Vec::new();
        let mut state = WorkflowState::Init;
        info!(pk, engine = self.engine.name(), "workflow started");

        let mut halt = None;
        for stage in [Stage::Relax, Stage::Bands, Stage::Pdos] {
            if !controller.should_run(&stage) {
                debug!(pk, stage = %stage, "stage skipped");
                continue;
            }
            state = transition(pk, state, WorkflowState::for_stage(&stage));

            let (ctx, submitted) = executor.run_stage(&stage, context);
            context = ctx;
            if let Err(e) = submitted {
                halt = Some(Halt::Submission(e));
                break;
            }

            let (ctx, result) = inspector::inspect_stage(&stage, context, self.registry);
            context = ctx;
            outputs.merge(result.emitted.clone());
            let failed = failure_code(&result);
            stages.push(result);
            if let Some(code) = failed {
                halt = Some(Halt::Failed(code));
                break;
            }
        }

        let mut succeeded_plugins = Vec::new();
        if halt.is_none() {
            state = transition(pk, state, WorkflowState::RunPlugins);
            let plugins = controller.enabled_plugins();
            let names: Vec<&str> = plugins.iter().map(Stage::name).collect();
            info!(pk, "plugins: [{}]", names.join(", "));

            let mut submitted = Vec::new();
            for stage in plugins {
                let (ctx, result) = executor.run_stage(&stage, context);
                context = ctx;
                match result {
                    Ok(_) => submitted.push(stage),
                    Err(e) => {
                        halt = Some(Halt::Submission(e));
                        break;
                    }
                }
            }

            // 已提交的插件都要等待，终止钩子才能看到它们的子过程
            for stage in submitted {
                let (ctx, result) = inspector::inspect_stage(&stage, context, self.registry);
                context = ctx;
                match failure_code(&result) {
                    Some(code) if halt.is_none() => halt = Some(Halt::Failed(code)),
                    Some(_) => {}
                    None => succeeded_plugins.push(stage.name().to_string()),
                }
                stages.push(result);
            }
        }

        let (exit_code, submission_error) = match halt {
            None => {
                state = transition(pk, state, WorkflowState::Aggregate);
                aggregate::collect_results(&context, &succeeded_plugins, &mut outputs);
                state = transition(pk, state, WorkflowState::Success);
                (None, None)
            }
            Some(Halt::Failed(code)) => {
                aggregate::collect_results(&context, &succeeded_plugins, &mut outputs);
                state = transition(pk, state, WorkflowState::Failed);
                (Some(code), None)
            }
            Some(Halt::Submission(e)) => {
                warn!(pk, "{}", e);
                aggregate::collect_results(&context, &succeeded_plugins, &mut outputs);
                state = transition(pk, state, WorkflowState::Failed);
                (None, Some(e))
            }
        };

        let descendants: Vec<ProcessNode> = context.finished_nodes().cloned().collect();
        let cleanup = self.on_terminated(&descendants);

        WorkflowOutcome {
            pk,
            state,
            exit_code,
            outputs,
            stages,
            descendants,
            cleanup,
            submission_error,
        }
    }

    /// 终止钩子
    fn on_terminated(&self, descendants: &[ProcessNode]) -> Option<CleanupReport> {
        if !self.request.clean_workdir() {
            info!("remote folders will not be cleaned");
            return None;
        }
        Some(cleanup::clean_workdir(descendants))
    }
}

fn failure_code(result: &StageResult) -> Option<ExitCode> {
    if result.success {
        return None;
    }
    // 未注册的阶段名没有退出码
    Some(result.exit_code.clone().unwrap_or_else(|| ExitCode {
        status: 1,
        label: "ERROR_UNKNOWN_STAGE".to_string(),
        message: format!("Stage {} failed", result.stage),
    }))
}

fn transition(pk: u64, from: WorkflowState, to: WorkflowState) -> WorkflowState {
    debug!(pk, "state {} -> {}", from, to);
    to
}
