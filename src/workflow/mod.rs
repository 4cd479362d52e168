//! # 工作流编排模块
//!
//! QE app 顶层工作流：relax -> bands -> pdos -> 插件 -> 汇总，
//! 以及终止时的远程目录清理。
//!
//! ## 依赖关系
//! - 被 `commands/`, `configure/`, `plugins/`, `main.rs` 使用
//! - 使用 `models/`, `engine/`
//! - 子模块: schema, exit_codes, registry, request, controller, context,
//!   executor, inspector, aggregate, cleanup, orchestrator, protocol, record

pub mod aggregate;
pub mod cleanup;
pub mod context;
pub mod controller;
pub mod executor;
pub mod exit_codes;
pub mod inspector;
pub mod orchestrator;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod request;
pub mod schema;

pub use orchestrator::{QeAppWorkflow, WorkflowState};
pub use record::WorkflowRecord;
pub use registry::PluginRegistry;
pub use request::{GlobalOverrides, WorkflowRequest};
