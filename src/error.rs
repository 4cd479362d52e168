//! # 统一错误处理模块
//!
//! 定义 qeflow 的所有错误类型，使用 `thiserror` 派生。
//!
//! 子过程的失败（exit status 非零）不是错误，而是 `StageResult`；
//! 这里只包含必须中止调用方的情况：输入不合法、提交失败、I/O 失败。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use thiserror::Error;

/// qeflow 统一错误类型
#[derive(Error, Debug)]
pub enum QeAppError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ─────────────────────────────────────────────────────────────
    // 解析错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse {format} file: {path}\nReason: {reason}")]
    ParseError {
        format: String,
        path: String,
        reason: String,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // 参数与输入校验
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid inputs for namespace '{namespace}':\n  {}", .errors.join("\n  "))]
    InvalidInputs {
        namespace: String,
        errors: Vec<String>,
    },

    // ─────────────────────────────────────────────────────────────
    // 插件注册表
    // ─────────────────────────────────────────────────────────────
    #[error("Entry '{name}' is already registered in group '{group}'")]
    DuplicateEntry { group: String, name: String },

    #[error("Invalid plugin name '{0}': expected a lowercase identifier")]
    InvalidPluginName(String),

    #[error("Plugin name '{0}' is already a workflow output")]
    ReservedPluginName(String),

    #[error("No exit code left for plugin '{name}' (range {first}..={last} exhausted)")]
    ExitCodesExhausted { name: String, first: u32, last: u32 },

    #[error("Unknown stage or plugin: {0}")]
    UnknownStage(String),

    // ─────────────────────────────────────────────────────────────
    // 提交与外部命令
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to submit {process} for stage '{stage}': {reason}")]
    SubmissionError {
        stage: String,
        process: String,
        reason: String,
    },

    #[error("External command '{command}' not found in PATH")]
    CommandNotFound { command: String },

    #[error("External command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    // ─────────────────────────────────────────────────────────────
    // 工作流结果
    // ─────────────────────────────────────────────────────────────
    #[error("Workflow<{pk}> failed with exit status {status}: {message}")]
    WorkflowFailed {
        pk: u64,
        status: u32,
        message: String,
    },

    // ─────────────────────────────────────────────────────────────
    // CSV 错误
    // ─────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // ─────────────────────────────────────────────────────────────
    // 其他
    // ─────────────────────────────────────────────────────────────
    #[error("No matching files found with pattern: {pattern}")]
    NoFilesFound { pattern: String },

    #[error("{0}")]
    Other(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, QeAppError>;
