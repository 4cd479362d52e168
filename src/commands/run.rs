//! # run 子命令实现
//!
//! 参数文档 -> `InputParameters` -> 协议 builder -> `WorkflowRequest`，
//! 然后在选定引擎上运行编排器。
//!
//! ## 输出
//! - 终端表格：每个阶段的 pk、状态和退出码
//! - `<jobs_root>/workflow-<pk>.json`：工作流记录
//! - 可选的 CSV 汇总（追加一行）
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `configure/`, `workflow/`, `engine/`
//! - 使用 `utils/output.rs`, `utils/progress.rs`

use crate::cli::run::{EngineKind, RunArgs};
use crate::configure::ConfigurationForm;
use crate::engine::{Engine, JobStore, LocalEngine, SlurmConfig, SlurmEngine};
use crate::error::{QeAppError, Result};
use crate::models::{Crystal, InputParameters};
use crate::utils::{output, progress};
use crate::workflow::inspector::StageResult;
use crate::workflow::protocol::get_builder_from_protocol;
use crate::workflow::{GlobalOverrides, PluginRegistry, QeAppWorkflow, WorkflowRecord, WorkflowRequest};

use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};

/// 阶段结果行
#[derive(Debug, Clone, Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "PK")]
    pk: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Exit code")]
    exit_code: String,
    #[tabled(rename = "Outputs")]
    outputs: String,
}

impl From<&StageResult> for StageRow {
    fn from(result: &StageResult) -> Self {
        let status = if result.success {
            "finished".to_string()
        } else {
            match result.sub_exit_status {
                Some(code) => format!("failed [{}]", code),
                None => "excepted".to_string(),
            }
        };
        StageRow {
            stage: result.stage.clone(),
            pk: result.pk.map(|pk| pk.to_string()).unwrap_or_else(|| "-".into()),
            status,
            exit_code: result
                .status()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".into()),
            outputs: result.emitted.keys().collect::<Vec<_>>().join(", "),
        }
    }
}

/// CSV 汇总行
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    pk: u64,
    structure: &'a str,
    formula: &'a str,
    state: String,
    exit_status: Option<u32>,
    relax: &'a str,
    properties: &'a str,
    record: String,
}

/// 执行 run
pub fn execute(args: RunArgs, registry: &PluginRegistry) -> Result<()> {
    output::print_header("Running QE App Workflow");

    let parameters = load_parameters(&args.parameters, registry, &args)?;
    let structure = load_structure(&args.structure)?;
    let structure_name = structure.name.clone();

    let overrides = GlobalOverrides {
        kpoints_distance: args.kpoints_distance_override,
        degauss: args.degauss_override,
        smearing: args.smearing_override.clone(),
    };
    let request = get_builder_from_protocol(structure, &parameters, registry)?
        .clean_workdir(args.clean_workdir)
        .overrides(overrides)
        .build(registry)?;

    output::print_field("Structure", &structure_name);
    output::print_field("Formula", &request.structure().formula());
    output::print_field("Protocol", &request.protocol().to_string());
    output::print_field("Relax", request.relax_info().trim_start_matches("relax: "));
    output::print_field(
        "Properties",
        request.properties_info().trim_start_matches("properties: "),
    );
    output::print_field("Jobs root", &args.jobs_root.display().to_string());
    println!();

    let store = Arc::new(JobStore::open(&args.jobs_root)?);
    let engine = create_engine(&args, Arc::clone(&store))?;
    output::print_info(&format!("Using {} engine", engine.name()));

    let spinner = progress::create_spinner("Running workflow...");
    let mut outcome = QeAppWorkflow::new(&request, registry, engine.as_ref()).run();
    spinner.finish_and_clear();

    let rows: Vec<StageRow> = outcome.stages.iter().map(StageRow::from).collect();
    if rows.is_empty() {
        output::print_skip("No stage was enabled");
    } else {
        println!("{}", Table::new(&rows));
    }
    println!();

    let record = WorkflowRecord::from_outcome(&request, &outcome);
    let record_path = record.write(store.root())?;
    output::print_state(outcome.pk, outcome.state);
    if let Some(report) = &outcome.cleanup {
        output::print_info(&format!(
            "Cleaned {} remote folder(s), {} skipped",
            report.cleaned.len(),
            report.skipped
        ));
    }
    output::print_success(&format!("Record written to '{}'", record_path.display()));

    if let Some(summary) = &args.summary {
        append_summary(summary, &structure_name, &request, &record, &record_path)?;
        output::print_success(&format!("Summary appended to '{}'", summary.display()));
    }

    if let Some(e) = outcome.submission_error.take() {
        return Err(e);
    }
    if let (false, Some(code)) = (outcome.is_success(), outcome.exit_code) {
        return Err(QeAppError::WorkflowFailed {
            pk: outcome.pk,
            status: code.status,
            message: code.message,
        });
    }
    output::print_done("Workflow finished");
    Ok(())
}

fn read_json(path: &Path, format: &str) -> Result<Value> {
    if !path.exists() {
        return Err(QeAppError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let content = fs::read_to_string(path).map_err(|e| QeAppError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| QeAppError::ParseError {
        format: format.to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn load_parameters(path: &Path, registry: &PluginRegistry, args: &RunArgs) -> Result<InputParameters> {
    let doc = read_json(path, "parameters")?;
    let mut form = ConfigurationForm::new(registry);
    form.set_input_parameters(&doc)?;
    let mut parameters = form.into_parameters()?;
    if let Some(protocol) = args.protocol {
        parameters.basic.protocol = protocol;
    }
    Ok(parameters)
}

fn load_structure(path: &Path) -> Result<Crystal> {
    let doc = read_json(path, "structure")?;
    serde_json::from_value(doc).map_err(|e| QeAppError::ParseError {
        format: "structure".to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn create_engine(args: &RunArgs, store: Arc<JobStore>) -> Result<Box<dyn Engine>> {
    match args.engine {
        EngineKind::Local => Ok(Box::new(LocalEngine::new(store, &args.launcher, args.jobs)?)),
        EngineKind::Slurm => {
            let config = SlurmConfig {
                partition: args.partition.clone(),
                constraint: args.constraint.clone(),
                nodes: args.nodes,
                ntasks: args.ntasks,
                cpus_per_task: args.cpus_per_task,
                mem_per_cpu: args.mem_per_cpu.clone(),
                time_limit: args.time.clone(),
                modules: args
                    .modules
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect(),
                poll_interval: Duration::from_secs(args.poll_interval.max(1)),
            };
            Ok(Box::new(SlurmEngine::new(store, &args.launcher, config)))
        }
    }
}

fn append_summary(
    path: &Path,
    structure: &str,
    request: &WorkflowRequest,
    record: &WorkflowRecord,
    record_path: &Path,
) -> Result<()> {
    let write_headers = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| QeAppError::FileWriteError {
            path: path.display().to_string(),
            source: e,
        })?;

    let relax = request.relax_info();
    let properties = request.properties_info();
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(write_headers)
        .from_writer(file);
    wtr.serialize(SummaryRow {
        pk: record.pk,
        structure,
        formula: &record.formula,
        state: record.state.to_string(),
        exit_status: record.exit_status,
        relax: &relax,
        properties: &properties,
        record: record_path.display().to_string(),
    })?;
    wtr.flush().map_err(|e| QeAppError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}
