//! # plugins 子命令实现
//!
//! 列出注册表中的子工作流（入口名、退出码）和设置面板。
//!
//! ## 依赖关系
//! - 使用 `workflow/registry.rs`, `workflow/exit_codes.rs`
//! - 使用 `utils/output.rs`

use crate::error::Result;
use crate::utils::output;
use crate::workflow::registry::{PANEL_GROUP, SUBWORKFLOW_GROUP};
use crate::workflow::PluginRegistry;

use tabled::{Table, Tabled};

#[derive(Debug, Clone, Tabled)]
struct PluginRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Process")]
    process: String,
    #[tabled(rename = "Exit code")]
    exit_code: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Panel")]
    panel: String,
}

#[derive(Debug, Clone, Tabled)]
struct ExitCodeRow {
    #[tabled(rename = "Status")]
    status: u32,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// 执行 plugins
pub fn execute(registry: &PluginRegistry) -> Result<()> {
    output::print_header("Registered Plugins");

    let rows = plugin_rows(registry);
    if rows.is_empty() {
        output::print_skip(&format!("No entries in '{}'", SUBWORKFLOW_GROUP));
    } else {
        output::print_info(&format!("Group '{}':", SUBWORKFLOW_GROUP));
        println!("{}", Table::new(&rows));
    }

    let orphan_panels: Vec<&str> = registry
        .panels()
        .iter()
        .filter(|(name, _)| registry.plugin(name).is_none())
        .map(|(name, _)| name.as_str())
        .collect();
    if !orphan_panels.is_empty() {
        output::print_warning(&format!(
            "Panels in '{}' without a sub-workflow: {}",
            PANEL_GROUP,
            orphan_panels.join(", ")
        ));
    }

    println!();
    output::print_info("Exit codes:");
    let codes: Vec<ExitCodeRow> = registry
        .exit_codes()
        .entries()
        .into_iter()
        .map(|(stage, code)| ExitCodeRow {
            status: code.status,
            stage: stage.to_string(),
            message: code.message.clone(),
        })
        .collect();
    println!("{}", Table::new(&codes));
    Ok(())
}

fn plugin_rows(registry: &PluginRegistry) -> Vec<PluginRow> {
    registry
        .list_plugins()
        .iter()
        .map(|(name, descriptor)| {
            let code = registry.exit_codes().for_stage(name);
            PluginRow {
                name: name.clone(),
                process: descriptor.process_label.clone(),
                exit_code: code.map(|c| c.status.to_string()).unwrap_or_else(|| "-".into()),
                label: code.map(|c| c.label.clone()).unwrap_or_default(),
                panel: registry
                    .panel(name)
                    .map(|p| p.title.clone())
                    .unwrap_or_else(|| "-".into()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins;

    #[test]
    fn test_plugin_rows() {
        let registry = PluginRegistry::new(plugins::builtin_entries()).unwrap();
        let rows = plugin_rows(&registry);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "eos");
        assert_eq!(rows[0].panel, "Equation of State (EOS)");
        assert_eq!(rows[1].process, "quantumespresso.xps");
        assert_eq!(rows[1].exit_code, "406");
        assert_eq!(rows[1].label, "ERROR_SUB_PROCESS_FAILED_XPS");
    }
}
