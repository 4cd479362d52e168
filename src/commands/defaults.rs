//! # defaults 子命令实现
//!
//! 打印（或写出）默认参数文档，包含每个已注册插件的分区。
//!
//! ## 依赖关系
//! - 使用 `cli/defaults.rs` 定义的参数
//! - 使用 `configure/`
//! - 使用 `utils/output.rs`

use crate::cli::defaults::DefaultsArgs;
use crate::configure::{ConfigurationForm, Panel};
use crate::error::{QeAppError, Result};
use crate::utils::output;
use crate::workflow::PluginRegistry;

use std::fs;

/// 执行 defaults
pub fn execute(args: DefaultsArgs, registry: &PluginRegistry) -> Result<()> {
    let form = ConfigurationForm::new(registry).with_protocol(args.protocol);
    let content = serde_json::to_string_pretty(&form.get_input_parameters())?;

    match &args.output {
        Some(path) => {
            fs::write(path, content).map_err(|e| QeAppError::FileWriteError {
                path: path.display().to_string(),
                source: e,
            })?;
            output::print_success(&format!(
                "Default parameters ({}) written to '{}'",
                args.protocol,
                path.display()
            ));
            for panel in form.panels() {
                output::print_field(panel.name(), panel.title());
            }
        }
        None => println!("{}", content),
    }
    Ok(())
}
