//! # 内置插件模块
//!
//! 随程序发布的两个插件，每个插件在注册表中登记两个条目：
//! - `aiidalab_qe.subworkchain`：子工作流描述（schema 与 builder）
//! - `aiidalab_qe.configuration`：设置面板（标题与默认值）
//!
//! ## 插件
//! - `eos`: 状态方程（一组等比缩放体积的 scf）
//! - `xps`: X 射线光电子能谱（按元素的芯空穴计算）
//!
//! ## 依赖关系
//! - 被 `main.rs` 以及测试使用
//! - 使用 `workflow/registry.rs`, `workflow/protocol.rs`, `models/`
//! - 子模块: eos, xps

pub mod eos;
pub mod xps;

use crate::workflow::registry::PluginEntry;

/// 内置插件条目（注册顺序即插件阶段的执行顺序）
pub fn builtin_entries() -> Vec<(String, PluginEntry)> {
    vec![
        ("eos".to_string(), PluginEntry::SubWorkflow(eos::descriptor())),
        ("eos".to_string(), PluginEntry::Panel(eos::panel())),
        ("xps".to_string(), PluginEntry::SubWorkflow(xps::descriptor())),
        ("xps".to_string(), PluginEntry::Panel(xps::panel())),
    ]
}
