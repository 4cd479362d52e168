//! # 结果汇总
//!
//! 从已完成的阶段节点中收集固定名称的父工作流输出：
//! - bands：`band_parameters`, `band_structure`
//! - pdos：`nscf_parameters`, `dos`，以及 `projections_up`/`projections_down`
//!   （自旋极化）或 `projections`
//! - 每个成功的插件：以插件名为命名空间的全部输出
//!
//! ## 依赖关系
//! - 被 `workflow/orchestrator.rs`, `workflow/registry.rs` 使用
//! - 使用 `workflow/context.rs`, `models/`

use super::context::StageContext;
use super::request::{BANDS, PDOS};
use crate::models::{Namespace, Port};

use tracing::debug;

/// 内置阶段占用的父工作流输出名，插件不能以此命名
pub const FIXED_OUTPUTS: &[&str] = &[
    "structure",
    "band_parameters",
    "band_structure",
    "nscf_parameters",
    "dos",
    "projections",
    "projections_up",
    "projections_down",
];

/// (父工作流输出名, 子工作流输出路径)
const BANDS_OUTPUTS: &[(&str, &str)] = &[
    ("band_parameters", "band_parameters"),
    ("band_structure", "band_structure"),
];

const PDOS_OUTPUTS: &[(&str, &str)] = &[
    ("nscf_parameters", "nscf.output_parameters"),
    ("dos", "dos.output_dos"),
];

/// 把成功阶段的输出汇总到 `outputs`
///
/// `plugins` 为成功完成的插件阶段名（注册顺序）。
pub fn collect_results(context: &StageContext, plugins: &[String], outputs: &mut Namespace) {
    if let Some(node) = context.finished(BANDS).filter(|n| n.is_finished_ok()) {
        copy_outputs(&node.outputs, BANDS_OUTPUTS, outputs);
    }

    if let Some(node) = context.finished(PDOS).filter(|n| n.is_finished_ok()) {
        copy_outputs(&node.outputs, PDOS_OUTPUTS, outputs);

        if node.outputs.get("projwfc.projections_up").is_some() {
            copy_outputs(
                &node.outputs,
                &[
                    ("projections_up", "projwfc.projections_up"),
                    ("projections_down", "projwfc.projections_down"),
                ],
                outputs,
            );
        } else {
            copy_outputs(
                &node.outputs,
                &[("projections", "projwfc.projections")],
                outputs,
            );
        }
    }

    for name in plugins {
        if let Some(node) = context.finished(name).filter(|n| n.is_finished_ok()) {
            outputs.insert(name.as_str(), Port::Namespace(node.outputs.clone()));
        }
    }
}

fn copy_outputs(source: &Namespace, mapping: &[(&str, &str)], outputs: &mut Namespace) {
    for (label, path) in mapping {
        match source.get(path) {
            Some(port) => {
                outputs.insert(*label, port.clone());
            }
            None => debug!("output '{}' not found, '{}' is skipped", path, label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted;
    use crate::models::{ArrayData, Atom, Crystal, Data, Lattice, ProcessNode};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn context_with(nodes: Vec<(&str, ProcessNode)>) -> StageContext {
        let lattice = Lattice::from_vectors([[3.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 3.0]]);
        let mut context =
            StageContext::new(Crystal::new("Po", lattice, vec![Atom::new("Po", [0.0; 3])]));
        for (stage, node) in nodes {
            context.record_finished(stage, node);
        }
        context
    }

    fn array(kind: &str) -> Data {
        let mut arrays = BTreeMap::new();
        arrays.insert("x".to_string(), vec![0.0, 1.0]);
        Data::Array(ArrayData {
            kind: kind.to_string(),
            arrays,
        })
    }

    fn pdos_node(spin: bool) -> ProcessNode {
        let mut node = scripted::ok_node("pdos");
        node.outputs.set(
            "nscf.output_parameters",
            scripted::dict(json!({"fermi_energy": 5.2})),
        );
        node.outputs.set("dos.output_dos", array("xy"));
        if spin {
            node.outputs.set("projwfc.projections_up", array("orbital"));
            node.outputs.set("projwfc.projections_down", array("orbital"));
        } else {
            node.outputs.set("projwfc.projections", array("orbital"));
        }
        node
    }

    #[test]
    fn test_collects_bands_and_pdos() {
        let bands = scripted::with_output(
            scripted::with_output(
                scripted::ok_node("bands"),
                "band_parameters",
                scripted::dict(json!({"number_of_bands": 12})),
            ),
            "band_structure",
            array("bands"),
        );
        let context = context_with(vec![("bands", bands), ("pdos", pdos_node(false))]);

        let mut outputs = Namespace::new();
        collect_results(&context, &[], &mut outputs);
        let keys: Vec<&str> = outputs.keys().collect();
        assert_eq!(
            keys,
            vec!["band_parameters", "band_structure", "dos", "nscf_parameters", "projections"]
        );
    }

    #[test]
    fn test_spin_polarized_projections() {
        let context = context_with(vec![("pdos", pdos_node(true))]);
        let mut outputs = Namespace::new();
        collect_results(&context, &[], &mut outputs);
        assert!(outputs.contains("projections_up"));
        assert!(outputs.contains("projections_down"));
        assert!(!outputs.contains("projections"));
    }

    #[test]
    fn test_only_successful_plugins_are_collected() {
        let eos = scripted::with_output(
            scripted::ok_node("eos"),
            "eos",
            Data::List(vec![json!([16.0, -310.2])]),
        );
        let xps = scripted::failed_node("xps", 300);
        let context = context_with(vec![("eos", eos), ("xps", xps)]);

        let mut outputs = Namespace::new();
        collect_results(&context, &["eos".to_string(), "xps".to_string()], &mut outputs);
        assert!(outputs.get_value("eos.eos").is_some());
        assert!(!outputs.contains("xps"));
    }
}
