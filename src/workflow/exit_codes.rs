//! # 退出码表
//!
//! 内置阶段使用固定退出码；插件阶段按注册顺序在
//! `405..=499` 内逐个枚举分配，同一张表内不会重复。
//!
//! ## 依赖关系
//! - 被 `workflow/registry.rs`, `workflow/inspector.rs`, `commands/` 使用
//! - 使用 `error.rs`

use crate::error::{QeAppError, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ERROR_SUB_PROCESS_FAILED_RELAX: u32 = 401;
pub const ERROR_SUB_PROCESS_FAILED_BANDS: u32 = 403;
pub const ERROR_SUB_PROCESS_FAILED_PDOS: u32 = 404;

/// 插件退出码的可分配区间
pub const PLUGIN_EXIT_CODE_FIRST: u32 = 405;
pub const PLUGIN_EXIT_CODE_LAST: u32 = 499;

/// 单个退出码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCode {
    pub status: u32,
    pub label: String,
    pub message: String,
}

impl ExitCode {
    fn new(status: u32, label: impl Into<String>, message: impl Into<String>) -> Self {
        ExitCode {
            status,
            label: label.into(),
            message: message.into(),
        }
    }
}

/// 阶段名 -> 退出码
#[derive(Debug, Clone, PartialEq)]
pub struct ExitCodeTable {
    by_stage: BTreeMap<String, ExitCode>,
    next_plugin_status: u32,
}

impl Default for ExitCodeTable {
    fn default() -> Self {
        let mut by_stage = BTreeMap::new();
        by_stage.insert(
            "relax".to_string(),
            ExitCode::new(
                ERROR_SUB_PROCESS_FAILED_RELAX,
                "ERROR_SUB_PROCESS_FAILED_RELAX",
                "The PwRelaxWorkChain sub process failed",
            ),
        );
        by_stage.insert(
            "bands".to_string(),
            ExitCode::new(
                ERROR_SUB_PROCESS_FAILED_BANDS,
                "ERROR_SUB_PROCESS_FAILED_BANDS",
                "The PwBandsWorkChain sub process failed",
            ),
        );
        by_stage.insert(
            "pdos".to_string(),
            ExitCode::new(
                ERROR_SUB_PROCESS_FAILED_PDOS,
                "ERROR_SUB_PROCESS_FAILED_PDOS",
                "The PdosWorkChain sub process failed",
            ),
        );
        ExitCodeTable {
            by_stage,
            next_plugin_status: PLUGIN_EXIT_CODE_FIRST,
        }
    }
}

impl ExitCodeTable {
    /// 为插件分配下一个空闲退出码
    pub fn assign_plugin(&mut self, name: &str) -> Result<u32> {
        if self.by_stage.contains_key(name) {
            return Err(QeAppError::DuplicateEntry {
                group: "exit_codes".to_string(),
                name: name.to_string(),
            });
        }
        if self.next_plugin_status > PLUGIN_EXIT_CODE_LAST {
            return Err(QeAppError::ExitCodesExhausted {
                name: name.to_string(),
                first: PLUGIN_EXIT_CODE_FIRST,
                last: PLUGIN_EXIT_CODE_LAST,
            });
        }

        let status = self.next_plugin_status;
        self.next_plugin_status += 1;
        self.by_stage.insert(
            name.to_string(),
            ExitCode::new(
                status,
                format!("ERROR_SUB_PROCESS_FAILED_{}", name.to_uppercase()),
                format!("The plugin {} WorkChain sub process failed", name),
            ),
        );
        Ok(status)
    }

    pub fn for_stage(&self, stage: &str) -> Option<&ExitCode> {
        self.by_stage.get(stage)
    }

    /// 按退出码排序的全部条目
    pub fn entries(&self) -> Vec<(&str, &ExitCode)> {
        let mut entries: Vec<_> = self
            .by_stage
            .iter()
            .map(|(stage, code)| (stage.as_str(), code))
            .collect();
        entries.sort_by_key(|(_, code)| code.status);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_codes() {
        let table = ExitCodeTable::default();
        assert_eq!(table.for_stage("relax").unwrap().status, 401);
        assert_eq!(table.for_stage("bands").unwrap().status, 403);
        assert_eq!(table.for_stage("pdos").unwrap().status, 404);
        assert_eq!(
            table.for_stage("pdos").unwrap().label,
            "ERROR_SUB_PROCESS_FAILED_PDOS"
        );
    }

    #[test]
    fn test_plugin_codes_are_enumerated_without_collision() {
        let mut table = ExitCodeTable::default();
        let eos = table.assign_plugin("eos").unwrap();
        let xps = table.assign_plugin("xps").unwrap();
        assert_eq!((eos, xps), (405, 406));
        assert_eq!(
            table.for_stage("xps").unwrap().label,
            "ERROR_SUB_PROCESS_FAILED_XPS"
        );

        let statuses: HashSet<u32> = table.entries().iter().map(|(_, c)| c.status).collect();
        assert_eq!(statuses.len(), table.entries().len());
    }

    #[test]
    fn test_plugin_code_range_is_bounded() {
        let mut table = ExitCodeTable::default();
        let capacity = PLUGIN_EXIT_CODE_LAST - PLUGIN_EXIT_CODE_FIRST + 1;
        for i in 0..capacity {
            table.assign_plugin(&format!("plugin_{}", i)).unwrap();
        }
        let err = table.assign_plugin("one_too_many").unwrap_err();
        assert!(matches!(err, QeAppError::ExitCodesExhausted { .. }));
    }

    #[test]
    fn test_plugin_cannot_shadow_builtin_stage() {
        let mut table = ExitCodeTable::default();
        assert!(table.assign_plugin("bands").is_err());
    }
}
