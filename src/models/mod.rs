//! # 数据模型模块
//!
//! 定义结构、数据节点、端口命名空间、子过程节点和参数模型。
//!
//! ## 依赖关系
//! - 被 `workflow/`, `engine/`, `configure/`, `plugins/`, `commands/` 使用
//! - 子模块: structure, data, namespace, process, parameters

pub mod data;
pub mod namespace;
pub mod parameters;
pub mod process;
pub mod structure;

pub use data::{Data, DataKind, RemoteFolder};
pub use namespace::{Namespace, Port};
pub use parameters::{Codes, InputParameters, Protocol, RelaxType};
pub use process::{ProcessNode, ProcessState, ProcessType};
pub use structure::Crystal;

#[cfg(test)]
pub use data::ArrayData;
#[cfg(test)]
pub use structure::{Atom, Lattice};
