//! # 端口命名空间
//!
//! 嵌套的输入/输出端口树，例如 `scf.pw.parameters`。
//! 支持点分路径读写、弹出、`setdefault` 风格的默认值注入以及过滤视图。
//!
//! ## 依赖关系
//! - 被 `workflow/`, `engine/`, `plugins/` 使用
//! - 使用 `models/data.rs`

use super::data::Data;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 命名空间中的单个端口：叶子值或嵌套命名空间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Value(Data),
    Namespace(Namespace),
}

impl From<Data> for Port {
    fn from(data: Data) -> Self {
        Port::Value(data)
    }
}

impl From<Namespace> for Port {
    fn from(ns: Namespace) -> Self {
        Port::Namespace(ns)
    }
}

impl Port {
    pub fn as_value(&self) -> Option<&Data> {
        match self {
            Port::Value(d) => Some(d),
            Port::Namespace(_) => None,
        }
    }

}

/// 有序的端口命名空间
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace {
    ports: BTreeMap<String, Port>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// 顶层是否存在该端口
    pub fn contains(&self, name: &str) -> bool {
        self.ports.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Port)> {
        self.ports.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 顶层插入（覆盖已有端口）
    pub fn insert(&mut self, name: impl Into<String>, port: impl Into<Port>) -> Option<Port> {
        self.ports.insert(name.into(), port.into())
    }

    /// 链式插入，便于构造输入
    pub fn with(mut self, name: impl Into<String>, port: impl Into<Port>) -> Self {
        self.insert(name, port);
        self
    }

    /// 按点分路径读取端口
    pub fn get(&self, path: &str) -> Option<&Port> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.ports.get(first)?;
        for part in parts {
            current = match current {
                Port::Namespace(ns) => ns.ports.get(part)?,
                Port::Value(_) => return None,
            };
        }
        Some(current)
    }

    pub fn get_value(&self, path: &str) -> Option<&Data> {
        self.get(path).and_then(Port::as_value)
    }

    pub fn get_value_mut(&mut self, path: &str) -> Option<&mut Data> {
        match self.get_mut(path)? {
            Port::Value(d) => Some(d),
            Port::Namespace(_) => None,
        }
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut Port> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.ports.get_mut(first)?;
        for part in parts {
            current = match current {
                Port::Namespace(ns) => ns.ports.get_mut(part)?,
                Port::Value(_) => return None,
            };
        }
        Some(current)
    }

    /// 按点分路径写入，缺失的中间命名空间会被创建，
    /// 路径上已有的叶子值会被命名空间替换。
    pub fn set(&mut self, path: &str, port: impl Into<Port>) {
        match path.split_once('.') {
            None => {
                self.ports.insert(path.to_string(), port.into());
            }
            Some((head, rest)) => {
                let entry = self
                    .ports
                    .entry(head.to_string())
                    .or_insert_with(|| Port::Namespace(Namespace::new()));
                if let Port::Value(_) = entry {
                    *entry = Port::Namespace(Namespace::new());
                }
                if let Port::Namespace(ns) = entry {
                    ns.set(rest, port);
                }
            }
        }
    }

    /// 按点分路径弹出端口；不存在时返回 None
    pub fn pop(&mut self, path: &str) -> Option<Port> {
        match path.rsplit_once('.') {
            None => self.ports.remove(path),
            Some((parent, leaf)) => match self.get_mut(parent)? {
                Port::Namespace(ns) => ns.ports.remove(leaf),
                Port::Value(_) => None,
            },
        }
    }

    /// 在 `path` 处的 Dict 中执行 `dict.setdefault(section, {}).setdefault(key, value)`。
    ///
    /// Dict 不存在时创建；已有的 `key` 保持不变。返回最终生效的值。
    pub fn setdefault_in_dict(&mut self, path: &str, section: &str, key: &str, value: Value) -> Value {
        if self.get_value(path).and_then(Data::as_dict).is_none() {
            self.set(path, Data::Dict(Map::new()));
        }

        let dict = match self.get_value_mut(path).and_then(Data::as_dict_mut) {
            Some(dict) => dict,
            None => return value,
        };
        let section = dict
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        match section.as_object_mut() {
            Some(section) => section.entry(key.to_string()).or_insert(value).clone(),
            None => value,
        }
    }

    /// 返回去掉指定顶层端口后的副本
    pub fn excluding(&self, names: &[&str]) -> Namespace {
        Namespace {
            ports: self
                .ports
                .iter()
                .filter(|(k, _)| !names.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// 深度合并：`other` 中的叶子覆盖当前值，嵌套命名空间递归合并
    pub fn merge(&mut self, other: Namespace) {
        for (name, port) in other.ports {
            match (self.ports.get_mut(&name), port) {
                (Some(Port::Namespace(mine)), Port::Namespace(theirs)) => mine.merge(theirs),
                (_, port) => {
                    self.ports.insert(name, port);
                }
            }
        }
    }
}
