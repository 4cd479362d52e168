//! # 数据节点模型
//!
//! 工作流输入端口和输出端口上流动的值。序列化为
//! `{"type": "...", "value": ...}`，便于 launcher 端解析。
//!
//! ## 依赖关系
//! - 被 `models/namespace.rs`, `models/process.rs`, `workflow/` 使用
//! - 使用 `models/structure.rs`

use super::structure::Crystal;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use walkdir::WalkDir;

/// 数据节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Data {
    Structure(Crystal),
    Dict(Map<String, Value>),
    RemoteFolder(RemoteFolder),
    /// 代码标签，如 `pw-7.2@localhost`
    Code(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// 能带、态密度、投影等数值数组
    Array(ArrayData),
}

/// 数据节点类型（用于输入 schema 校验）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Structure,
    Dict,
    RemoteFolder,
    Code,
    Bool,
    Int,
    Float,
    Str,
    List,
    Array,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Structure => "structure",
            DataKind::Dict => "dict",
            DataKind::RemoteFolder => "remote_folder",
            DataKind::Code => "code",
            DataKind::Bool => "bool",
            DataKind::Int => "int",
            DataKind::Float => "float",
            DataKind::Str => "str",
            DataKind::List => "list",
            DataKind::Array => "array",
        };
        write!(f, "{}", name)
    }
}

impl Data {
    pub fn kind(&self) -> DataKind {
        match self {
            Data::Structure(_) => DataKind::Structure,
            Data::Dict(_) => DataKind::Dict,
            Data::RemoteFolder(_) => DataKind::RemoteFolder,
            Data::Code(_) => DataKind::Code,
            Data::Bool(_) => DataKind::Bool,
            Data::Int(_) => DataKind::Int,
            Data::Float(_) => DataKind::Float,
            Data::Str(_) => DataKind::Str,
            Data::List(_) => DataKind::List,
            Data::Array(_) => DataKind::Array,
        }
    }

    /// 从 JSON 对象构造 Dict 节点；非对象值返回 None
    pub fn dict(value: Value) -> Option<Data> {
        match value {
            Value::Object(map) => Some(Data::Dict(map)),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&Crystal> {
        match self {
            Data::Structure(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Map<String, Value>> {
        match self {
            Data::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Map<String, Value>> {
        match self {
            Data::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_remote_folder(&self) -> Option<&RemoteFolder> {
        match self {
            Data::RemoteFolder(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::Str(s) | Data::Code(s) => Some(s),
            _ => None,
        }
    }
}

/// 数值数组节点（BandsData / XyData / Orbital 的统一表示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayData {
    /// 数组类别，如 `bands`, `xy`, `orbital`
    pub kind: String,
    #[serde(default)]
    pub arrays: BTreeMap<String, Vec<f64>>,
}

/// 远程工作目录引用
///
/// 后续阶段可以复用其中的中间结果（例如 SCF 电荷密度）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFolder {
    /// 计算所在机器
    #[serde(default = "default_computer")]
    pub computer: String,
    /// 工作目录的绝对路径
    pub path: PathBuf,
}

fn default_computer() -> String {
    "localhost".to_string()
}

#[cfg(test)]
impl RemoteFolder {
    pub fn new(computer: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        RemoteFolder {
            computer: computer.into(),
            path: path.into(),
        }
    }
}

impl RemoteFolder {
    /// 删除工作目录的全部内容以及目录本身，返回删除的文件数。
    ///
    /// 目录不存在时返回 `NotFound`，调用方据此判断是否已经清理过。
    pub fn clean(&self) -> io::Result<usize> {
        if !self.path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("remote folder '{}' does not exist", self.path.display()),
            ));
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.path).contents_first(true) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                std::fs::remove_dir(entry.path())?;
            } else {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_json_layout() {
        let data = Data::Float(0.15);
        let encoded = serde_json::to_value(&data).unwrap();
        assert_eq!(encoded, json!({"type": "float", "value": 0.15}));

        let dict: Data =
            serde_json::from_value(json!({"type": "dict", "value": {"SYSTEM": {"nbnd": 8}}}))
                .unwrap();
        assert_eq!(dict.kind(), DataKind::Dict);
        assert_eq!(dict.as_dict().unwrap()["SYSTEM"]["nbnd"], json!(8));
    }

    #[test]
    fn test_remote_folder_clean_twice() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("calc");
        std::fs::create_dir_all(work.join("out")).unwrap();
        std::fs::write(work.join("aiida.in"), "&CONTROL /").unwrap();
        std::fs::write(work.join("out").join("charge-density.dat"), "x").unwrap();

        let remote = RemoteFolder::new("localhost", &work);
        assert_eq!(remote.clean().unwrap(), 2);
        assert!(!work.exists());

        let err = remote.clean().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
