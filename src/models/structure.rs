//! # 晶体结构数据模型
//!
//! 工作流输入与 relax / bands 阶段输出的结构表示。结构以 JSON 形式
//! 在编排器、作业目录和 launcher 之间传递。
//!
//! ## 依赖关系
//! - 被 `models/data.rs`, `workflow/`, `plugins/` 使用
//! - 无外部模块依赖

use serde::{Deserialize, Serialize};

/// 几何比较的默认容差 (Å)
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// 晶格参数表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lattice {
    /// 晶格向量矩阵 (3x3)，行向量表示 a, b, c
    pub matrix: [[f64; 3]; 3],
}

impl Lattice {
    fn approx_eq(&self, other: &Lattice, tol: f64) -> bool {
        self.matrix
            .iter()
            .flatten()
            .zip(other.matrix.iter().flatten())
            .all(|(x, y)| (x - y).abs() <= tol)
    }
}

/// 原子信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// 元素符号
    pub element: String,

    /// 分数坐标 [x, y, z]
    pub position: [f64; 3],

    /// kind 名称（例如磁性计算中区分 Fe1/Fe2），缺省时与元素相同
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Atom {
    pub fn kind_name(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.element)
    }
}

/// 晶体结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crystal {
    /// 结构名称
    pub name: String,

    /// 晶格
    pub lattice: Lattice,

    /// 原子列表
    pub atoms: Vec<Atom>,
}

impl Crystal {
    /// 计算化学式（元素按字母序）
    pub fn formula(&self) -> String {
        use std::collections::BTreeMap;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();

        for atom in &self.atoms {
            *counts.entry(atom.element.as_str()).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(el, count)| {
                if count == 1 {
                    el.to_string()
                } else {
                    format!("{}{}", el, count)
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// 去重后的元素列表（按首次出现顺序）
    pub fn elements(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for atom in &self.atoms {
            if !seen.contains(&atom.element.as_str()) {
                seen.push(atom.element.as_str());
            }
        }
        seen
    }

    /// 去重后的 kind 名称列表
    pub fn kind_names(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for atom in &self.atoms {
            if !seen.contains(&atom.kind_name()) {
                seen.push(atom.kind_name());
            }
        }
        seen
    }

    /// 两个结构的几何是否一致（晶格与原子坐标在容差内相同）
    pub fn same_geometry(&self, other: &Crystal, tol: f64) -> bool {
        self.atoms.len() == other.atoms.len()
            && self.lattice.approx_eq(&other.lattice, tol)
            && self.atoms.iter().zip(&other.atoms).all(|(a, b)| {
                a.element == b.element
                    && a.position
                        .iter()
                        .zip(b.position.iter())
                        .all(|(x, y)| (x - y).abs() <= tol)
            })
    }
}

// 结构通常从 JSON 读入；以下构造函数只供测试使用
#[cfg(test)]
impl Lattice {
    pub fn from_vectors(matrix: [[f64; 3]; 3]) -> Self {
        Lattice { matrix }
    }
}

#[cfg(test)]
impl Atom {
    pub fn new(element: impl Into<String>, position: [f64; 3]) -> Self {
        Atom {
            element: element.into(),
            position,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[cfg(test)]
impl Crystal {
    pub fn new(name: impl Into<String>, lattice: Lattice, atoms: Vec<Atom>) -> Self {
        Crystal {
            name: name.into(),
            lattice,
            atoms,
        }
    }
}
