//! # 协议 builder
//!
//! 把收集到的 `InputParameters` 转换成 `RequestBuilder`：
//! - relax：`relax_type` 不为 none 时生成 `base` 命名空间
//! - bands / pdos：对应性质勾选时生成 `scf`/`bands` 或 `scf`/`nscf`/`dos`/`projwfc`
//! - 插件：性质勾选时调用插件的 `get_builder`
//!
//! pw 参数先取协议预设，再深度合并 advanced 分区的 overrides
//! （k 点间距、展宽、赝势族）。未启用的阶段不会出现在请求中。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用；`PwBuilder`, `merge_json` 也被 `plugins/`,
//!   `configure/` 使用
//! - 使用 `workflow/request.rs`, `workflow/registry.rs`, `models/`

use super::registry::PluginRegistry;
use super::request::{RequestBuilder, WorkflowRequest, BANDS, PDOS, RELAX};
use crate::error::{QeAppError, Result};
use crate::models::parameters::{ElectronicType, SpinType};
use crate::models::{Codes, Crystal, Data, InputParameters, Namespace, Protocol, RelaxType};

use serde_json::{json, Value};
use tracing::{debug, warn};

const PW_CODE: &str = "pw_code";
const DOS_CODE: &str = "dos_code";
const PROJWFC_CODE: &str = "projwfc_code";

/// 初始磁矩（collinear 自旋时每个 kind 相同）
const STARTING_MAGNETIZATION: f64 = 0.1;

/// 与协议相关但不在 advanced 分区中的数值
struct StageDefaults {
    bands_kpoints_distance: f64,
    nscf_kpoints_distance: f64,
    meta_convergence: bool,
}

fn stage_defaults(protocol: Protocol) -> StageDefaults {
    match protocol {
        Protocol::Fast => StageDefaults {
            bands_kpoints_distance: 0.025,
            nscf_kpoints_distance: 0.5,
            meta_convergence: false,
        },
        Protocol::Moderate => StageDefaults {
            bands_kpoints_distance: 0.025,
            nscf_kpoints_distance: 0.1,
            meta_convergence: true,
        },
        Protocol::Precise => StageDefaults {
            bands_kpoints_distance: 0.015,
            nscf_kpoints_distance: 0.05,
            meta_convergence: true,
        },
    }
}

/// 根据参数构造请求 builder
pub fn get_builder_from_protocol(
    structure: Crystal,
    parameters: &InputParameters,
    registry: &PluginRegistry,
) -> Result<RequestBuilder> {
    let protocol = parameters.basic.protocol;
    let codes = &parameters.codes;
    let defaults = stage_defaults(protocol);
    let pw = PwBuilder::new(&structure, parameters)?;

    let mut builder = WorkflowRequest::builder(structure.clone()).protocol(protocol);

    let relax_type = parameters.workflow.relax_type;
    if let Some(calculation) = relax_type.calculation() {
        let pw_code = require_code(codes, PW_CODE, RELAX)?;
        let relax = Namespace::new()
            .with("base", pw.base(pw_code, calculation, true))
            .with("relax_type", Data::Str(relax_type.to_string()))
            .with(
                "meta_convergence",
                Data::Bool(defaults.meta_convergence && relax_type == RelaxType::PositionsCell),
            )
            .with("volume_convergence", Data::Float(0.02))
            .with("max_meta_convergence_iterations", Data::Int(5));
        builder = builder.stage(RELAX, relax);
    }

    if parameters.workflow.property(BANDS) {
        let pw_code = require_code(codes, PW_CODE, BANDS)?;
        let mut bands_base = pw.base(pw_code, "bands", false);
        bands_base.pop("kpoints_distance");
        let bands = Namespace::new()
            .with("scf", pw.base(pw_code, "scf", true))
            .with("bands", bands_base)
            .with("nbands_factor", Data::Float(3.0))
            .with(
                "bands_kpoints_distance",
                Data::Float(defaults.bands_kpoints_distance),
            );
        builder = builder.stage(BANDS, bands);
    }

    if parameters.workflow.property(PDOS) {
        let pw_code = require_code(codes, PW_CODE, PDOS)?;
        let dos_code = require_code(codes, DOS_CODE, PDOS)?;
        let projwfc_code = require_code(codes, PROJWFC_CODE, PDOS)?;

        // nscf 不接受 advanced overrides，使用四面体占据和更密的 k 点
        let mut nscf = pw.base(pw_code, "nscf", false);
        nscf.set(
            "kpoints_distance",
            Data::Float(defaults.nscf_kpoints_distance),
        );
        if let Some(params) = nscf
            .get_value_mut("pw.parameters")
            .and_then(Data::as_dict_mut)
        {
            merge_json_map(
                params,
                &json!({"SYSTEM": {"occupations": "tetrahedra", "nosym": true}}),
            );
            if let Some(system) = params.get_mut("SYSTEM").and_then(Value::as_object_mut) {
                system.remove("smearing");
                system.remove("degauss");
            }
        }

        let pdos = Namespace::new()
            .with("scf", pw.base(pw_code, "scf", true))
            .with("nscf", nscf)
            .with("dos", post_processing(dos_code, "DOS"))
            .with("projwfc", post_processing(projwfc_code, "PROJWFC"));
        builder = builder.stage(PDOS, pdos);
    }

    for (name, descriptor) in registry.list_plugins() {
        if !parameters.workflow.property(name) {
            builder = builder.pop(name);
            continue;
        }
        let mut plugin = (descriptor.get_builder)(codes, &structure, parameters)?;
        plugin.pop("structure");
        plugin.pop("clean_workdir");
        debug!(plugin = %name, ports = plugin.inputs.len(), "plugin inputs built");
        builder = builder.stage(name.as_str(), plugin.inputs);
    }

    for (name, enabled) in &parameters.workflow.properties {
        let known = name == BANDS || name == PDOS || registry.plugin(name).is_some();
        if *enabled && !known {
            warn!("property '{}' has no registered sub-workflow and is ignored", name);
        }
    }

    Ok(builder)
}

pub(crate) fn require_code<'a>(codes: &'a Codes, key: &str, stage: &str) -> Result<&'a str> {
    codes
        .get(key)
        .map(String::as_str)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            QeAppError::InvalidParameters(format!(
                "code '{}' is required by the {} stage",
                key, stage
            ))
        })
}

/// dos.x / projwfc.x 的输入
fn post_processing(code: &str, namelist: &str) -> Namespace {
    let parameters = json!({ namelist: {"DeltaE": 0.01} });
    Namespace::new()
        .with("code", Data::Code(code.to_string()))
        .with("parameters", Data::dict(parameters).unwrap_or(Data::Dict(Default::default())))
}

/// 生成 PwBaseWorkChain 风格的命名空间
pub(crate) struct PwBuilder {
    system: Value,
    conv_thr: f64,
    kpoints_distance: f64,
    overrides: Value,
    pseudo_family: Option<String>,
}

impl PwBuilder {
    pub(crate) fn new(structure: &Crystal, parameters: &InputParameters) -> Result<Self> {
        if structure.atoms.is_empty() {
            return Err(QeAppError::InvalidParameters(format!(
                "structure '{}' has no atoms",
                structure.name
            )));
        }
        let preset = parameters.basic.protocol.preset();

        let mut system = match parameters.basic.electronic_type {
            ElectronicType::Metal => json!({
                "occupations": "smearing",
                "smearing": preset.smearing,
                "degauss": preset.degauss,
            }),
            ElectronicType::Insulator => json!({"occupations": "fixed"}),
        };
        if parameters.basic.spin_type == SpinType::Collinear {
            if let Some(map) = system.as_object_mut() {
                map.insert("nspin".to_string(), json!(2));
                for kind in structure.kind_names() {
                    map.insert(
                        format!("starting_magnetization({})", kind),
                        json!(STARTING_MAGNETIZATION),
                    );
                }
            }
        }

        let mut overrides = parameters.advanced.pw_overrides();
        if parameters.basic.electronic_type == ElectronicType::Insulator {
            // 固定占据下展宽参数无意义
            if let Some(system) = overrides.pointer_mut("/pw/parameters/SYSTEM") {
                *system = json!({});
            }
        }
        let kpoints_distance = overrides
            .get("kpoints_distance")
            .and_then(Value::as_f64)
            .unwrap_or(preset.kpoints_distance);
        let pseudo_family = overrides
            .get("pseudo_family")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(PwBuilder {
            system,
            conv_thr: preset.conv_thr_per_atom * structure.atoms.len() as f64,
            kpoints_distance,
            overrides,
            pseudo_family,
        })
    }

    /// `calculation` 为 pw.x 的 CONTROL.calculation；`with_overrides` 控制是否
    /// 合并 advanced 分区的 pw 参数
    pub(crate) fn base(&self, code: &str, calculation: &str, with_overrides: bool) -> Namespace {
        let mut parameters = json!({
            "CONTROL": {"calculation": calculation},
            "SYSTEM": self.system.clone(),
            "ELECTRONS": {"conv_thr": self.conv_thr},
        });
        if with_overrides {
            if let Some(patch) = self.overrides.pointer("/pw/parameters") {
                merge_json(&mut parameters, patch);
            }
        }

        let mut pw = Namespace::new()
            .with("code", Data::Code(code.to_string()))
            .with(
                "parameters",
                Data::dict(parameters).unwrap_or(Data::Dict(Default::default())),
            );
        if let Some(family) = &self.pseudo_family {
            pw.insert("pseudo_family", Data::Str(family.clone()));
        }

        Namespace::new()
            .with("pw", pw)
            .with("kpoints_distance", Data::Float(self.kpoints_distance))
    }
}

/// JSON 深度合并：`patch` 的叶子覆盖 `base`
pub(crate) fn merge_json(base: &mut Value, patch: &Value) {
    match (base.as_object_mut(), patch.as_object()) {
        (Some(base_map), Some(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value)
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        _ => *base = patch.clone(),
    }
}

fn merge_json_map(base: &mut serde_json::Map<String, Value>, patch: &Value) {
    let mut wrapped = Value::Object(std::mem::take(base));
    merge_json(&mut wrapped, patch);
    if let Value::Object(map) = wrapped {
        *base = map;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Atom, Lattice};
    use crate::plugins;

    fn iron() -> Crystal {
        let lattice = Lattice::from_vectors([[2.87, 0.0, 0.0], [0.0, 2.87, 0.0], [0.0, 0.0, 2.87]]);
        Crystal::new(
            "Fe",
            lattice,
            vec![
                Atom::new("Fe", [0.0, 0.0, 0.0]),
                Atom::new("Fe", [0.5, 0.5, 0.5]).with_kind("Fe2"),
            ],
        )
    }

    fn codes() -> Codes {
        [
            ("pw_code", "pw-7.2@localhost"),
            ("dos_code", "dos-7.2@localhost"),
            ("projwfc_code", "projwfc-7.2@localhost"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn registry() -> PluginRegistry {
        PluginRegistry::new(plugins::builtin_entries()).unwrap()
    }

    #[test]
    fn test_disabled_stages_are_omitted() {
        let mut parameters = InputParameters::default();
        parameters.workflow.relax_type = RelaxType::None;
        parameters.workflow.properties.insert("bands".into(), true);
        parameters.codes = codes();

        let registry = registry();
        let request = get_builder_from_protocol(iron(), &parameters, &registry)
            .unwrap()
            .build(&registry)
            .unwrap();
        let stages: Vec<&str> = request.stage_names().collect();
        assert_eq!(stages, vec!["bands"]);
    }

    #[test]
    fn test_relax_uses_advanced_overrides() {
        let mut parameters = InputParameters::default();
        parameters.workflow.relax_type = RelaxType::Positions;
        parameters.advanced.pw.kpoints_distance = 0.3;
        parameters.advanced.pw.smearing = "gaussian".to_string();
        parameters.codes = codes();

        let registry = registry();
        let request = get_builder_from_protocol(iron(), &parameters, &registry)
            .unwrap()
            .build(&registry)
            .unwrap();
        let relax = request.stage_inputs(RELAX).unwrap();
        assert_eq!(relax.get_value("base.kpoints_distance"), Some(&Data::Float(0.3)));
        assert!(!relax.contains("base_final_scf"));
        let params = relax.get_value("base.pw.parameters").unwrap().as_dict().unwrap();
        assert_eq!(params["CONTROL"]["calculation"], json!("relax"));
        assert_eq!(params["SYSTEM"]["smearing"], json!("gaussian"));
        assert_eq!(
            relax.get_value("base.pw.pseudo_family").and_then(Data::as_str),
            Some(crate::models::parameters::DEFAULT_PSEUDO_FAMILY)
        );
        assert_eq!(relax.get_value("meta_convergence"), Some(&Data::Bool(false)));
    }

    #[test]
    fn test_pdos_layout_and_collinear_spin() {
        let mut parameters = InputParameters::default();
        parameters.workflow.relax_type = RelaxType::None;
        parameters.workflow.properties.insert("pdos".into(), true);
        parameters.basic.spin_type = SpinType::Collinear;
        parameters.codes = codes();

        let registry = registry();
        let request = get_builder_from_protocol(iron(), &parameters, &registry)
            .unwrap()
            .build(&registry)
            .unwrap();
        let pdos = request.stage_inputs(PDOS).unwrap();
        let nscf = pdos.get_value("nscf.pw.parameters").unwrap().as_dict().unwrap();
        assert_eq!(nscf["SYSTEM"]["occupations"], json!("tetrahedra"));
        assert_eq!(nscf["SYSTEM"]["nspin"], json!(2));
        assert!(nscf["SYSTEM"].get("smearing").is_none());
        assert!(nscf["SYSTEM"].get("starting_magnetization(Fe2)").is_some());
        assert_eq!(
            pdos.get_value("dos.code").and_then(Data::as_str),
            Some("dos-7.2@localhost")
        );
    }

    #[test]
    fn test_missing_code_is_rejected() {
        let mut parameters = InputParameters::default();
        parameters.workflow.properties.insert("pdos".into(), true);
        parameters.codes = [("pw_code".to_string(), "pw@localhost".to_string())]
            .into_iter()
            .collect();

        let err = get_builder_from_protocol(iron(), &parameters, &registry()).unwrap_err();
        assert!(err.to_string().contains("dos_code"));
    }

    #[test]
    fn test_insulator_drops_smearing() {
        let mut parameters = InputParameters::default();
        parameters.basic.electronic_type = ElectronicType::Insulator;
        parameters.codes = codes();

        let registry = registry();
        let request = get_builder_from_protocol(iron(), &parameters, &registry)
            .unwrap()
            .build(&registry)
            .unwrap();
        let params = request
            .stage_inputs(RELAX)
            .and_then(|ns| ns.get_value("base.pw.parameters"))
            .and_then(Data::as_dict)
            .unwrap();
        assert_eq!(params["SYSTEM"], json!({"occupations": "fixed"}));
    }

    #[test]
    fn test_enabled_plugin_gets_namespace() {
        let mut parameters = InputParameters::default();
        parameters.workflow.relax_type = RelaxType::None;
        parameters.workflow.properties.insert("eos".into(), true);
        parameters.codes = codes();

        let registry = registry();
        let request = get_builder_from_protocol(iron(), &parameters, &registry)
            .unwrap()
            .build(&registry)
            .unwrap();
        let eos = request.stage_inputs("eos").unwrap();
        assert!(!eos.contains("structure"));
        assert!(!request.has_stage("xps"));
    }
}
