use anyhow::{anyhow, Context, Result};
use serde_json::Value as Json;

use converge_core::{object_name, object_namespace, KindKey, ObservedState};

fn max_yaml_bytes() -> usize {
    std::env::var("CONVERGE_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

/// One manifest addressed for a wait.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub object: ObservedState,
    pub kind: KindKey,
    pub name: String,
    pub namespace: Option<String>,
}

/// Parse a single YAML document. `--ns` wins over `metadata.namespace` and is
/// written back into the object so awaiters see the effective namespace.
pub fn parse_manifest(yaml: &str, ns_override: Option<&str>) -> Result<Manifest> {
    if yaml.len() > max_yaml_bytes() {
        return Err(anyhow!("YAML payload too large (>{} bytes)", max_yaml_bytes()));
    }
    let val: serde_yaml::Value = serde_yaml::from_str(yaml).context("parsing YAML")?;
    let mut object: Json = serde_json::to_value(val).context("converting YAML to JSON")?;
    let kind = KindKey::from_object(&object).map_err(|e| anyhow!("YAML {}", e))?;
    let name = object_name(&object).to_string();
    if name.is_empty() {
        return Err(anyhow!("YAML missing metadata.name"));
    }
    let namespace = ns_override.map(str::to_string).or_else(|| object_namespace(&object).map(str::to_string));
    if let (Some(ns), Some(meta)) = (namespace.as_deref(), object.get_mut("metadata").and_then(|m| m.as_object_mut())) {
        meta.insert("namespace".into(), Json::String(ns.to_string()));
    }
    Ok(Manifest { object, kind, name, namespace })
}

pub fn read_manifest(path: &std::path::Path, ns_override: Option<&str>) -> Result<Manifest> {
    let yaml = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_manifest(&yaml, ns_override).with_context(|| format!("in {}", path.display()))
}
