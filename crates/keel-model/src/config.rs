//! Collective scheduling limits parsed from resource metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Instance limits and interleaving for one clone or bundle, as configured
/// through its meta attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveConfig {
    /// Maximum instances assigned in total (`instances-max`, default: the
    /// number of cluster nodes).
    pub max_total: u32,
    /// Maximum instances assigned to any one node (`instances-per-node`,
    /// default 1).
    pub max_per_node: u32,
    /// Whether orderings against other collectives pair instances
    /// (`interleave`, default false).
    pub interleave: bool,
}

impl CollectiveConfig {
    /// Parse a collective's limits from its meta map.
    pub fn from_meta(meta: &HashMap<String, String>, node_count: u32) -> ModelResult<Self> {
        let max_total = parse_count(meta, "instances-max")?.unwrap_or(node_count);
        let max_per_node = parse_count(meta, "instances-per-node")?.unwrap_or(1);
        let interleave = parse_bool(meta, "interleave")?.unwrap_or(false);
        Ok(CollectiveConfig {
            max_total,
            max_per_node,
            interleave,
        })
    }
}

fn parse_count(meta: &HashMap<String, String>, key: &str) -> ModelResult<Option<u32>> {
    match meta.get(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ModelError::InvalidMeta {
                key: key.to_string(),
                value: value.clone(),
            }),
    }
}

fn parse_bool(meta: &HashMap<String, String>, key: &str) -> ModelResult<Option<bool>> {
    match meta.get(key).map(|v| v.trim()) {
        None => Ok(None),
        Some("true") | Some("yes") | Some("on") | Some("1") => Ok(Some(true)),
        Some("false") | Some("no") | Some("off") | Some("0") => Ok(Some(false)),
        Some(other) => Err(ModelError::InvalidMeta {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}
