use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::model::neighbor::Neighbor;

const ROUTER_ID_MIN: i64 = 1;
const ROUTER_ID_MAX: i64 = 64_000;
const PORT_MIN: i64 = 1024;
const PORT_MAX: i64 = 64_000;
const LINK_METRIC_MIN: i64 = 1;
const LINK_METRIC_MAX: i64 = 15;
/// The expiry interval must be exactly this multiple of the periodic one.
const TIMEOUT_RATIO: i64 = 6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Validated router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub router_id: u16,
    pub input_ports: Vec<u16>,
    pub neighbors: Vec<Neighbor>,
    /// T_p, seconds between full advertisements.
    pub periodic_interval: f64,
    /// T_o = 6 * T_p, route expiry and garbage interval.
    pub timeout_interval: f64,
}

#[derive(Debug, Deserialize)]
struct RawRouterConfig {
    router_id: i64,
    /// Comma-separated port list, e.g. "10000,10001".
    input_ports: String,
    /// Comma-separated `port-metric-router_id` triples.
    outputs: String,
    timeout_value: i64,
    periodic_value: i64,
}

pub fn load_router_config(path: &Path) -> Result<RouterConfig> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = parse_router_config(&raw_text)?;
    Ok(cfg)
}

pub fn parse_router_config(raw_text: &str) -> Result<RouterConfig> {
    let raw_cfg: RawRouterConfig =
        serde_yaml::from_str(raw_text).context("failed to parse router config yaml")?;
    Ok(cook(raw_cfg)?)
}

fn cook(raw: RawRouterConfig) -> Result<RouterConfig, ConfigError> {
    let router_id = id_in_range("router_id", raw.router_id)?;

    let mut used_ports = BTreeSet::new();
    let mut input_ports = Vec::new();
    for item in split_list("input_ports", &raw.input_ports)? {
        let port = port_in_range("input_ports", parse_int("input_ports", item)?)?;
        if !used_ports.insert(port) {
            return Err(ConfigError::invalid(
                "input_ports",
                format!("duplicate port {port}"),
            ));
        }
        input_ports.push(port);
    }

    let mut neighbor_ids = BTreeSet::new();
    let mut neighbors = Vec::new();
    for item in split_list("outputs", &raw.outputs)? {
        let parts: Vec<&str> = item.split('-').collect();
        if parts.len() != 3 {
            return Err(ConfigError::invalid(
                "outputs",
                format!("`{item}` is not a port-metric-router_id triple"),
            ));
        }
        let port = port_in_range("outputs", parse_int("outputs", parts[0])?)?;
        if !used_ports.insert(port) {
            return Err(ConfigError::invalid(
                "outputs",
                format!("port {port} already in use"),
            ));
        }
        let link_metric = parse_int("outputs", parts[1])?;
        if !(LINK_METRIC_MIN..=LINK_METRIC_MAX).contains(&link_metric) {
            return Err(ConfigError::invalid(
                "outputs",
                format!("link metric {link_metric} outside [{LINK_METRIC_MIN}, {LINK_METRIC_MAX}]"),
            ));
        }
        let neighbor_id = id_in_range("outputs", parse_int("outputs", parts[2])?)?;
        if neighbor_id == router_id {
            return Err(ConfigError::invalid(
                "outputs",
                format!("neighbor id {neighbor_id} equals own router id"),
            ));
        }
        if !neighbor_ids.insert(neighbor_id) {
            return Err(ConfigError::invalid(
                "outputs",
                format!("duplicate neighbor id {neighbor_id}"),
            ));
        }
        neighbors.push(Neighbor {
            router_id: neighbor_id,
            port,
            link_metric: link_metric as u16,
        });
    }

    if input_ports.is_empty() {
        return Err(ConfigError::invalid("input_ports", "at least one required"));
    }
    if neighbors.is_empty() {
        return Err(ConfigError::invalid("outputs", "at least one required"));
    }

    if raw.periodic_value < 1 {
        return Err(ConfigError::invalid(
            "periodic_value",
            format!("{} is not a positive interval", raw.periodic_value),
        ));
    }
    if raw.timeout_value != TIMEOUT_RATIO * raw.periodic_value {
        return Err(ConfigError::invalid(
            "timeout_value",
            format!(
                "{} is not {TIMEOUT_RATIO} times periodic_value {}",
                raw.timeout_value, raw.periodic_value
            ),
        ));
    }

    Ok(RouterConfig {
        router_id,
        input_ports,
        neighbors,
        periodic_interval: raw.periodic_value as f64,
        timeout_interval: raw.timeout_value as f64,
    })
}

fn split_list<'a>(
    field: &'static str,
    raw: &'a str,
) -> Result<impl Iterator<Item = &'a str>, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::invalid(field, "empty list"));
    }
    Ok(raw.split(',').map(str::trim))
}

fn parse_int(field: &'static str, item: &str) -> Result<i64, ConfigError> {
    item.parse::<i64>()
        .map_err(|_| ConfigError::invalid(field, format!("`{item}` is not an integer")))
}

fn id_in_range(field: &'static str, value: i64) -> Result<u16, ConfigError> {
    if !(ROUTER_ID_MIN..=ROUTER_ID_MAX).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("router id {value} outside [{ROUTER_ID_MIN}, {ROUTER_ID_MAX}]"),
        ));
    }
    Ok(value as u16)
}

fn port_in_range(field: &'static str, value: i64) -> Result<u16, ConfigError> {
    if !(PORT_MIN..=PORT_MAX).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("port {value} outside [{PORT_MIN}, {PORT_MAX}]"),
        ));
    }
    Ok(value as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_text(
        router_id: i64,
        input_ports: &str,
        outputs: &str,
        timeout: i64,
        periodic: i64,
    ) -> String {
        format!(
            "router_id: {router_id}\n\
             input_ports: \"{input_ports}\"\n\
             outputs: \"{outputs}\"\n\
             timeout_value: {timeout}\n\
             periodic_value: {periodic}\n"
        )
    }

    fn reason_of(err: anyhow::Error) -> String {
        err.downcast::<ConfigError>()
            .expect("config error expected")
            .to_string()
    }

    #[test]
    fn valid_config_is_cooked() {
        let text = config_text(1, "10000,10001", "20000-7-2,20001-1-5", 18, 3);
        let cfg = parse_router_config(&text).expect("config should parse");
        assert_eq!(cfg.router_id, 1);
        assert_eq!(cfg.input_ports, vec![10000, 10001]);
        assert_eq!(cfg.neighbors.len(), 2);
        assert_eq!(cfg.neighbors[0].router_id, 2);
        assert_eq!(cfg.neighbors[0].port, 20000);
        assert_eq!(cfg.neighbors[0].link_metric, 7);
        assert_eq!(cfg.periodic_interval, 3.0);
        assert_eq!(cfg.timeout_interval, 18.0);
    }

    #[test]
    fn router_id_out_of_range_is_rejected() {
        let text = config_text(64001, "10000", "20000-1-2", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("router_id"), "{reason}");
    }

    #[test]
    fn duplicate_input_port_is_rejected() {
        let text = config_text(1, "10000,10000", "20000-1-2", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("duplicate port"), "{reason}");
    }

    #[test]
    fn input_port_out_of_range_is_rejected() {
        let text = config_text(1, "1000", "20000-1-2", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("port 1000"), "{reason}");
    }

    #[test]
    fn output_port_colliding_with_input_is_rejected() {
        let text = config_text(1, "10000", "10000-1-2", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("already in use"), "{reason}");
    }

    #[test]
    fn infinite_link_metric_is_rejected() {
        let text = config_text(1, "10000", "20000-16-2", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("link metric 16"), "{reason}");
    }

    #[test]
    fn neighbor_with_own_id_is_rejected() {
        let text = config_text(1, "10000", "20000-1-1", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("own router id"), "{reason}");
    }

    #[test]
    fn duplicate_neighbor_id_is_rejected() {
        let text = config_text(1, "10000", "20000-1-2,20001-3-2", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("duplicate neighbor id"), "{reason}");
    }

    #[test]
    fn malformed_output_triple_is_rejected() {
        let text = config_text(1, "10000", "20000-1", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("triple"), "{reason}");
    }

    #[test]
    fn timeout_ratio_is_enforced() {
        let text = config_text(1, "10000", "20000-1-2", 19, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("6 times"), "{reason}");
    }

    #[test]
    fn empty_outputs_are_rejected() {
        let text = config_text(1, "10000", "", 18, 3);
        let reason = reason_of(parse_router_config(&text).unwrap_err());
        assert!(reason.contains("outputs"), "{reason}");
    }
}
