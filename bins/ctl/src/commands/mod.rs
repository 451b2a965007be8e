//! Subcommand implementations.

pub mod apply;
pub mod plan;

use tcflow::policy::{TrafficClass, TrafficPolicy};
use tcflow::{Error, Result};

/// Build a policy from `--dev`, `--total`, and repeated `--class` specs.
///
/// A class spec is comma-separated `key=value` pairs:
/// `name=web,rate=2mbit,ceil=5mbit,prio=1,dport=80,dport=443`.
/// Keys: `name` (required), `rate`/`guaranteed`, `ceil`/`max`, `prio`,
/// `sport`, `dport`, `sip`, `dip`, `proto`, `app`.
pub fn build_policy(dev: &str, total: &str, class_specs: &[String]) -> Result<TrafficPolicy> {
    let mut policy = TrafficPolicy::new(dev)?.total_bandwidth(total)?;
    for spec in class_specs {
        policy = policy.class(parse_class_spec(spec)?);
    }
    Ok(policy)
}

fn parse_class_spec(spec: &str) -> Result<TrafficClass> {
    let mut name = None;
    let mut pairs = Vec::new();
    for part in spec.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(Error::Validation(format!(
                "class spec entry '{part}' is not key=value"
            )));
        };
        let (key, value) = (key.trim(), value.trim());
        if key == "name" {
            name = Some(value.to_string());
        } else {
            pairs.push((key.to_string(), value.to_string()));
        }
    }
    let Some(name) = name else {
        return Err(Error::Validation(format!(
            "class spec '{spec}' is missing name="
        )));
    };

    let mut class = TrafficClass::new(name);
    for (key, value) in pairs {
        class = match key.as_str() {
            "rate" | "guaranteed" => class.guaranteed(&value)?,
            "ceil" | "max" => class.max(&value)?,
            "prio" | "priority" => {
                let prio: i64 = value
                    .parse()
                    .map_err(|_| Error::Validation(format!("invalid priority: {value}")))?;
                class.priority(prio)
            }
            "sport" => class.source_port(parse_port(&value)?),
            "dport" => class.dest_port(parse_port(&value)?),
            "sip" => class.source_ip(value),
            "dip" => class.dest_ip(value),
            "proto" | "protocol" => class.protocol(value),
            "app" | "application" => class.application(value),
            _ => {
                return Err(Error::Validation(format!(
                    "unknown class spec key: {key}"
                )));
            }
        };
    }
    Ok(class)
}

fn parse_port(value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("invalid port: {value}")))
}

/// Print a JSON value, pretty or compact.
pub fn print_json(value: &serde_json::Value, pretty: bool) {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    } else {
        println!("{value}");
    }
}
