//! Loads a [`Network`] from the JSON description format in use by the
//! network tooling: top-level `baudrate`, `master`, `encoders`, `requests`,
//! `nodes`, `schedules`. Mirrors the original Python loader's two-phase
//! shape: parse the raw JSON object, then resolve the cross references
//! (`publishes`/`subscribes`, schedule entry `node`/`request` names) against
//! the pieces already built.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::network::{EntryKind, Network, Node, Phase, PriorityEntry, Schedule, Signal, Slots};
use crate::network::encoder::{Encoder, Value};

/// Loads and fully resolves a network description from a JSON file on disk.
pub fn load_network(path: impl AsRef<Path>) -> Result<Network> {
    let text = std::fs::read_to_string(path)?;
    load_network_str(&text)
}

/// Loads and fully resolves a network description from a JSON string.
pub fn load_network_str(text: &str) -> Result<Network> {
    let doc: Json = serde_json::from_str(text)?;
    let mut network = Network::new("network");

    network.baudrate = as_u32(field(&doc, "baudrate")?)?;

    for (name, enc) in object(field(&doc, "encoders")?)? {
        network.encoders.push((name.clone(), Arc::new(parse_encoder(name, enc)?)));
    }

    for (name, req) in object(field(&doc, "requests")?)? {
        let layout = object(field(req, "layout")?)?;
        let mut signals = Vec::with_capacity(layout.len());
        for (sig_name, sig) in layout {
            let encoder = match sig.get("encoder").and_then(Json::as_str) {
                Some(enc_name) => (**network.get_encoder(enc_name)?).clone(),
                None => Encoder::None,
            };
            signals.push(parse_signal(sig_name, sig, encoder)?);
        }
        let id = as_u32(field(req, "id")?)? as u16;
        let size = as_u32(field(req, "size")?)? as u8;
        network.requests.push(Arc::new(crate::network::Request::new(name.clone(), id, size, signals)?));
    }

    for (name, nod) in object(field(&doc, "nodes")?)? {
        let address = as_u32(field(nod, "address")?)? as u8;
        let mut node = Node::new(name.clone(), address);
        for publish in string_array(nod.get("publishes"))? {
            node.publishes.push(network.get_request(&publish)?.clone());
        }
        for subscribe in string_array(nod.get("subscribes"))? {
            node.subscribes.push(network.get_request(&subscribe)?.clone());
        }
        network.nodes.push(Arc::new(node));
    }

    let master_name = field(&doc, "master")?
        .as_str()
        .ok_or_else(|| Error::Config("'master' must be a string".to_string()))?;
    network.master = Some(network.get_node(master_name)?.clone());

    for (name, sched) in object(field(&doc, "schedules")?)? {
        network.schedules.push(Arc::new(parse_schedule(name, sched, &network)?));
    }

    Ok(network)
}

fn field<'a>(doc: &'a Json, key: &str) -> Result<&'a Json> {
    doc.get(key).ok_or_else(|| Error::Config(format!("missing required field '{key}'")))
}

fn object(value: &Json) -> Result<&serde_json::Map<String, Json>> {
    value.as_object().ok_or_else(|| Error::Config("expected a JSON object".to_string()))
}

fn string_array(value: Option<&Json>) -> Result<Vec<String>> {
    match value {
        None => Ok(Vec::new()),
        Some(v) => v
            .as_array()
            .ok_or_else(|| Error::Config("expected a JSON array of strings".to_string()))?
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| Error::Config("expected a string".to_string())))
            .collect(),
    }
}

/// Accepts decimal or `0x`-prefixed-string integers, per §6.2.
fn as_u32(value: &Json) -> Result<u32> {
    match value {
        Json::Number(n) => n.as_u64().map(|v| v as u32).ok_or_else(|| Error::Config(format!("integer out of range: {n}"))),
        Json::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u32::from_str_radix(hex, 16).map_err(|e| Error::Config(format!("invalid hex integer {s:?}: {e}")))
            } else {
                s.parse().map_err(|e| Error::Config(format!("invalid integer {s:?}: {e}")))
            }
        }
        other => Err(Error::Config(format!("expected an integer, got {other}"))),
    }
}

fn parse_encoder(name: &str, encoder: &Json) -> Result<Encoder> {
    let kind = field(encoder, "type")?
        .as_str()
        .ok_or_else(|| Error::Config(format!("{name}: 'type' must be a string")))?;
    match kind {
        "formula" => {
            let scale = field(encoder, "scale")?.as_f64().ok_or_else(|| Error::Config(format!("{name}: 'scale' must be a number")))?;
            let offset = field(encoder, "offset")?.as_f64().ok_or_else(|| Error::Config(format!("{name}: 'offset' must be a number")))?;
            let unit = encoder.get("unit").and_then(Json::as_str).unwrap_or("").to_string();
            Ok(Encoder::Formula { name: name.to_string(), scale, offset, unit })
        }
        "mapping" => {
            let raw = object(field(encoder, "mapping")?)?;
            let mut mapping = BTreeMap::new();
            for (code, label) in raw {
                let code: i64 = code
                    .parse()
                    .map_err(|_| Error::Config(format!("{name}: mapping key {code:?} is not an integer")))?;
                let label = label.as_str().ok_or_else(|| Error::Config(format!("{name}: mapping value must be a string")))?;
                mapping.insert(code, label.to_string());
            }
            Ok(Encoder::Mapping { name: name.to_string(), mapping })
        }
        other => Err(Error::Config(format!("{name}: unknown encoder type '{other}'"))),
    }
}

fn parse_signal(name: &str, signal: &Json, encoder: Encoder) -> Result<Signal> {
    let offset = as_u32(field(signal, "offset")?)?;
    let width = as_u32(field(signal, "width")?)?;
    let initial = match signal.get("initial") {
        Some(Json::Number(n)) if n.is_f64() => Value::Float(n.as_f64().unwrap()),
        Some(Json::Number(n)) => Value::Int(n.as_i64().unwrap_or(0)),
        Some(Json::String(s)) => Value::Label(s.clone()),
        _ => Value::Int(0),
    };
    Ok(Signal { name: name.to_string(), offset, width, initial, encoder })
}

fn parse_schedule_entry(name: &str, entry: &Json, network: &Network) -> Result<EntryKind> {
    let kind = field(entry, "type")?
        .as_str()
        .ok_or_else(|| Error::Config(format!("{name}: 'type' must be a string")))?;
    let node_address = |entry: &Json| -> Result<u8> {
        let node_name = field(entry, "node")?
            .as_str()
            .ok_or_else(|| Error::Config(format!("{name}: 'node' must be a string")))?;
        Ok(network.get_node(node_name)?.address)
    };
    Ok(match kind {
        "wakeup" => EntryKind::Wakeup,
        "idle" => EntryKind::Idle,
        "shutdown" => EntryKind::Shutdown,
        "opstatus" => EntryKind::OpStatus(node_address(entry)?),
        "pwrstatus" => EntryKind::PowerStatus(node_address(entry)?),
        "serial" => EntryKind::SerialNumber(node_address(entry)?),
        "swversion" => EntryKind::SoftwareVersion(node_address(entry)?),
        "request" => {
            let req_name = field(entry, "request")?
                .as_str()
                .ok_or_else(|| Error::Config(format!("{name}: 'request' must be a string")))?;
            EntryKind::Request(network.get_request(req_name)?.clone())
        }
        other => return Err(Error::Config(format!("{name}: unknown schedule entry type '{other}'"))),
    })
}

fn parse_slots(schedule: &Json) -> Result<Slots> {
    match schedule.get("slots").and_then(Json::as_str) {
        Some("fixed") => Ok(Slots::Fixed),
        Some("variable") | None => Ok(Slots::Variable),
        Some(other) => Err(Error::Config(format!("unknown slots mode '{other}'"))),
    }
}

fn parse_delay(schedule: &Json) -> Result<Duration> {
    let seconds = field(schedule, "delay")?.as_f64().ok_or_else(|| Error::Config("'delay' must be a number".to_string()))?;
    Ok(Duration::from_secs_f64(seconds.max(0.0)))
}

fn parse_schedule(name: &str, schedule: &Json, network: &Network) -> Result<Schedule> {
    let kind = schedule.get("type").and_then(Json::as_str).unwrap_or("fixed");
    match kind {
        "fixed" => {
            let entries = field(schedule, "entries")?
                .as_array()
                .ok_or_else(|| Error::Config(format!("{name}: 'entries' must be an array")))?
                .iter()
                .map(|e| parse_schedule_entry(name, e, network))
                .collect::<Result<Vec<_>>>()?;
            Ok(Schedule::FixedOrder {
                name: name.to_string(),
                entries,
                slots: parse_slots(schedule)?,
                reserve_slots: true,
                delay: parse_delay(schedule)?,
            })
        }
        "priority-aging" => {
            let phase = match field(schedule, "phase")?.as_str() {
                Some("zero") => Phase::Zero,
                Some("adjusted") => Phase::Adjusted,
                Some(other) => return Err(Error::Config(format!("{name}: unknown phase '{other}'"))),
                None => return Err(Error::Config(format!("{name}: 'phase' is required"))),
            };
            let entries = field(schedule, "entries")?
                .as_array()
                .ok_or_else(|| Error::Config(format!("{name}: 'entries' must be an array")))?
                .iter()
                .map(|e| {
                    let cycle = as_u32(field(e, "cycle")?)?;
                    let max_age = as_u32(field(e, "maxAge")?)?;
                    Ok(PriorityEntry { entry: parse_schedule_entry(name, e, network)?, cycle, max_age })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Schedule::PriorityAging {
                name: name.to_string(),
                entries,
                slots: parse_slots(schedule)?,
                phase,
                reserve_slots: true,
                delay: parse_delay(schedule)?,
            })
        }
        other => Err(Error::Config(format!("{name}: unknown schedule type '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK_JSON: &str = r#"
    {
        "baudrate": 19200,
        "master": "ECU",
        "encoders": {
            "speed": {"type": "formula", "scale": 0.1, "offset": 0, "unit": "km/h"}
        },
        "requests": {
            "WheelSpeed": {
                "id": "0x1000",
                "size": 5,
                "layout": {"Speed": {"offset": 0, "width": 16, "encoder": "speed"}}
            }
        },
        "nodes": {
            "ECU": {"address": 0, "publishes": [], "subscribes": []},
            "RotorSensor": {"address": 1, "publishes": ["WheelSpeed"], "subscribes": []}
        },
        "schedules": {
            "Poll": {
                "type": "fixed",
                "delay": 0.1,
                "entries": [{"type": "request", "request": "WheelSpeed"}]
            }
        }
    }
    "#;

    #[test]
    fn loads_a_complete_network() {
        let network = load_network_str(NETWORK_JSON).unwrap();
        assert_eq!(network.baudrate, 19200);
        assert_eq!(network.master.as_ref().unwrap().name, "ECU");
        let request = network.get_request("WheelSpeed").unwrap();
        assert_eq!(request.id, 0x1000);
        let node = network.get_node("RotorSensor").unwrap();
        assert_eq!(node.publishes.len(), 1);
        assert!(network.get_schedule("Poll").is_ok());
    }

    #[test]
    fn unresolvable_reference_is_a_config_error() {
        let bad = NETWORK_JSON.replace("\"WheelSpeed\"]", "\"NoSuchRequest\"]");
        assert!(matches!(load_network_str(&bad), Err(Error::Lookup { .. })));
    }
}
