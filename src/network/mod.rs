//! The in-memory bus description: nodes, requests, signals, encoders and
//! schedules, as loaded from a network JSON document (see [`loader`]).

pub mod encoder;
pub mod loader;
pub mod node;
pub mod request;
pub mod schedule;

pub use encoder::{Encoder, Value};
pub use node::Node;
pub use request::{Request, Signal, SignalValue, SignalValueContainer};
pub use schedule::{EntryKind, Phase, PriorityEntry, Schedule, Slots};

use std::sync::Arc;

use crate::error::{Error, Result};

/// Top-level, immutable bus description. Built once by [`loader::load_network`]
/// (or by hand for tests) and shared read-only across the master's threads.
#[derive(Debug, Default)]
pub struct Network {
    pub name: String,
    pub baudrate: u32,
    pub master: Option<Arc<Node>>,
    pub nodes: Vec<Arc<Node>>,
    pub requests: Vec<Arc<Request>>,
    pub encoders: Vec<(String, Arc<Encoder>)>,
    pub schedules: Vec<Arc<Schedule>>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn get_node(&self, name: &str) -> Result<&Arc<Node>> {
        self.nodes.iter().find(|n| n.name == name).ok_or_else(|| Error::Lookup {
            kind: "node",
            key: name.to_string(),
        })
    }

    /// Looks a request up by name or, if `id_or_name` parses as a number,
    /// by its 14-bit id.
    pub fn get_request(&self, id_or_name: &str) -> Result<&Arc<Request>> {
        let as_id = parse_int(id_or_name);
        self.requests
            .iter()
            .find(|r| r.name == id_or_name || as_id.is_some_and(|id| r.id == id))
            .ok_or_else(|| Error::Lookup { kind: "request", key: id_or_name.to_string() })
    }

    pub fn get_request_by_id(&self, id: u16) -> Result<&Arc<Request>> {
        self.requests.iter().find(|r| r.id == id).ok_or_else(|| Error::Lookup {
            kind: "request",
            key: format!("{id:#06x}"),
        })
    }

    pub fn get_encoder(&self, name: &str) -> Result<&Arc<Encoder>> {
        self.encoders
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e)
            .ok_or_else(|| Error::Lookup { kind: "encoder", key: name.to_string() })
    }

    pub fn get_schedule(&self, name: &str) -> Result<&Arc<Schedule>> {
        self.schedules.iter().find(|s| s.name() == name).ok_or_else(|| Error::Lookup {
            kind: "schedule",
            key: name.to_string(),
        })
    }
}

fn parse_int(s: &str) -> Option<u16> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
