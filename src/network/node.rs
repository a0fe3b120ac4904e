//! Nodes: addressable participants on the bus.

use std::sync::Arc;

use crate::network::request::Request;

/// A physical or simulated bus participant.
#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub address: u8,
    pub publishes: Vec<Arc<Request>>,
    pub subscribes: Vec<Arc<Request>>,
}

impl Node {
    pub fn new(name: impl Into<String>, address: u8) -> Self {
        Self { name: name.into(), address, publishes: Vec::new(), subscribes: Vec::new() }
    }
}
