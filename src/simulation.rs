//! A simulated peripheral: answers published-request polls and diagnostic
//! unicasts the way a real node on the bus would, for exercising a network
//! description without any hardware attached.

use std::collections::HashMap;
use std::sync::Arc;

use crate::constants::{
    REQUEST_ID_MASK, REQ_COND_CHANGE_ADDRESS, REQ_IDLE, REQ_OP_STATUS, REQ_POWER_STATUS,
    REQ_SERIAL_NUMBER, REQ_SHUTDOWN, REQ_SW_NUMBER, REQ_WAKEUP, UNASSIGNED_ID, op_status_code,
};
use crate::network::{Node, SignalValueContainer, Value};
use crate::vbus::BusMember;

/// Raw bytes of a `REQ_POWER_STATUS` response.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerReading {
    pub voltage_dv: u8,
    pub op_current: u16,
    pub sleep_current: u8,
}

/// Hooks a test or CLI tool can install to observe diagnostic broadcasts
/// and subscribed publishes reaching this peripheral.
#[derive(Default)]
pub struct Hooks {
    pub on_wakeup: Option<Box<dyn FnMut() + Send>>,
    pub on_idle: Option<Box<dyn FnMut() + Send>>,
    pub on_shutdown: Option<Box<dyn FnMut() + Send>>,
    pub on_subscribe: Option<Box<dyn FnMut(u16, SignalValueContainer) + Send>>,
}

/// A peripheral node simulated entirely in-process, attached to a
/// [`crate::vbus::VirtualBus`] in place of a real serial-connected device.
pub struct SimulatedPeripheral {
    node: Arc<Node>,
    pub address: Option<u8>,
    pub connected: bool,
    pub op_status: Option<String>,
    pub power_status: Option<PowerReading>,
    pub serial_number: Option<u32>,
    pub software_version: Option<(u8, u8, u8)>,
    outgoing: HashMap<u16, HashMap<String, Value>>,
    hooks: Hooks,
}

impl SimulatedPeripheral {
    pub fn new(node: Arc<Node>) -> Self {
        let outgoing = node.publishes.iter().map(|r| (r.id, HashMap::new())).collect();
        Self {
            address: Some(node.address),
            connected: false,
            op_status: None,
            power_status: None,
            serial_number: None,
            software_version: None,
            outgoing,
            hooks: Hooks::default(),
            node,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn set_hooks(&mut self, hooks: Hooks) {
        self.hooks = hooks;
    }

    /// Sets the outgoing value for `signal` of a published request, used by
    /// whatever is driving this peripheral (a test, or a CLI tool varying
    /// signals over time).
    pub fn set_signal(&mut self, request_id: u16, signal: impl Into<String>, value: Value) {
        self.outgoing.entry(request_id).or_default().insert(signal.into(), value);
    }
}

impl BusMember for SimulatedPeripheral {
    fn on_request(&mut self, request: u16) -> Option<Vec<u8>> {
        if !self.connected {
            return None;
        }

        if let Some(published) = self.node.publishes.iter().find(|r| r.id == request) {
            let values = self.outgoing.get(&request).cloned().unwrap_or_default();
            return match published.encode(&values) {
                Ok(payload) => Some(payload),
                Err(err) => {
                    log::warn!("{}: failed to encode publish for {:#06x}: {err}", self.node.name, request);
                    None
                }
            };
        }

        let address = match self.address {
            Some(a) if a != UNASSIGNED_ID => a,
            _ => return None,
        };
        if (request & 0x0f) as u8 != address {
            return None;
        }

        match request & REQUEST_ID_MASK {
            REQ_OP_STATUS => self
                .op_status
                .as_deref()
                .and_then(op_status_code)
                .map(|code| vec![code]),
            REQ_SERIAL_NUMBER => self.serial_number.map(|s| s.to_le_bytes().to_vec()),
            REQ_SW_NUMBER => self.software_version.map(|(maj, min, patch)| vec![maj, min, patch]),
            REQ_POWER_STATUS => self.power_status.map(|p| {
                vec![p.voltage_dv, (p.op_current & 0xff) as u8, (p.op_current >> 8) as u8, p.sleep_current]
            }),
            _ => None,
        }
    }

    fn on_request_complete(&mut self, request: u16, data: &[u8]) {
        match request {
            REQ_WAKEUP => {
                if let Some(hook) = &mut self.hooks.on_wakeup {
                    hook();
                }
            }
            REQ_IDLE => {
                if let Some(hook) = &mut self.hooks.on_idle {
                    hook();
                }
            }
            REQ_SHUTDOWN => {
                if let Some(hook) = &mut self.hooks.on_shutdown {
                    hook();
                }
            }
            REQ_COND_CHANGE_ADDRESS => {
                if data.len() < 5 {
                    return;
                }
                let serial = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let new_addr = data[4];
                if Some(serial) == self.serial_number {
                    self.address = Some(new_addr);
                } else if self.address == Some(new_addr) {
                    self.address = Some(UNASSIGNED_ID);
                }
            }
            other => {
                if let Some(subscribed) = self.node.subscribes.iter().find(|r| r.id == other) {
                    if let Ok(signals) = subscribed.decode(data) {
                        if let Some(hook) = &mut self.hooks.on_subscribe {
                            hook(other, signals);
                        }
                    }
                }
            }
        }
    }
}
