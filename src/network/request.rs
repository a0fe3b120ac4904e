//! Requests and the signals packed into their payload.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::network::encoder::{Encoder, Value};

/// A named bit field within a request's payload.
#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub offset: u32,
    pub width: u32,
    pub initial: Value,
    pub encoder: Encoder,
}

/// A decoded signal: the physical value and the raw integer it came from.
#[derive(Debug, Clone)]
pub struct SignalValue {
    pub signal: Arc<Signal>,
    pub phy: Value,
    pub raw: i64,
}

/// Lookup table of a request's signals by name, produced by [`Request::decode`]
/// and used to seed [`crate::master::UserRequest`]'s initial state.
#[derive(Debug, Clone, Default)]
pub struct SignalValueContainer {
    signals: HashMap<String, SignalValue>,
}

impl SignalValueContainer {
    pub fn new(signals: Vec<SignalValue>) -> Self {
        Self {
            signals: signals.into_iter().map(|s| (s.signal.name.clone(), s)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&SignalValue> {
        self.signals.get(name).ok_or_else(|| Error::Lookup {
            kind: "signal",
            key: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalValue> {
        self.signals.values()
    }
}

/// An application-level message: a 14-bit id and a fixed-size payload
/// carrying zero or more [`Signal`]s.
#[derive(Debug)]
pub struct Request {
    pub name: String,
    pub id: u16,
    pub size: u8,
    pub signals: Vec<Arc<Signal>>,
}

impl Request {
    /// Builds a request, sorting signals by offset and rejecting any layout
    /// where a signal overlaps its neighbour or overruns the frame.
    pub fn new(name: impl Into<String>, id: u16, size: u8, mut signals: Vec<Signal>) -> Result<Self> {
        let name = name.into();
        signals.sort_by_key(|s| s.offset);

        let mut cursor = 0u32;
        for signal in &signals {
            if signal.offset < cursor {
                return Err(Error::LayoutError {
                    request: name.clone(),
                    signal: signal.name.clone(),
                    reason: format!("overlaps preceding signal at bit {cursor}"),
                });
            }
            if signal.offset + signal.width > size as u32 * 8 {
                return Err(Error::LayoutError {
                    request: name.clone(),
                    signal: signal.name.clone(),
                    reason: "spans outside the frame".to_string(),
                });
            }
            cursor = signal.offset + signal.width;
        }

        Ok(Self {
            name,
            id,
            size,
            signals: signals.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn get_signal(&self, name: &str) -> Result<&Arc<Signal>> {
        self.signals.iter().find(|s| s.name == name).ok_or_else(|| Error::Lookup {
            kind: "signal",
            key: name.to_string(),
        })
    }

    /// Encodes `values` (falling back to each signal's `initial`) into a
    /// `size`-byte little-endian payload. Padding bits stay zero.
    pub fn encode(&self, values: &HashMap<String, Value>) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; self.size as usize];
        for signal in &self.signals {
            let input = values.get(&signal.name).unwrap_or(&signal.initial);
            let raw = signal.encoder.encode(input)?;
            write_bits(&mut payload, signal.offset, signal.width, raw);
        }
        Ok(payload)
    }

    /// Decodes a response payload into a [`SignalValueContainer`].
    pub fn decode(&self, data: &[u8]) -> Result<SignalValueContainer> {
        let mut out = Vec::with_capacity(self.signals.len());
        for signal in &self.signals {
            let raw = read_bits(data, signal.offset, signal.width);
            let phy = signal.encoder.decode(raw)?;
            out.push(SignalValue { signal: signal.clone(), phy, raw: raw as i64 });
        }
        Ok(SignalValueContainer::new(out))
    }
}

fn write_bits(payload: &mut [u8], offset: u32, width: u32, value: u32) {
    let mask = if width >= 32 { u32::MAX } else { (1u32 << width) - 1 };
    let value = value & mask;
    for bit in 0..width {
        if (value >> bit) & 1 == 0 {
            continue;
        }
        let pos = offset + bit;
        let byte = (pos / 8) as usize;
        let shift = pos % 8;
        if byte < payload.len() {
            payload[byte] |= 1 << shift;
        }
    }
}

fn read_bits(payload: &[u8], offset: u32, width: u32) -> u32 {
    let mut value = 0u32;
    for bit in 0..width {
        let pos = offset + bit;
        let byte = (pos / 8) as usize;
        let shift = pos % 8;
        let set = payload.get(byte).map(|b| (b >> shift) & 1 == 1).unwrap_or(false);
        if set {
            value |= 1 << bit;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wheel_speed() -> Request {
        Request::new(
            "WheelSpeed",
            0x1000,
            5,
            vec![Signal {
                name: "Speed".into(),
                offset: 0,
                width: 16,
                initial: Value::Float(0.0),
                encoder: Encoder::Formula {
                    name: "speed".into(),
                    scale: 0.1,
                    offset: 0.0,
                    unit: "km/h".into(),
                },
            }],
        )
        .unwrap()
    }

    // Scenario C: WheelSpeed.encode({Speed: 12.3}) == [0x7B, 0, 0, 0, 0],
    // and decode round-trips to Speed=12.3.
    #[test]
    fn scenario_c_wheel_speed_encode_decode() {
        let request = wheel_speed();
        let mut values = HashMap::new();
        values.insert("Speed".to_string(), Value::Float(12.3));

        let payload = request.encode(&values).unwrap();
        assert_eq!(payload, vec![0x7B, 0x00, 0x00, 0x00, 0x00]);

        let decoded = request.decode(&payload).unwrap();
        match decoded.get("Speed").unwrap().phy {
            Value::Float(v) => assert!((v - 12.3).abs() < 1e-6),
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_overlapping_signals() {
        let signals = vec![
            Signal { name: "A".into(), offset: 0, width: 8, initial: Value::Int(0), encoder: Encoder::None },
            Signal { name: "B".into(), offset: 4, width: 8, initial: Value::Int(0), encoder: Encoder::None },
        ];
        assert!(matches!(
            Request::new("Overlap", 0x1, 2, signals),
            Err(Error::LayoutError { .. })
        ));
    }

    #[test]
    fn rejects_signal_spanning_outside_frame() {
        let signals = vec![Signal {
            name: "Big".into(),
            offset: 0,
            width: 32,
            initial: Value::Int(0),
            encoder: Encoder::None,
        }];
        assert!(matches!(
            Request::new("TooBig", 0x1, 2, signals),
            Err(Error::LayoutError { .. })
        ));
    }

    #[test]
    fn padding_bits_stay_zero() {
        let signals = vec![Signal {
            name: "Flag".into(),
            offset: 0,
            width: 1,
            initial: Value::Int(1),
            encoder: Encoder::None,
        }];
        let request = Request::new("Padded", 0x1, 1, signals).unwrap();
        let payload = request.encode(&HashMap::new()).unwrap();
        assert_eq!(payload, vec![0x01]);
    }
}
