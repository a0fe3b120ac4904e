//! Signal encoders: conversion between raw wire integers and physical values.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A physical-side signal value: what callers set and read, as opposed to
/// the raw integer packed onto the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Label(String),
}

impl Value {
    fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::Label(s) => s
                .parse()
                .map_err(|_| Error::NonInteger(format!("{s:?}"))),
        }
    }

    fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Label(s) => Err(Error::NonInteger(format!("{s:?}"))),
        }
    }

    fn label(&self) -> Result<&str> {
        match self {
            Value::Label(s) => Ok(s),
            other => Err(Error::NonInteger(format!("{other:?}"))),
        }
    }
}

/// Converts between a signal's raw wire representation and its physical
/// value. Each variant mirrors one of the encoders a network description can
/// name in its `encoders` table.
#[derive(Debug, Clone)]
pub enum Encoder {
    /// Integer pass-through; rejects non-integer input on encode.
    None,
    /// Linear scaling: `phy = raw*scale + offset`.
    Formula { name: String, scale: f64, offset: f64, unit: String },
    /// Bijective code-to-label table.
    Mapping { name: String, mapping: BTreeMap<i64, String> },
    /// Signed reinterpretation of a `width`-bit unsigned field.
    TwosComplement { width: u32 },
}

impl Encoder {
    /// Encodes a physical value into the unsigned raw integer that gets
    /// packed into the signal's bit field.
    pub fn encode(&self, value: &Value) -> Result<u32> {
        match self {
            Encoder::None => Ok(value.as_i64()? as u32),
            Encoder::Formula { scale, offset, .. } => {
                let phy = value.as_f64()?;
                Ok((((phy - offset) / scale) as i64) as u32)
            }
            Encoder::Mapping { name, mapping } => {
                let label = value.label()?;
                mapping
                    .iter()
                    .find(|(_, v)| v.as_str() == label)
                    .map(|(&code, _)| code as u32)
                    .ok_or_else(|| Error::UnknownLabel {
                        encoder: name.clone(),
                        label: label.to_string(),
                    })
            }
            Encoder::TwosComplement { width } => {
                let v = value.as_i64()?;
                if v < 0 {
                    Ok(((1i64 << width) + v) as u32)
                } else {
                    Ok(v as u32)
                }
            }
        }
    }

    /// Decodes a raw wire integer into its physical value.
    pub fn decode(&self, raw: u32) -> Result<Value> {
        match self {
            Encoder::None => Ok(Value::Int(raw as i64)),
            Encoder::Formula { scale, offset, .. } => Ok(Value::Float(raw as f64 * scale + offset)),
            Encoder::Mapping { name, mapping } => mapping
                .get(&(raw as i64))
                .cloned()
                .map(Value::Label)
                .ok_or_else(|| Error::UnmappedCode {
                    encoder: name.clone(),
                    code: raw as i64,
                }),
            Encoder::TwosComplement { width } => {
                let sign_bit = 1u32 << (width - 1);
                let raw = raw as i64;
                if raw as u32 & sign_bit != 0 {
                    Ok(Value::Int(raw - (1i64 << width)))
                } else {
                    Ok(Value::Int(raw))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_encoder_rejects_non_integer() {
        assert!(matches!(
            Encoder::None.encode(&Value::Label("x".into())),
            Err(Error::NonInteger(_))
        ));
    }

    #[test]
    fn formula_round_trips() {
        let enc = Encoder::Formula {
            name: "speed".into(),
            scale: 0.1,
            offset: 0.0,
            unit: "km/h".into(),
        };
        let raw = enc.encode(&Value::Float(12.3)).unwrap();
        assert_eq!(raw, 123);
        match enc.decode(raw).unwrap() {
            Value::Float(v) => assert!((v - 12.3).abs() < 1e-9),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mapping_unknown_label_and_unmapped_code() {
        let mut mapping = BTreeMap::new();
        mapping.insert(0, "Off".to_string());
        mapping.insert(1, "On".to_string());
        let enc = Encoder::Mapping { name: "relay".into(), mapping };

        assert_eq!(enc.encode(&Value::Label("On".into())).unwrap(), 1);
        assert!(matches!(
            enc.encode(&Value::Label("Unknown".into())),
            Err(Error::UnknownLabel { .. })
        ));
        assert!(matches!(enc.decode(2), Err(Error::UnmappedCode { .. })));
    }

    #[test]
    fn twos_complement_round_trips_negative() {
        let enc = Encoder::TwosComplement { width: 8 };
        let raw = enc.encode(&Value::Int(-1)).unwrap();
        assert_eq!(raw, 0xff);
        assert_eq!(enc.decode(raw).unwrap(), Value::Int(-1));
        assert_eq!(enc.decode(0x7f).unwrap(), Value::Int(127));
    }
}
