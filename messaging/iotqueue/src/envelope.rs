//! Wire schema for sensor readings.
//!
//! Every listener normalizes its transport payload into an [`Envelope`]
//! before publishing; the dispatcher decodes queue bytes back out. The
//! envelope is internally tagged by the `device` field, so a device always
//! carries exactly the value fields that belong to it:
//!
//! - `{"device": "temperature_sensor", "value": 23.45}`
//! - `{"device": "smoke_sensor", "value1": 0.123, "value2": 0.045}`

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reading for '{device}' is missing field '{field}'")]
    MissingField {
        device: Device,
        field: &'static str,
    },

    #[error("field '{field}' is not numeric")]
    NonNumeric { field: &'static str },
}

/// Device types the pipeline knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    MotionSensor,
    TemperatureSensor,
    HumiditySensor,
    SmokeSensor,
}

impl Device {
    pub const ALL: [Device; 4] = [
        Device::MotionSensor,
        Device::TemperatureSensor,
        Device::HumiditySensor,
        Device::SmokeSensor,
    ];

    /// Wire identifier, as it appears in the `device` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::MotionSensor => "motion_sensor",
            Device::TemperatureSensor => "temperature_sensor",
            Device::HumiditySensor => "humidity_sensor",
            Device::SmokeSensor => "smoke_sensor",
        }
    }

    pub fn from_name(name: &str) -> Option<Device> {
        Device::ALL.iter().copied().find(|d| d.as_str() == name)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized sensor reading, tagged by device type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum Envelope {
    MotionSensor { value: f64 },
    TemperatureSensor { value: f64 },
    HumiditySensor { value: f64 },
    SmokeSensor { value1: f64, value2: f64 },
}

impl Envelope {
    pub fn motion(value: f64) -> Envelope {
        Envelope::MotionSensor { value }
    }

    pub fn temperature(value: f64) -> Envelope {
        Envelope::TemperatureSensor { value }
    }

    pub fn humidity(value: f64) -> Envelope {
        Envelope::HumiditySensor { value }
    }

    pub fn smoke(value1: f64, value2: f64) -> Envelope {
        Envelope::SmokeSensor { value1, value2 }
    }

    pub fn device(&self) -> Device {
        match self {
            Envelope::MotionSensor { .. } => Device::MotionSensor,
            Envelope::TemperatureSensor { .. } => Device::TemperatureSensor,
            Envelope::HumiditySensor { .. } => Device::HumiditySensor,
            Envelope::SmokeSensor { .. } => Device::SmokeSensor,
        }
    }

    /// Canonical queue-message bytes.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Strict decode of well-formed producer output. The dispatcher does
    /// NOT use this directly; queue bytes go through [`RawReading`] first
    /// so unknown devices reach the router instead of failing here.
    pub fn decode(payload: &[u8]) -> Result<Envelope, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Build a typed envelope from a loosely decoded queue message, once
    /// the device is known. Coercion failures surface per field.
    pub fn from_raw(device: Device, raw: &RawReading) -> Result<Envelope, CodecError> {
        match device {
            Device::MotionSensor => Ok(Envelope::motion(raw.numeric(device, "value")?)),
            Device::TemperatureSensor => Ok(Envelope::temperature(raw.numeric(device, "value")?)),
            Device::HumiditySensor => Ok(Envelope::humidity(raw.numeric(device, "value")?)),
            Device::SmokeSensor => Ok(Envelope::smoke(
                raw.numeric(device, "value1")?,
                raw.numeric(device, "value2")?,
            )),
        }
    }
}

/// Loose view of a queue message: nothing about the bytes is trusted yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub value1: Option<serde_json::Value>,
    #[serde(default)]
    pub value2: Option<serde_json::Value>,
}

impl RawReading {
    pub fn decode(payload: &[u8]) -> Result<RawReading, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    fn field(&self, name: &'static str) -> Option<&serde_json::Value> {
        match name {
            "value" => self.value.as_ref(),
            "value1" => self.value1.as_ref(),
            "value2" => self.value2.as_ref(),
            _ => None,
        }
    }

    /// Numbers pass through; numeric strings are accepted the way the
    /// existing producers were tolerated, everything else is rejected.
    fn numeric(&self, device: Device, name: &'static str) -> Result<f64, CodecError> {
        let v = self
            .field(name)
            .ok_or(CodecError::MissingField {
                device,
                field: name,
            })?;

        match v {
            serde_json::Value::Number(n) => {
                n.as_f64().ok_or(CodecError::NonNumeric { field: name })
            }
            serde_json::Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| CodecError::NonNumeric { field: name }),
            _ => Err(CodecError::NonNumeric { field: name }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_every_device() {
        let envelopes = [
            Envelope::motion(1.0),
            Envelope::temperature(23.45),
            Envelope::humidity(55.5),
            Envelope::smoke(0.123, 0.045),
        ];

        for env in envelopes {
            let bytes = env.encode().unwrap();
            let back = Envelope::decode(&bytes).unwrap();
            assert_eq!(env, back);
            assert_eq!(env.device(), back.device());
        }
    }

    #[test]
    fn wire_shape_single_value() {
        let bytes = Envelope::temperature(23.45).encode().unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["device"], "temperature_sensor");
        assert_eq!(v["value"], 23.45);
        assert!(v.get("value1").is_none());
    }

    #[test]
    fn wire_shape_pair() {
        let bytes = Envelope::smoke(0.123, 0.045).encode().unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["device"], "smoke_sensor");
        assert_eq!(v["value1"], 0.123);
        assert_eq!(v["value2"], 0.045);
        assert!(v.get("value").is_none());
    }

    #[test]
    fn device_names_round_trip() {
        for d in Device::ALL {
            assert_eq!(Device::from_name(d.as_str()), Some(d));
        }
        assert_eq!(Device::from_name("unknown_sensor"), None);
    }

    #[test]
    fn raw_reading_coerces_numeric_strings() {
        let raw = RawReading::decode(br#"{"device": "temperature_sensor", "value": "23.45"}"#)
            .unwrap();
        let env = Envelope::from_raw(Device::TemperatureSensor, &raw).unwrap();
        assert_eq!(env, Envelope::temperature(23.45));
    }

    #[test]
    fn raw_reading_rejects_non_numeric() {
        let raw = RawReading::decode(br#"{"device": "motion_sensor", "value": true}"#).unwrap();
        let err = Envelope::from_raw(Device::MotionSensor, &raw).unwrap_err();
        assert!(matches!(err, CodecError::NonNumeric { field: "value" }));
    }

    #[test]
    fn raw_reading_missing_pair_field() {
        let raw = RawReading::decode(br#"{"device": "smoke_sensor", "value1": 0.2}"#).unwrap();
        let err = Envelope::from_raw(Device::SmokeSensor, &raw).unwrap_err();
        assert!(matches!(err, CodecError::MissingField { field: "value2", .. }));
    }
}
