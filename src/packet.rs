use log::trace;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// 3-axis orientation vector
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub z: Option<f64>,
}

/// Pair of temperature probes
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    #[serde(default)]
    pub value1: Option<f64>,
    #[serde(default)]
    pub value2: Option<f64>,
}

/// [Packet] decoded from one detector line, before any semantic validation.
/// Every field is optional: a field that is missing, or present with an
/// unexpected type, is absent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Packet {
    /// GGA positioning sentence
    pub gps: Option<String>,
    pub timing: Option<f64>,
    /// Raw samples of channel 1
    pub energy1: Option<Vec<i64>>,
    /// Raw samples of channel 2
    pub energy2: Option<Vec<i64>>,
    pub altitude: Option<f64>,
    pub humidity: Option<f64>,
    pub gravitational_orientation: Option<Orientation>,
    pub magnetic_orientation: Option<Orientation>,
    pub temperature: Option<Temperature>,
    pub uptime: Option<f64>,
}

impl Packet {
    /// Decodes one raw line. Anything other than a JSON object is a
    /// [DecodeError::MalformedPacket]; unknown keys are ignored.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let value = serde_json::from_str::<Value>(line.trim())
            .map_err(|e| DecodeError::MalformedPacket(e.to_string()))?;

        let Value::Object(map) = value else {
            return Err(DecodeError::MalformedPacket(format!(
                "expecting an object, got \"{}\"",
                value
            )));
        };

        // older firmwares nest both sequences in an "energy" object
        let energy = map.get("energy").and_then(Value::as_object);

        Ok(Self {
            gps: field(&map, "gps"),
            timing: field(&map, "timing"),
            energy1: field(&map, "energy1").or_else(|| energy.and_then(|e| field(e, "energy1"))),
            energy2: field(&map, "energy2").or_else(|| energy.and_then(|e| field(e, "energy2"))),
            altitude: field(&map, "altitude"),
            humidity: field(&map, "humidity"),
            gravitational_orientation: field(&map, "gravitationalOrientation"),
            magnetic_orientation: field(&map, "magneticOrientation"),
            temperature: field(&map, "temperature"),
            uptime: field(&map, "uptime"),
        })
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(value) {
        Ok(t) => Some(t),
        Err(e) => {
            trace!("ignoring \"{}\" field: {}", key, e);
            None
        },
    }
}
