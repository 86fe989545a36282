use log::trace;
use serde::Serialize;

use crate::{
    error::DecodeError,
    nmea::{self, Axis, Sentence},
};

/// Only fix data sentences carry a position with its quality metadata
const FIX_SENTENCE: &str = "GGA";

/// [GeodeticFix] decoded from one GGA sentence.
/// Empty sentence fields are reported as absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeodeticFix {
    /// UTC time of day, in seconds
    pub time_of_day: Option<f64>,

    /// Signed decimal degrees, north positive
    pub latitude: Option<f64>,

    /// Signed decimal degrees, east positive
    pub longitude: Option<f64>,

    /// Fix quality code (0: invalid, 1: GPS, 2: DGPS, ..)
    pub quality: Option<u8>,

    /// Number of satellites in use
    pub satellites: Option<u8>,

    /// Horizontal dilution of precision
    pub horizontal_accuracy: Option<f64>,

    /// Altitude above mean sea level, in meters
    pub altitude: Option<f64>,

    /// Geoidal separation, in meters
    pub geoid_height: Option<f64>,

    /// Age of differential corrections, in seconds
    pub correction_age: Option<f64>,

    /// True when the declared checksum matches the sentence body
    pub checksum_valid: bool,
}

impl GeodeticFix {
    /// Decodes a `$xxGGA` sentence.
    /// A checksum mismatch does not fail the decoding, it is reported
    /// through [GeodeticFix::checksum_valid].
    pub fn decode(sentence: &str) -> Result<Self, DecodeError> {
        let sentence = Sentence::split(sentence)?;

        if sentence.kind != FIX_SENTENCE {
            return Err(DecodeError::UnrecognizedSentence(format!(
                "${}{}",
                sentence.talker, sentence.kind
            )));
        }

        let checksum_valid = match sentence.checksum_valid() {
            Ok(valid) => valid,
            Err(e) => {
                trace!("GGA checksum: {}", e);
                false
            },
        };

        Ok(Self {
            time_of_day: time_of_day(sentence.field(0))?,
            latitude: nmea::coordinate(sentence.field(1), sentence.field(2), Axis::Latitude)?,
            longitude: nmea::coordinate(sentence.field(3), sentence.field(4), Axis::Longitude)?,
            quality: nmea::optional("quality", sentence.field(5))?,
            satellites: nmea::optional("satellites", sentence.field(6))?,
            horizontal_accuracy: nmea::optional("horizontal accuracy", sentence.field(7))?,
            altitude: nmea::optional("altitude", sentence.field(8))?,
            geoid_height: nmea::optional("geoid height", sentence.field(10))?,
            correction_age: nmea::optional("correction age", sentence.field(12))?,
            checksum_valid,
        })
    }

    /// (latitude, longitude) pair, when both are known
    pub fn geo_point(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// `hhmmss[.sss]` to seconds of day
fn time_of_day(value: &str) -> Result<Option<f64>, DecodeError> {
    if value.is_empty() {
        return Ok(None);
    }

    let malformed = || DecodeError::malformed("time", value);

    // checked on bytes: `hhmmss` must be ASCII before slicing
    match value.as_bytes().get(..6) {
        Some(digits) if digits.iter().all(u8::is_ascii_digit) => {},
        _ => return Err(malformed()),
    }

    let hours = value[..2].parse::<u8>().map_err(|_| malformed())?;
    let minutes = value[2..4].parse::<u8>().map_err(|_| malformed())?;
    let seconds = value[4..].parse::<f64>().map_err(|_| malformed())?;

    // 60 is a leap second
    if hours > 23 || minutes > 59 || seconds >= 61.0 {
        return Err(malformed());
    }

    Ok(Some(
        hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds,
    ))
}
