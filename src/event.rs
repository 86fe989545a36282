use hifitime::Epoch;
use serde::{Serialize, Serializer};

use crate::{
    channel::ChannelRecord,
    error::DecodeError,
    packet::{Orientation, Packet, Temperature},
    position::GeodeticFix,
};

/// Raw sample sequences, preserved verbatim
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Energy {
    pub energy1: Vec<i64>,
    pub energy2: Vec<i64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Canonical, immutable [CosmicEvent] as published to every consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmicEvent {
    /// Unique identifier, also the idempotency key of consumers
    pub id: String,

    /// Original GGA sentence
    pub gps: String,

    /// Decoded [GeodeticFix]
    pub fix: GeodeticFix,

    /// Position, when the fix has one
    pub geo_point: Option<GeoPoint>,

    /// Capture [Epoch], assigned at assembly
    #[serde(serialize_with = "unix_milliseconds")]
    pub timestamp: Epoch,

    pub timing: Option<f64>,
    pub energy: Energy,
    pub channel1: ChannelRecord,
    pub channel2: ChannelRecord,
    pub altitude: Option<f64>,
    pub humidity: Option<f64>,
    pub gravitational_orientation: Option<Orientation>,
    pub magnetic_orientation: Option<Orientation>,
    pub temperature: Option<Temperature>,
    pub uptime: Option<f64>,
}

fn unix_milliseconds<S: Serializer>(epoch: &Epoch, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(epoch.to_unix_milliseconds().round() as i64)
}

impl std::fmt::Display for CosmicEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event {} - ", self.id)?;
        match self.geo_point {
            Some(point) => write!(f, "lat={:.4} lon={:.4}", point.lat, point.lon)?,
            None => write!(f, "no position")?,
        }
        if !self.fix.checksum_valid {
            write!(f, " (unverified)")?;
        }
        write!(f, " channel1={} channel2={}", self.channel1, self.channel2)
    }
}

/// [Assembler] turns decoded [Packet]s into [CosmicEvent]s.
#[derive(Debug, Default)]
pub struct Assembler {
    /// Events assembled so far
    sequence: u64,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events assembled so far
    #[cfg(test)]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Assembles one [CosmicEvent] captured at `capture_time`.
    /// The packet is discarded as a whole on any failure: a GGA sentence
    /// that cannot be decoded, or a channel shorter than 10 samples.
    /// A checksum mismatch alone does not prevent assembly.
    pub fn assemble(
        &mut self,
        packet: Packet,
        capture_time: Epoch,
    ) -> Result<CosmicEvent, DecodeError> {
        let gps = packet.gps.ok_or(DecodeError::MissingField("gps"))?;
        let fix = GeodeticFix::decode(&gps)?;

        let energy1 = packet.energy1.unwrap_or_default();
        let energy2 = packet.energy2.unwrap_or_default();

        let channel1 = ChannelRecord::decompose(&energy1)?;
        let channel2 = ChannelRecord::decompose(&energy2)?;

        self.sequence += 1;

        Ok(CosmicEvent {
            id: format!(
                "{:.0}-{}",
                capture_time.to_unix_milliseconds(),
                self.sequence
            ),
            gps,
            geo_point: fix.geo_point().map(|(lat, lon)| GeoPoint { lat, lon }),
            fix,
            timestamp: capture_time,
            timing: packet.timing,
            energy: Energy { energy1, energy2 },
            channel1,
            channel2,
            altitude: packet.altitude,
            humidity: packet.humidity,
            gravitational_orientation: packet.gravitational_orientation,
            magnetic_orientation: packet.magnetic_orientation,
            temperature: packet.temperature,
            uptime: packet.uptime,
        })
    }
}

/// `count` distinct events, in sequence order
#[cfg(test)]
pub(crate) fn fixture(count: usize) -> Vec<CosmicEvent> {
    let mut assembler = Assembler::new();
    let t = Epoch::from_unix_milliseconds(1_700_000_000_000.0);

    (0..count as i64)
        .map(|offset| {
            let samples = (0..10).map(|s| s + offset).collect::<Vec<_>>();
            let packet = Packet {
                gps: Some(
                    "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47".to_string(),
                ),
                energy1: Some(samples.clone()),
                energy2: Some(samples),
                ..Default::default()
            };
            assembler.assemble(packet, t).unwrap()
        })
        .collect()
}
