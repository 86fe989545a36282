use itertools::Itertools;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::error::DecodeError;

/// Number of samples per channel, fixed by the detector geometry
pub const CHANNEL_WIDTH: usize = 10;

/// [ChannelRecord] holds the first [CHANNEL_WIDTH] samples of one channel,
/// addressed by position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRecord([i64; CHANNEL_WIDTH]);

impl ChannelRecord {
    /// Builds a [ChannelRecord] from a raw sample sequence.
    /// Samples beyond [CHANNEL_WIDTH] are ignored.
    pub fn decompose(samples: &[i64]) -> Result<Self, DecodeError> {
        let values = samples
            .get(..CHANNEL_WIDTH)
            .ok_or(DecodeError::InsufficientSamples(samples.len()))?;

        let mut record = [0; CHANNEL_WIDTH];
        record.copy_from_slice(values);
        Ok(Self(record))
    }

    pub fn values(&self) -> &[i64; CHANNEL_WIDTH] {
        &self.0
    }
}

impl std::fmt::Display for ChannelRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// Indexed as `{"value0": .., "value9": ..}`
impl Serialize for ChannelRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CHANNEL_WIDTH))?;
        for (index, value) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("value{}", index), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::ChannelRecord;
    use crate::error::DecodeError;

    #[test]
    fn exact_width() {
        let samples = (1..=10).collect::<Vec<i64>>();
        let record = ChannelRecord::decompose(&samples).unwrap();
        assert_eq!(record.values(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn surplus_is_ignored() {
        let samples = (0..64).rev().collect::<Vec<i64>>();
        let record = ChannelRecord::decompose(&samples).unwrap();
        assert_eq!(record.values(), &[63, 62, 61, 60, 59, 58, 57, 56, 55, 54]);
    }

    #[test]
    fn insufficient_samples() {
        assert_eq!(
            ChannelRecord::decompose(&[1, 2, 3, 4, 5, 6, 7, 8, 9]),
            Err(DecodeError::InsufficientSamples(9))
        );
        assert_eq!(
            ChannelRecord::decompose(&[]),
            Err(DecodeError::InsufficientSamples(0))
        );
    }

    #[test]
    fn formatting() {
        let record = ChannelRecord::decompose(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        assert_eq!(record.to_string(), "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]");

        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["value0"], 0);
        assert_eq!(json["value9"], 9);
        assert_eq!(json.as_object().unwrap().len(), 10);
    }
}
