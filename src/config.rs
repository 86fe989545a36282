use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use log::warn;
use serde::Deserialize;

use crate::error::ConfigError;

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cosmicpi.json";

/// Detector link [LinkSettings]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Device candidates, first match wins
    pub candidates: Vec<String>,

    /// Serial speed
    pub baud_rate: u32,

    /// Serial port timeout, in milliseconds
    pub timeout_ms: u64,

    /// Delay between two attempts to (re)open the link, in milliseconds
    pub retry_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            candidates: vec![
                "/dev/tty.usbmodemfa131".to_string(), // macOS
                "/dev/ttyACM0".to_string(),           // Raspberry Pi
                "/dev/ttyUSB0".to_string(),           // Linux
                "COM3".to_string(),                   // Windows
            ],
            baud_rate: 115_200,
            timeout_ms: 2_000,
            retry_ms: 1_000,
        }
    }
}

impl LinkSettings {
    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PublicationSettings {
    /// Per consumer queue depth
    pub queue_size: usize,

    /// Per event delivery timeout, in milliseconds
    pub consumer_timeout_ms: u64,

    /// Statistics are logged every `stats_interval` published events
    pub stats_interval: u64,
}

impl Default for PublicationSettings {
    fn default() -> Self {
        Self {
            queue_size: 128,
            consumer_timeout_ms: 5_000,
            stats_interval: 100,
        }
    }
}

impl PublicationSettings {
    pub fn consumer_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_timeout_ms)
    }
}

/// Local document index
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("events"),
        }
    }
}

/// Supervision relay
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// `host:port` of the supervision endpoint, disabled when missing
    pub address: Option<String>,
}

/// Event journal (log output)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct JournalSettings {
    pub enabled: bool,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Acquisition [Settings]
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub link: LinkSettings,
    pub publication: PublicationSettings,
    pub index: IndexSettings,
    pub relay: RelaySettings,
    pub journal: JournalSettings,
}

impl Settings {
    /// Loads [Settings] from a JSON file. Missing entries keep their default
    /// value, a missing file yields the default [Settings].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(
                "no configuration file at {}: using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let fd = File::open(path)?;
        let settings = serde_json::from_reader(BufReader::new(fd))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod test {
    use super::{PublicationSettings, Settings};
    use crate::error::ConfigError;
    use std::path::Path;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.link.baud_rate, 115_200);
        assert_eq!(settings.link.timeout_ms, 2_000);
        assert_eq!(settings.link.candidates[1], "/dev/ttyACM0");
        assert_eq!(settings.publication.queue_size, 128);
        assert!(settings.index.enabled);
        assert!(settings.journal.enabled);
        assert_eq!(settings.relay.address, None);
    }

    #[test]
    fn missing_file() {
        let settings = Settings::load(Path::new("/cosmicpi/does/not/exist.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_override() {
        let path = std::env::temp_dir().join(format!("cosmicpi-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "link": { "candidates": ["/dev/ttyS1"], "baud_rate": 9600 },
                "relay": { "address": "localhost:5162" },
                "index": { "enabled": false }
            }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.link.candidates, vec!["/dev/ttyS1"]);
        assert_eq!(settings.link.baud_rate, 9600);
        assert_eq!(settings.link.timeout_ms, 2_000);
        assert_eq!(settings.relay.address.as_deref(), Some("localhost:5162"));
        assert!(!settings.index.enabled);
        assert_eq!(settings.publication, PublicationSettings::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Json(_))));

        let _ = std::fs::remove_file(&path);
    }
}
