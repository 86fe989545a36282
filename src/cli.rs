use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command, value_parser};

use std::path::PathBuf;

use crate::{
    config::{DEFAULT_CONFIG_PATH, Settings},
    error::ConfigError,
};

pub struct Cli {
    /// Arguments passed by user
    matches: ArgMatches,
}

fn command() -> Command {
    Command::new("cosmicpi-daq")
        .author("CosmicPi contributors")
        .version(env!("CARGO_PKG_VERSION"))
        .about("CosmicPi detector acquisition: serial stream to published events")
        .color(ColorChoice::Always)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILENAME")
                .value_parser(value_parser!(PathBuf))
                .help(format!(
                    "Configuration file (JSON). Default is {}; built-in defaults apply when missing",
                    DEFAULT_CONFIG_PATH
                )),
        )
        .next_help_heading("Serial port (Active detector)")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Define serial port, bypassing discovery. Example /dev/ttyACM0 on Linux"),
        )
        .arg(
            Arg::new("baudrate")
                .short('b')
                .long("baud")
                .value_name("Baudrate (u32)")
                .value_parser(value_parser!(u32))
                .help("Define serial port baud rate. By default we use 115_200"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("Milliseconds")
                .value_parser(value_parser!(u64))
                .help("Serial port timeout. Default is 2000 ms"),
        )
        .next_help_heading("File interface (Replay mode)")
        .arg(
            Arg::new("file")
                .long("file")
                .short('f')
                .value_name("FILENAME")
                .action(ArgAction::Append)
                .conflicts_with("port")
                .help("Replay captured detector output instead of reading a serial port. Files are consumed in order. Can be repeated"),
        )
        .next_help_heading("Publication")
        .arg(
            Arg::new("index")
                .long("index")
                .value_name("DIRECTORY")
                .value_parser(value_parser!(PathBuf))
                .conflicts_with("no-index")
                .help("Index events into this directory. Default is ./events"),
        )
        .arg(
            Arg::new("no-index")
                .long("no-index")
                .action(ArgAction::SetTrue)
                .help("Disable the event index"),
        )
        .arg(
            Arg::new("relay")
                .long("relay")
                .value_name("HOST:PORT")
                .help("Relay events to this supervision endpoint (JSON lines over TCP)"),
        )
        .arg(
            Arg::new("queue-size")
                .long("queue-size")
                .value_name("Events (usize)")
                .value_parser(value_parser!(usize))
                .help("Number of events a consumer may lag behind. Default is 128"),
        )
        .arg(
            Arg::new("consumer-timeout")
                .long("consumer-timeout")
                .value_name("Milliseconds")
                .value_parser(value_parser!(u64))
                .help("Maximal duration of one delivery to one consumer. Default is 5000 ms"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Do not report every event in the log"),
        )
}

impl Cli {
    /// Build new command line interface
    pub fn new() -> Self {
        Self {
            matches: command().get_matches(),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Files to replay, in order. Empty in active mode.
    pub fn files(&self) -> Vec<String> {
        self.matches
            .get_many::<String>("file")
            .map(|files| files.cloned().collect())
            .unwrap_or_default()
    }

    /// Loads the configuration file, then applies command line overrides
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::load(&self.config_path())?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut Settings) {
        if let Some(port) = self.matches.get_one::<String>("port") {
            settings.link.candidates = vec![port.to_string()];
        }
        if let Some(baud_rate) = self.matches.get_one::<u32>("baudrate") {
            settings.link.baud_rate = *baud_rate;
        }
        if let Some(timeout) = self.matches.get_one::<u64>("timeout") {
            settings.link.timeout_ms = *timeout;
        }
        if let Some(path) = self.matches.get_one::<PathBuf>("index") {
            settings.index.enabled = true;
            settings.index.path = path.clone();
        }
        if self.matches.get_flag("no-index") {
            settings.index.enabled = false;
        }
        if let Some(address) = self.matches.get_one::<String>("relay") {
            settings.relay.address = Some(address.to_string());
        }
        if let Some(queue_size) = self.matches.get_one::<usize>("queue-size") {
            settings.publication.queue_size = *queue_size;
        }
        if let Some(timeout) = self.matches.get_one::<u64>("consumer-timeout") {
            settings.publication.consumer_timeout_ms = *timeout;
        }
        if self.matches.get_flag("quiet") {
            settings.journal.enabled = false;
        }
    }
}
