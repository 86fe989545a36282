use log::{debug, error, info, warn};

use itertools::Itertools;

use serialport::{DataBits, FlowControl, Parity, StopBits};

use std::{
    fs::File,
    panic::{AssertUnwindSafe, catch_unwind},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

mod interface;

pub use interface::{Input, Interface};

use crate::error::LinkError;

/// Lines longer than this are link noise
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Read chunk size
const CHUNK_SIZE: usize = 4096;

/// Line listener, invoked with each line in arrival order
pub type Listener = Box<dyn FnMut(&str) + Send>;

/// [CloseHandle] stops a [LineSource] from any thread.
#[derive(Debug, Clone)]
pub struct CloseHandle(Arc<AtomicBool>);

impl CloseHandle {
    /// Requests the read loop to stop and release the link. Idempotent.
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// [LineSource] owns the detector link and fans raw lines out to its listeners.
pub struct LineSource {
    /// Ordered device candidates, first match wins
    candidates: Vec<String>,

    /// Active [Interface]
    interface: Option<Interface>,

    /// Name of the active device
    device: String,

    /// Registered listeners, in delivery order
    listeners: Vec<Listener>,

    /// Shared close request
    closed: Arc<AtomicBool>,

    /// True once the absence of a detector has been reported
    missing_reported: bool,

    /// Pending (unterminated) line
    pending: Vec<u8>,

    /// True while skipping the remainder of an overlong line
    discarding: bool,
}

impl LineSource {
    /// Creates a new [LineSource], with no active link
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            interface: None,
            device: String::new(),
            listeners: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
            missing_reported: false,
            pending: Vec::with_capacity(CHUNK_SIZE),
            discarding: false,
        }
    }

    /// Selects the first candidate present on this host.
    /// The absence of a detector is logged once, until one shows up again.
    pub fn discover(&mut self) -> Result<String, LinkError> {
        let available = serialport::available_ports()
            .map(|ports| {
                ports
                    .into_iter()
                    .map(|port| port.port_name)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for candidate in self.candidates.iter() {
            if available.contains(candidate) || Path::new(candidate).exists() {
                debug!("detector candidate {} found", candidate);
                self.missing_reported = false;
                return Ok(candidate.clone());
            }
        }

        if !self.missing_reported {
            warn!(
                "no detector found (candidates: {})",
                self.candidates.iter().join(", ")
            );
            self.missing_reported = true;
        }

        Err(LinkError::Unavailable("no detector found".to_string()))
    }

    /// Opens and configures a serial device: 8 data bits, 1 stop bit, no parity.
    pub fn open(&mut self, device: &str, baud_rate: u32, timeout_ms: u64) -> Result<(), LinkError> {
        let port = serialport::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .map_err(|e| LinkError::Unavailable(format!("{}: {}", device, e)))?;

        info!("{} opened at {} bauds", device, baud_rate);
        self.attach(device, Interface::from_serial_port(port));
        Ok(())
    }

    /// Opens captured files, replayed in order.
    pub fn open_files(&mut self, paths: &[String]) -> Result<(), LinkError> {
        let mut interface: Option<Interface> = None;

        for path in paths.iter() {
            let fd = File::open(path)
                .map_err(|e| LinkError::Unavailable(format!("{}: {}", path, e)))?;

            match interface.as_mut() {
                Some(interface) => interface.stack_file_handle(fd),
                None => interface = Some(Interface::from_file_handle(fd)),
            }
        }

        let interface =
            interface.ok_or_else(|| LinkError::Unavailable("no input file".to_string()))?;

        info!("replaying {}", paths.iter().join(", "));
        self.attach(&paths.iter().join(","), interface);
        Ok(())
    }

    /// Attaches an already opened [Interface].
    /// A close request always wins: a closed [LineSource] never reads again.
    pub fn attach(&mut self, device: &str, interface: Interface) {
        self.device = device.to_string();
        self.interface = Some(interface);
        self.pending.clear();
        self.discarding = false;
    }

    /// Registers a listener. Listeners are served in registration order.
    pub fn subscribe<F: FnMut(&str) + Send + 'static>(&mut self, listener: F) {
        self.listeners.push(Box::new(listener));
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(self.closed.clone())
    }

    /// Releases the link. Idempotent.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.interface.take().is_some() {
            info!("{} closed", self.device);
        }
    }

    /// True when a link is attached and not yet consumed by [LineSource::run]
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    /// Blocking read loop. Returns when the link is closed or read-only content
    /// is exhausted, and on the first read failure. The link is released in
    /// all cases: another [LineSource::open] is required to resume.
    pub fn run(&mut self) -> Result<(), LinkError> {
        let mut interface = self
            .interface
            .take()
            .ok_or_else(|| LinkError::Unavailable("link is not open".to_string()))?;

        let mut chunk = [0; CHUNK_SIZE];

        loop {
            if self.closed.load(Ordering::SeqCst) {
                info!("{} - closing link", self.device);
                self.pending.clear();
                return Ok(());
            }

            match interface.read_available(&mut chunk) {
                Ok(Input::Data(size)) => self.consume(&chunk[..size]),
                Ok(Input::Idle) => {},
                Ok(Input::Exhausted) => {
                    if !self.pending.is_empty() && !self.discarding {
                        let last = std::mem::take(&mut self.pending);
                        self.dispatch(&last);
                    }
                    info!("{} - consumed all content", self.device);
                    return Ok(());
                },
                Err(e) => {
                    error!("{} - read failure: {}", self.device, e);
                    self.pending.clear();
                    return Err(LinkError::ReadFailure(e));
                },
            }
        }
    }

    /// Splits incoming bytes into lines
    fn consume(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.drain(..=end).collect::<Vec<_>>();
            if self.discarding {
                self.discarding = false;
            } else {
                self.dispatch(&line);
            }
        }

        if self.pending.len() > MAX_LINE_LENGTH {
            warn!(
                "{} - discarding {} bytes without line terminator",
                self.device,
                self.pending.len()
            );
            self.pending.clear();
            self.discarding = true;
        }
    }

    /// Delivers one line to every listener. A panicking listener
    /// does not prevent delivery to the following ones.
    fn dispatch(&mut self, raw: &[u8]) {
        let mut raw = raw;
        while let Some((last, rest)) = raw.split_last() {
            if *last == b'\n' || *last == b'\r' {
                raw = rest;
            } else {
                break;
            }
        }

        let line = String::from_utf8_lossy(raw);
        let line = line.as_ref();

        for (index, listener) in self.listeners.iter_mut().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(line))).is_err() {
                error!("{} - listener #{} panicked", self.device, index);
            }
        }
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        self.close();
    }
}
