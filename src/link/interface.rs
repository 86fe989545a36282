use serialport::SerialPort;
use std::{
    collections::VecDeque,
    fs::File,
    io::{ErrorKind, Read},
};

/// Outcome of one [Interface::read_available] call
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Input {
    /// Number of bytes received
    Data(usize),
    /// Port read timed out, nothing received
    Idle,
    /// All read-only content has been consumed
    Exhausted,
}

/// [Interface] to the detector stream
pub enum Interface {
    /// [Interface::ReadOnly] replays captured content, mainly File inputs.
    /// Handles are consumed in order.
    ReadOnly(VecDeque<Box<dyn Read + Send>>),

    /// [Interface::Port] is attached to the physical detector.
    Port(Box<dyn SerialPort>),
}

impl Interface {
    /// Creates a new [SerialPort] interface
    pub fn from_serial_port(port: Box<dyn SerialPort>) -> Self {
        Self::Port(port)
    }

    /// Creates a new Read-Only interface
    pub fn from_file_handle(handle: File) -> Self {
        Self::from_reader(handle)
    }

    /// Creates a new Read-Only interface from any [Read]able
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        let mut handles = VecDeque::<Box<dyn Read + Send>>::with_capacity(1);
        handles.push_back(Box::new(reader));
        Self::ReadOnly(handles)
    }

    /// Stacks one more file, consumed once previous content is exhausted
    pub fn stack_file_handle(&mut self, handle: File) {
        if let Self::ReadOnly(handles) = self {
            handles.push_back(Box::new(handle));
        }
    }

    /// Reads available bytes, converting port timeouts into [Input::Idle].
    /// A port that reports end of stream has been unplugged.
    pub fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<Input> {
        match self {
            Self::Port(port) => match port.read(buf) {
                Ok(0) => Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "device hung up",
                )),
                Ok(size) => Ok(Input::Data(size)),
                Err(e) if e.kind() == ErrorKind::TimedOut => Ok(Input::Idle),
                Err(e) if e.kind() == ErrorKind::Interrupted => Ok(Input::Idle),
                Err(e) => Err(e),
            },
            Self::ReadOnly(handles) => {
                while let Some(handle) = handles.front_mut() {
                    match handle.read(buf) {
                        Ok(0) => {
                            handles.pop_front();
                        },
                        Ok(size) => return Ok(Input::Data(size)),
                        Err(e) if e.kind() == ErrorKind::Interrupted => {},
                        Err(e) => return Err(e),
                    }
                }
                Ok(Input::Exhausted)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Input, Interface};
    use std::io::Cursor;

    #[test]
    fn stacked_readers() {
        let mut interface = Interface::from_reader(Cursor::new(b"ab".to_vec()));
        if let Interface::ReadOnly(handles) = &mut interface {
            handles.push_back(Box::new(Cursor::new(b"cd".to_vec())));
        }

        let mut buf = [0; 8];
        let mut content = Vec::new();
        while let Input::Data(size) = interface.read_available(&mut buf).unwrap() {
            content.extend_from_slice(&buf[..size]);
        }
        assert_eq!(content, b"abcd");
        assert_eq!(interface.read_available(&mut buf).unwrap(), Input::Exhausted);
    }
}
