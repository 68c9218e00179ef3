//! Transport seam between the device handle and the serial port
//!
//! The board is always reached over a serial line; the trait exists so the
//! reader thread can hold its own clone of the port and so tests can swap in
//! the simulated board.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::SerialPort;

/// Byte transport to a ranging board
pub trait RangingLink: Read + Write + Send {
    /// Set the timeout for blocking reads
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard everything the board sent that was not consumed yet
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Clone the link; reader and foreground each hold one end
    fn try_clone(&self) -> io::Result<Box<dyn RangingLink>>;

    /// Number of bytes available without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// Serial port wrapper implementing [`RangingLink`]
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Wraps an already opened and configured port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl RangingLink for SerialLink {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn try_clone(&self) -> io::Result<Box<dyn RangingLink>> {
        let port_clone = self
            .port
            .try_clone()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Box::new(SerialLink::new(port_clone)))
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}
