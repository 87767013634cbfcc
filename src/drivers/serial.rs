use std::io::{Read, Write};
use std::time::Duration;
use anyhow::{Context, Result};
use log::info;
use serialport::SerialPort;
use crate::drivers::transport::DeviceTransport;
use crate::drivers::GeneratorError;
const MAX_LINE: usize = 64 * 1024;
/// SCPI over a plain serial line (RS-232 or USB-CDC), newline terminated.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}
impl SerialLink {
    pub fn open(name: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(name, baud)
            .timeout(timeout)
            .open()
            .with_context(|| format!("Failed to open serial port {name}"))?;
        info!("serial link open: {name} @ {baud}");
        Ok(Self { port })
    }
}
/// Reads one reply line, dropping the terminator. A timeout surfaces as an io error.
fn read_line<R: Read + ?Sized>(reader: &mut R) -> Result<String, GeneratorError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte)?;
        if n == 0 {
            if line.is_empty() {
                return Err(GeneratorError::Transport("device closed the line".into()));
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_LINE {
            return Err(GeneratorError::Transport("reply exceeds line limit".into()));
        }
    }
    Ok(String::from_utf8_lossy(&line).trim_end().to_string())
}
impl DeviceTransport for SerialLink {
    fn send(&mut self, command: &str) -> Result<(), GeneratorError> {
        self.port.write_all(format!("{command}\n").as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, GeneratorError> {
        self.send(command)?;
        read_line(&mut self.port)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    #[test]
    fn reads_up_to_newline() {
        let mut input = Cursor::new(b"1.000000000e+03\r\nSIN\n".to_vec());
        assert_eq!(read_line(&mut input).unwrap(), "1.000000000e+03");
        assert_eq!(read_line(&mut input).unwrap(), "SIN");
    }
    #[test]
    fn closed_line_is_a_transport_error() {
        let mut input = Cursor::new(Vec::new());
        assert!(matches!(read_line(&mut input), Err(GeneratorError::Transport(_))));
    }
    #[test]
    fn unterminated_tail_is_returned() {
        let mut input = Cursor::new(b"ON".to_vec());
        assert_eq!(read_line(&mut input).unwrap(), "ON");
    }
}
