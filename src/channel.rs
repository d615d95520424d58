// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, Parity, StopBits};

// ============================================================================
// Channel Trait
// ============================================================================

/// An ordered, blocking, bidirectional byte stream.
///
/// Both directions may complete short; anything that needs an exact count
/// goes through [`Channel::read_exact`] / [`Channel::write_all`], which
/// re-enter until satisfied or the stream fails. Timeouts are the channel's
/// concern and surface as read errors.
pub trait Channel: Send {
    /// Read up to `buf.len()` bytes, returning the count delivered.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a prefix of `buf`, returning the count committed.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read until `buf` is full.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "channel closed mid-read",
                    ))
                }
                Ok(n) => filled += n,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write until `buf` is drained.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut sent = 0;
        while sent < buf.len() {
            match self.write(&buf[sent..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "channel refused to accept bytes",
                    ))
                }
                Ok(n) => sent += n,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

// ============================================================================
// Serial Line Implementation
// ============================================================================

/// Line speed used by both ends of a transfer.
pub const BAUD_RATE: u32 = 115_200;

/// A dead line surfaces as a timed-out read rather than blocking forever.
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Serial line opened at 115200 baud, 8 data bits, no parity, one stop bit.
pub struct SerialChannel {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialChannel {
    /// Open `port_name` with the fixed line settings.
    pub fn open(port_name: &str) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()?;

        Ok(SerialChannel { port })
    }
}

impl Channel for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.port.write(buf)?;
        self.port.flush()?;
        Ok(n)
    }
}

// ============================================================================
// Scripted Channel for Testing
// ============================================================================

/// Replays canned read chunks and records every write.
///
/// Reads deliver at most one scripted chunk at a time, so exact-count
/// callers genuinely re-enter the read loop. On drop the complete write log
/// is checked against the expectation and the script must be exhausted.
#[cfg(test)]
pub struct ScriptedChannel {
    reads: std::collections::VecDeque<Vec<u8>>,
    write_log: Vec<u8>,
    expected_writes: Vec<u8>,
}

#[cfg(test)]
impl ScriptedChannel {
    pub fn new(reads: Vec<Vec<u8>>, expected_writes: Vec<u8>) -> Self {
        ScriptedChannel {
            reads: reads.into(),
            write_log: Vec::new(),
            expected_writes,
        }
    }
}

#[cfg(test)]
impl Channel for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = match self.reads.front_mut() {
            Some(chunk) => chunk,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read script exhausted",
                ))
            }
        };

        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            self.reads.pop_front();
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_log.extend_from_slice(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert!(
            self.reads.is_empty(),
            "ScriptedChannel dropped with {} unconsumed read chunks",
            self.reads.len()
        );

        assert_eq!(
            &self.write_log, &self.expected_writes,
            "ScriptedChannel write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_exact_spans_chunks() {
        let mut channel = ScriptedChannel::new(vec![vec![1, 2], vec![3], vec![4, 5]], Vec::new());

        let mut buf = [0u8; 5];
        channel.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_read_exact_fails_on_exhausted_script() {
        let mut channel = ScriptedChannel::new(vec![vec![1]], Vec::new());

        let mut buf = [0u8; 4];
        let err = channel.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_write_all_is_logged() {
        let mut channel = ScriptedChannel::new(Vec::new(), vec![9, 8, 7]);
        channel.write_all(&[9, 8, 7]).unwrap();
    }
}
