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

//! YMODEM wire symbols

/// Start of header - begins a 128-byte data block
pub const SOH: u8 = 0x01;

/// Start of text - begins a 1024-byte data block
pub const STX: u8 = 0x02;

/// End of transmission - sender has no more blocks for the current file
pub const EOT: u8 = 0x04;

/// Acknowledge - receiver accepts the last block
pub const ACK: u8 = 0x06;

/// Negative acknowledge - receiver rejects the last block, retransmit
pub const NAK: u8 = 0x15;

/// Cancel - either side aborts the session
pub const CAN: u8 = 0x18;

/// Poll - receiver requests CRC-mode transmission and paces the handshake
pub const POLL: u8 = b'C';

/// Cancel sequence written on a fatal sender error
pub const CANCEL: [u8; 2] = [CAN, CAN];

/// Transfer block size, fixed for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSize {
    /// 128-byte payloads framed with SOH
    Standard,
    /// 1024-byte payloads framed with STX
    Extended,
}

impl BlockSize {
    /// Payload bytes carried by one block of this size.
    pub fn payload_len(self) -> usize {
        match self {
            BlockSize::Standard => 128,
            BlockSize::Extended => 1024,
        }
    }

    /// Header byte framing a block of this size.
    pub fn header(self) -> u8 {
        match self {
            BlockSize::Standard => SOH,
            BlockSize::Extended => STX,
        }
    }
}
