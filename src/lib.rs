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

//! YMODEM batch file transfer over a byte-oriented serial channel.
//!
//! The engine frames 128- or 1024-byte blocks with one's-complement block
//! numbers and CRC-16 integrity, drives the poll-paced handshake with
//! per-block acknowledgement and retry, and closes a batch with the
//! two-phase EOT and the zero-length terminator block. It only ever sees a
//! [`Channel`] and a [`Progress`] sink; serial line setup, the command line
//! and file I/O live in the binary.

pub mod channel;
pub mod crc;
pub mod error;
pub mod packet;
pub mod progress;
pub mod protocol;
pub mod receiver;
pub mod sender;

pub use channel::{Channel, SerialChannel};
pub use error::{Error, Result};
pub use progress::{Bar, NoProgress, Progress, TermProgress};
pub use protocol::BlockSize;
pub use receiver::{receive, ReceivedFile};
pub use sender::{send, TransferFile};
