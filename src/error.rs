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

//! Error taxonomy of the protocol engine.

use thiserror::Error;

/// Faults surfaced by the sender, the receiver and the packet codec.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying channel read or write failure.
    #[error("channel i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Block-number/complement mismatch or CRC failure. The decoder has
    /// already written NAK and the next packet may be read from the same
    /// channel.
    #[error("invalid packet")]
    InvalidPacket,

    /// A packet started with something other than SOH, STX or EOT.
    #[error("invalid packet header {0:#04x}")]
    InvalidHeader(u8),

    /// A handshake byte was not the receiver's poll.
    #[error("invalid handshake symbol {0:#04x}")]
    InvalidHandshake(u8),

    /// The session-wide header retry budget ran out.
    #[error("amount of retries exceeded")]
    RetriesExceeded,

    /// A data block was refused too many times.
    #[error("block {block} retransmit limit reached")]
    BlockRetriesExceeded { block: usize },

    /// The receiver cancelled the batch.
    #[error("receiver rejected to create file")]
    ReceiverRejected,

    /// Unclassifiable reply to the block-0 header.
    #[error("failed to send initial block: unexpected reply {0:#04x}")]
    HeaderRefused(u8),

    /// Missing ACK for the end-of-file EOT.
    #[error("eot stage 1: expected ACK, received {0:#04x}")]
    EotStage1(u8),

    /// The retransmitted EOT never arrived.
    #[error("eot stage 2: expected EOT, received {0:#04x}")]
    EotStage2(u8),

    /// Missing poll before the batch terminator.
    #[error("eot stage 3: failed to send end block, received {0:#04x}")]
    EotStage3(u8),

    /// Missing ACK for the batch terminator.
    #[error("stage 4: failed to send end block, received {0:#04x}")]
    EotStage4(u8),

    /// Block 0 did not carry a parseable filename and size.
    #[error("malformed file header block")]
    MalformedHeader,

    /// EOT arrived where a data or header packet was required.
    #[error("unexpected end of transmission")]
    UnexpectedEot,

    /// Filename not expressible in a block-0 header.
    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    /// The data phase delivered fewer bytes than the header promised.
    #[error("incomplete transfer: header promised {expected} bytes, received {received}")]
    IncompleteTransfer { expected: usize, received: usize },
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;
