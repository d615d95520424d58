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

//! YMODEM receiver state machine.

use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::packet::{self, Packet};
use crate::protocol::{ACK, EOT, NAK, POLL};

// ============================================================================
// Public Types
// ============================================================================

/// A file delivered by [`receive`].
#[derive(Debug, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name announced in the block-0 header.
    pub name: String,
    /// Exactly the number of payload bytes the header promised.
    pub data: Vec<u8>,
}

// ============================================================================
// States
// ============================================================================

pub struct SendPoll;
pub struct ReadHeader;
pub struct BeginData;
pub struct ReadData;
pub struct EotReply;
pub struct AwaitEotRepeat;
pub struct RequestNext;
pub struct ReadTerminator;

// ============================================================================
// FSM Structure
// ============================================================================

pub struct ReceiverFsm<State> {
    state: PhantomData<State>,
    channel: Box<dyn Channel>,
    filename: String,
    filesize: usize,
    data: Vec<u8>,
}

/// Outcome of one receiver step.
pub enum ReceiverStep {
    Continue(Box<dyn ReceiverState>),
    Done(ReceivedFile),
}

// ============================================================================
// Trait
// ============================================================================

pub trait ReceiverState: Send {
    fn step(self: Box<Self>) -> Result<ReceiverStep>;
}

// ============================================================================
// Helpers
// ============================================================================

impl<S> ReceiverFsm<S> {
    fn transition<T>(self) -> Box<ReceiverFsm<T>> {
        Box::new(ReceiverFsm {
            state: PhantomData,
            channel: self.channel,
            filename: self.filename,
            filesize: self.filesize,
            data: self.data,
        })
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl ReceiverState for ReceiverFsm<SendPoll> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        fsm.channel.write_all(&[POLL])?;
        debug!("polling for file header");
        Ok(ReceiverStep::Continue(fsm.transition::<ReadHeader>()))
    }
}

impl ReceiverState for ReceiverFsm<ReadHeader> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        let payload = match packet::read_packet(fsm.channel.as_mut())? {
            Packet::Data { payload, .. } => payload,
            Packet::Eot => return Err(Error::UnexpectedEot),
        };

        let (name, size) = parse_header(&payload)?;
        debug!(file = %name, size, "incoming file");
        fsm.filename = name;
        fsm.filesize = size;
        fsm.data = Vec::with_capacity(size);
        Ok(ReceiverStep::Continue(fsm.transition::<BeginData>()))
    }
}

impl ReceiverState for ReceiverFsm<BeginData> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        fsm.channel.write_all(&[POLL])?;
        Ok(ReceiverStep::Continue(fsm.transition::<ReadData>()))
    }
}

impl ReceiverState for ReceiverFsm<ReadData> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        match packet::read_packet(fsm.channel.as_mut()) {
            Ok(Packet::Data { payload, .. }) => {
                fsm.data.extend_from_slice(&payload);
                Ok(ReceiverStep::Continue(fsm.transition::<ReadData>()))
            }
            Ok(Packet::Eot) => Ok(ReceiverStep::Continue(fsm.transition::<EotReply>())),
            Err(Error::InvalidPacket) => {
                // Already NAKed by the codec; the sender retransmits.
                warn!("dropped invalid packet");
                Ok(ReceiverStep::Continue(fsm.transition::<ReadData>()))
            }
            Err(e) => Err(e),
        }
    }
}

impl ReceiverState for ReceiverFsm<EotReply> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        // The first EOT is answered with NAK; the sender must repeat it.
        fsm.channel.write_all(&[NAK])?;
        Ok(ReceiverStep::Continue(fsm.transition::<AwaitEotRepeat>()))
    }
}

impl ReceiverState for ReceiverFsm<AwaitEotRepeat> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        let mut buf = [0u8; 1];
        fsm.channel.read_exact(&mut buf)?;
        if buf[0] != EOT {
            return Err(Error::EotStage2(buf[0]));
        }

        fsm.channel.write_all(&[ACK])?;
        Ok(ReceiverStep::Continue(fsm.transition::<RequestNext>()))
    }
}

impl ReceiverState for ReceiverFsm<RequestNext> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        // Batch continuation poll; the next packet is the terminator.
        fsm.channel.write_all(&[POLL])?;
        Ok(ReceiverStep::Continue(fsm.transition::<ReadTerminator>()))
    }
}

impl ReceiverState for ReceiverFsm<ReadTerminator> {
    fn step(self: Box<Self>) -> Result<ReceiverStep> {
        let mut fsm = *self;

        // Either the zero block or a bare EOT closes the batch; the packet
        // content is ignored.
        packet::read_packet(fsm.channel.as_mut())?;

        if fsm.data.len() < fsm.filesize {
            return Err(Error::IncompleteTransfer {
                expected: fsm.filesize,
                received: fsm.data.len(),
            });
        }
        fsm.data.truncate(fsm.filesize);

        debug!(file = %fsm.filename, bytes = fsm.filesize, "file received");
        Ok(ReceiverStep::Done(ReceivedFile {
            name: fsm.filename,
            data: fsm.data,
        }))
    }
}

// ============================================================================
// Constructor & Driver
// ============================================================================

impl ReceiverFsm<SendPoll> {
    pub fn new(channel: Box<dyn Channel>) -> Box<dyn ReceiverState> {
        Box::new(ReceiverFsm {
            state: PhantomData::<SendPoll>,
            channel,
            filename: String::new(),
            filesize: 0,
            data: Vec::new(),
        })
    }
}

/// Receive one file from a YMODEM sender on `channel`.
pub fn receive(channel: Box<dyn Channel>) -> Result<ReceivedFile> {
    let mut state = ReceiverFsm::new(channel);
    loop {
        match state.step()? {
            ReceiverStep::Continue(next) => state = next,
            ReceiverStep::Done(file) => return Ok(file),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Split a block-0 payload into the filename before the first NUL and the
/// decimal size that follows it, terminated by whitespace or padding.
fn parse_header(payload: &[u8]) -> Result<(String, usize)> {
    let nul = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::MalformedHeader)?;

    let name = std::str::from_utf8(&payload[..nul])
        .map_err(|_| Error::MalformedHeader)?
        .to_string();
    if name.is_empty() {
        return Err(Error::MalformedHeader);
    }

    let digits = payload[nul + 1..]
        .split(|&b| b == b' ' || b == 0)
        .next()
        .ok_or(Error::MalformedHeader)?;
    let size = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(Error::MalformedHeader)?;

    Ok((name, size))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ScriptedChannel;
    use crate::protocol::{BlockSize, SOH};

    fn header_block(bs: BlockSize, name: &str, size: usize) -> Vec<u8> {
        let mut payload = name.as_bytes().to_vec();
        payload.push(0);
        payload.extend_from_slice(format!("{} ", size).as_bytes());
        packet::encode(bs, 0, &payload)
    }

    fn terminator_block(bs: BlockSize) -> Vec<u8> {
        packet::encode(bs, 0, &[])
    }

    #[test]
    fn test_receives_single_file() {
        let reads = vec![
            header_block(BlockSize::Standard, "h.bin", 5),
            packet::encode(BlockSize::Standard, 1, b"hello"),
            vec![EOT],
            vec![EOT],
            terminator_block(BlockSize::Standard),
        ];
        let expected = vec![POLL, ACK, POLL, ACK, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.name, "h.bin");
        assert_eq!(file.data, b"hello");
    }

    #[test]
    fn test_receives_empty_file() {
        let reads = vec![
            header_block(BlockSize::Standard, "e.bin", 0),
            vec![EOT],
            vec![EOT],
            terminator_block(BlockSize::Standard),
        ];
        let expected = vec![POLL, ACK, POLL, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.name, "e.bin");
        assert!(file.data.is_empty());
    }

    #[test]
    fn test_corrupt_packet_is_naked_and_dropped() {
        let reads = vec![
            header_block(BlockSize::Standard, "c.bin", 4),
            vec![SOH, 1, 0xFD], // complement mismatch, rejected up front
            packet::encode(BlockSize::Standard, 1, b"good"),
            vec![EOT],
            vec![EOT],
            terminator_block(BlockSize::Standard),
        ];
        let expected = vec![POLL, ACK, POLL, NAK, ACK, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.data, b"good");
    }

    #[test]
    fn test_crc_corruption_forces_retransmission() {
        let mut corrupted = packet::encode(BlockSize::Standard, 1, b"data");
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;

        let reads = vec![
            header_block(BlockSize::Standard, "d.bin", 4),
            corrupted,
            packet::encode(BlockSize::Standard, 1, b"data"),
            vec![EOT],
            vec![EOT],
            terminator_block(BlockSize::Standard),
        ];
        let expected = vec![POLL, ACK, POLL, NAK, ACK, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.data, b"data");
    }

    #[test]
    fn test_receives_extended_blocks() {
        let mut data = vec![0u8; 1200];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }

        let reads = vec![
            header_block(BlockSize::Extended, "big.bin", 1200),
            packet::encode(BlockSize::Extended, 1, &data[..1024]),
            packet::encode(BlockSize::Extended, 2, &data[1024..]),
            vec![EOT],
            vec![EOT],
            terminator_block(BlockSize::Extended),
        ];
        let expected = vec![POLL, ACK, POLL, ACK, ACK, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.name, "big.bin");
        assert_eq!(file.data, data);
    }

    #[test]
    fn test_reassembles_chunked_delivery() {
        let mut wire = header_block(BlockSize::Standard, "h.bin", 5);
        wire.extend_from_slice(&packet::encode(BlockSize::Standard, 1, b"hello"));
        wire.push(EOT);
        wire.push(EOT);
        wire.extend_from_slice(&terminator_block(BlockSize::Standard));

        // Deliver the whole session three bytes at a time.
        let reads = wire.chunks(3).map(|c| c.to_vec()).collect();
        let expected = vec![POLL, ACK, POLL, ACK, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.data, b"hello");
    }

    #[test]
    fn test_rejects_malformed_header() {
        // No NUL in the name region: the first zero byte is the padding, so
        // the name is unparseable garbage.
        let reads = vec![packet::encode(BlockSize::Standard, 0, &[0xFF; 10])];
        let expected = vec![POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let err = receive(channel).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader));
    }

    #[test]
    fn test_rejects_short_transfer() {
        let reads = vec![
            header_block(BlockSize::Standard, "s.bin", 500),
            packet::encode(BlockSize::Standard, 1, b"only this"),
            vec![EOT],
            vec![EOT],
            terminator_block(BlockSize::Standard),
        ];
        let expected = vec![POLL, ACK, POLL, ACK, NAK, ACK, POLL, ACK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let err = receive(channel).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompleteTransfer {
                expected: 500,
                received: 128
            }
        ));
    }

    #[test]
    fn test_tolerates_eot_in_place_of_terminator() {
        let reads = vec![
            header_block(BlockSize::Standard, "t.bin", 2),
            packet::encode(BlockSize::Standard, 1, b"hi"),
            vec![EOT],
            vec![EOT],
            vec![EOT], // bare EOT instead of the zero block
        ];
        let expected = vec![POLL, ACK, POLL, ACK, NAK, ACK, POLL];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let file = receive(channel).expect("transfer should succeed");

        assert_eq!(file.name, "t.bin");
        assert_eq!(file.data, b"hi");
    }

    #[test]
    fn test_rejects_eot_in_place_of_header() {
        let reads = vec![vec![EOT]];
        let expected = vec![POLL];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let err = receive(channel).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEot));
    }

    #[test]
    fn test_eot_retransmission_is_required() {
        let reads = vec![
            header_block(BlockSize::Standard, "x.bin", 0),
            vec![EOT],
            vec![0x2A], // anything but the repeated EOT
        ];
        let expected = vec![POLL, ACK, POLL, NAK];

        let channel = Box::new(ScriptedChannel::new(reads, expected));
        let err = receive(channel).unwrap_err();
        assert!(matches!(err, Error::EotStage2(0x2A)));
    }

    #[test]
    fn test_parse_header() {
        let mut payload = b"firmware.bin\x0012345 ".to_vec();
        payload.resize(128, 0);
        assert_eq!(
            parse_header(&payload).unwrap(),
            ("firmware.bin".to_string(), 12345)
        );

        // Size terminated by padding instead of a space still parses.
        let mut payload = b"a\x007".to_vec();
        payload.resize(128, 0);
        assert_eq!(parse_header(&payload).unwrap(), ("a".to_string(), 7));

        // Empty name region is the batch terminator, not a file.
        assert!(parse_header(&[0u8; 128]).is_err());

        // Missing size.
        let mut payload = b"name\x00".to_vec();
        payload.resize(128, 0);
        assert!(parse_header(&payload).is_err());
    }
}
