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

//! Packet codec: framing, validation and acknowledgement of single blocks.

use std::io;

use tracing::{debug, trace};

use crate::channel::Channel;
use crate::crc::crc16;
use crate::error::{Error, Result};
use crate::protocol::{BlockSize, ACK, EOT, NAK, SOH, STX};

/// One framed unit read off the wire.
#[derive(Debug, PartialEq, Eq)]
pub enum Packet {
    /// EOT in place of a header byte: the sender has no more blocks.
    Eot,
    /// A validated and acknowledged data block.
    Data { block: u8, payload: Vec<u8> },
}

/// Frame `payload` as block number `block`.
///
/// Layout: header byte, block number, one's complement, payload zero-padded
/// to the block size, CRC high then low. The CRC covers the padded payload
/// bytes only, never the header trio.
pub fn encode(block_size: BlockSize, block: u8, payload: &[u8]) -> Vec<u8> {
    let bs = block_size.payload_len();
    debug_assert!(payload.len() <= bs);

    let mut frame = Vec::with_capacity(bs + 5);
    frame.push(block_size.header());
    frame.push(block);
    frame.push(255 - block);
    frame.extend_from_slice(payload);
    frame.resize(3 + bs, 0x00);

    let crc = crc16(&frame[3..]);
    frame.push((crc >> 8) as u8);
    frame.push((crc & 0xff) as u8);
    frame
}

/// Encode one block and drain it through the channel.
pub fn send_block(
    channel: &mut dyn Channel,
    block_size: BlockSize,
    block: u8,
    payload: &[u8],
) -> io::Result<()> {
    trace!(block, len = payload.len(), "writing block");
    channel.write_all(&encode(block_size, block, payload))
}

/// Read and validate one packet.
///
/// The payload length follows the framing byte (SOH reads 128 bytes, STX
/// reads 1024), possibly across several channel reads. A block-number or
/// CRC fault is answered with NAK and surfaced as [`Error::InvalidPacket`]
/// so the caller can keep reading from the same channel; an accepted
/// payload is answered with ACK.
pub fn read_packet(channel: &mut dyn Channel) -> Result<Packet> {
    let header = read_byte(channel)?;
    if header == EOT {
        trace!("end of transmission");
        return Ok(Packet::Eot);
    }

    let len = match header {
        SOH => 128,
        STX => 1024,
        other => return Err(Error::InvalidHeader(other)),
    };

    let block = read_byte(channel)?;
    let complement = read_byte(channel)?;
    if block > complement || block as u16 + complement as u16 != 255 {
        debug!(block, complement, "block number mismatch, NAK");
        channel.write_all(&[NAK])?;
        return Err(Error::InvalidPacket);
    }

    let mut payload = vec![0u8; len];
    channel.read_exact(&mut payload)?;

    let mut crc_buf = [0u8; 2];
    channel.read_exact(&mut crc_buf)?;
    let wire_crc = (crc_buf[0] as u16) << 8 | crc_buf[1] as u16;

    if crc16(&payload) != wire_crc {
        debug!(block, wire_crc, "crc mismatch, NAK");
        channel.write_all(&[NAK])?;
        return Err(Error::InvalidPacket);
    }

    channel.write_all(&[ACK])?;
    trace!(block, len, "block accepted");
    Ok(Packet::Data { block, payload })
}

fn read_byte(channel: &mut dyn Channel) -> Result<u8> {
    let mut buf = [0u8; 1];
    channel.read_exact(&mut buf)?;
    Ok(buf[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ScriptedChannel;

    #[test]
    fn test_encode_standard_frame_layout() {
        let frame = encode(BlockSize::Standard, 7, b"abc");

        assert_eq!(frame.len(), 3 + 128 + 2);
        assert_eq!(frame[0], SOH);
        assert_eq!(frame[1], 7);
        assert_eq!(frame[2], 248);
        assert_eq!(&frame[3..6], b"abc");
        assert!(frame[6..131].iter().all(|&b| b == 0));

        let crc = crc16(&frame[3..131]);
        assert_eq!(frame[131], (crc >> 8) as u8);
        assert_eq!(frame[132], (crc & 0xff) as u8);
    }

    #[test]
    fn test_encode_extended_frame_layout() {
        let frame = encode(BlockSize::Extended, 1, &[0xAA; 1024]);

        assert_eq!(frame.len(), 3 + 1024 + 2);
        assert_eq!(frame[0], STX);
        assert_eq!(frame[1], 1);
        assert_eq!(frame[2], 254);

        let crc = crc16(&[0xAA; 1024]);
        assert_eq!(frame[1027], (crc >> 8) as u8);
        assert_eq!(frame[1028], (crc & 0xff) as u8);
    }

    #[test]
    fn test_encode_complement_over_all_block_numbers() {
        for block in 0..=255u8 {
            let frame = encode(BlockSize::Standard, block, &[]);
            assert_eq!(frame[1].wrapping_add(frame[2]), 255);
        }
    }

    #[test]
    fn test_encode_header_block_for_file_metadata() {
        // Block 0 of "a.txt" with 3 payload bytes, as it appears on the wire.
        let frame = encode(BlockSize::Standard, 0, b"a.txt\x003 ");

        assert_eq!(frame[0], SOH);
        assert_eq!(frame[1], 0x00);
        assert_eq!(frame[2], 0xFF);
        assert_eq!(&frame[3..11], b"a.txt\x003 ");
        assert!(frame[11..131].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_round_trips_encode() {
        let frame = encode(BlockSize::Standard, 3, b"hello");
        let mut channel = ScriptedChannel::new(vec![frame], vec![ACK]);

        match read_packet(&mut channel).unwrap() {
            Packet::Data { block, payload } => {
                assert_eq!(block, 3);
                assert_eq!(payload.len(), 128);
                assert_eq!(&payload[..5], b"hello");
                assert!(payload[5..].iter().all(|&b| b == 0));
            }
            Packet::Eot => panic!("expected a data packet"),
        }
    }

    #[test]
    fn test_decode_reassembles_single_byte_reads() {
        let frame = encode(BlockSize::Standard, 9, b"chunked");
        let reads = frame.iter().map(|&b| vec![b]).collect();
        let mut channel = ScriptedChannel::new(reads, vec![ACK]);

        match read_packet(&mut channel).unwrap() {
            Packet::Data { block, payload } => {
                assert_eq!(block, 9);
                assert_eq!(&payload[..7], b"chunked");
            }
            Packet::Eot => panic!("expected a data packet"),
        }
    }

    #[test]
    fn test_decode_eot_sentinel() {
        let mut channel = ScriptedChannel::new(vec![vec![EOT]], Vec::new());
        assert_eq!(read_packet(&mut channel).unwrap(), Packet::Eot);
    }

    #[test]
    fn test_decode_naks_complement_mismatch() {
        let mut channel = ScriptedChannel::new(vec![vec![SOH, 1, 0xFD]], vec![NAK]);
        assert!(matches!(
            read_packet(&mut channel),
            Err(Error::InvalidPacket)
        ));
    }

    #[test]
    fn test_decode_naks_inverted_block_pair() {
        // A block number above its complement fails the ordering test even
        // though the bytes sum to 255.
        let mut channel = ScriptedChannel::new(vec![vec![SOH, 200, 55]], vec![NAK]);
        assert!(matches!(
            read_packet(&mut channel),
            Err(Error::InvalidPacket)
        ));
    }

    #[test]
    fn test_decode_naks_crc_mismatch() {
        let mut frame = encode(BlockSize::Standard, 2, b"corrupt me");
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;

        let mut channel = ScriptedChannel::new(vec![frame], vec![NAK]);
        assert!(matches!(
            read_packet(&mut channel),
            Err(Error::InvalidPacket)
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_header() {
        let mut channel = ScriptedChannel::new(vec![vec![0x2A]], Vec::new());
        assert!(matches!(
            read_packet(&mut channel),
            Err(Error::InvalidHeader(0x2A))
        ));
    }

    #[test]
    fn test_decode_surfaces_truncated_stream() {
        let frame = encode(BlockSize::Standard, 4, b"short");
        let mut channel = ScriptedChannel::new(vec![frame[..50].to_vec()], Vec::new());

        assert!(matches!(read_packet(&mut channel), Err(Error::Io(_))));
    }
}
