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

//! YMODEM sender state machine.

use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::packet;
use crate::progress::{Bar, NoProgress, Progress};
use crate::protocol::{BlockSize, ACK, CAN, CANCEL, EOT, NAK, POLL};

/// Header NAKs tolerated per session before the batch is abandoned.
const SESSION_RETRIES: u32 = 5;

/// Unacknowledged transmissions tolerated per file in the data phase.
const BLOCK_FAILURE_LIMIT: u32 = 10;

// ============================================================================
// Public Types
// ============================================================================

/// One file queued for transmission.
pub struct TransferFile {
    /// Name carried in the block-0 header. ASCII, no embedded NUL.
    pub name: String,
    /// File payload.
    pub data: Vec<u8>,
}

// ============================================================================
// States
// ============================================================================

pub struct AwaitPoll;
pub struct SendHeader;
pub struct AwaitHeaderAck;
pub struct AwaitDataPoll;
pub struct SendData;
pub struct AwaitDataAck;
pub struct SendEot;
pub struct AwaitEotAck;
pub struct AwaitFinalPoll;
pub struct SendTerminator;
pub struct AwaitFinalAck;

// ============================================================================
// FSM Structure
// ============================================================================

struct OutgoingFile {
    name: String,
    data: Vec<u8>,
    blocks: usize,
    bar: Box<dyn Bar>,
}

pub struct SenderFsm<State> {
    state: PhantomData<State>,
    channel: Box<dyn Channel>,
    block_size: BlockSize,
    files: Vec<OutgoingFile>,
    file_idx: usize,
    block: usize,
    failures: u32,
    retries: u32,
}

/// Outcome of one sender step.
pub enum SenderStep {
    Continue(Box<dyn SenderState>),
    Complete,
}

// ============================================================================
// Trait
// ============================================================================

pub trait SenderState: Send {
    fn step(self: Box<Self>) -> Result<SenderStep>;
}

// ============================================================================
// Helpers
// ============================================================================

impl<S> SenderFsm<S> {
    fn transition<T>(self) -> Box<SenderFsm<T>> {
        Box::new(SenderFsm {
            state: PhantomData,
            channel: self.channel,
            block_size: self.block_size,
            files: self.files,
            file_idx: self.file_idx,
            block: self.block,
            failures: self.failures,
            retries: self.retries,
        })
    }

    fn file(&self) -> &OutgoingFile {
        &self.files[self.file_idx]
    }

    fn read_reply(&mut self) -> std::io::Result<u8> {
        let mut buf = [0u8; 1];
        self.channel.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Fatal exit: write the cancel sequence, best effort, then surface.
    fn abort(&mut self, err: Error) -> Error {
        let _ = self.channel.write_all(&CANCEL);
        err
    }
}

// ============================================================================
// State Implementations
// ============================================================================

impl SenderState for SenderFsm<AwaitPoll> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        if reply != POLL {
            return Err(fsm.abort(Error::InvalidHandshake(reply)));
        }

        debug!(file = %fsm.file().name, "receiver polled, announcing file");
        Ok(SenderStep::Continue(fsm.transition::<SendHeader>()))
    }
}

impl SenderState for SenderFsm<SendHeader> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        // Filename, NUL, decimal size, one space; the codec pads the rest.
        let header = {
            let file = fsm.file();
            let mut header = Vec::with_capacity(file.name.len() + 16);
            header.extend_from_slice(file.name.as_bytes());
            header.push(0x00);
            header.extend_from_slice(format!("{} ", file.data.len()).as_bytes());
            header
        };

        if let Err(e) = packet::send_block(fsm.channel.as_mut(), fsm.block_size, 0, &header) {
            return Err(fsm.abort(e.into()));
        }
        Ok(SenderStep::Continue(fsm.transition::<AwaitHeaderAck>()))
    }
}

impl SenderState for SenderFsm<AwaitHeaderAck> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        match reply {
            ACK => {
                fsm.block = 1;
                fsm.failures = 0;
                Ok(SenderStep::Continue(fsm.transition::<AwaitDataPoll>()))
            }
            NAK => {
                fsm.retries -= 1;
                warn!(retries = fsm.retries, "file header NAKed");
                if fsm.retries == 0 {
                    return Err(fsm.abort(Error::RetriesExceeded));
                }
                Ok(SenderStep::Continue(fsm.transition::<SendHeader>()))
            }
            POLL => {
                // Receiver repeated its poll before seeing the header.
                Ok(SenderStep::Continue(fsm.transition::<SendHeader>()))
            }
            CAN => {
                // The peer already cancelled; nothing is echoed back.
                Err(Error::ReceiverRejected)
            }
            other => Err(fsm.abort(Error::HeaderRefused(other))),
        }
    }
}

impl SenderState for SenderFsm<AwaitDataPoll> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        if reply != POLL {
            return Err(fsm.abort(Error::InvalidHandshake(reply)));
        }
        Ok(SenderStep::Continue(fsm.transition::<SendData>()))
    }
}

impl SenderState for SenderFsm<SendData> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        if fsm.block >= fsm.file().blocks {
            return Ok(SenderStep::Continue(fsm.transition::<SendEot>()));
        }

        let bs = fsm.block_size.payload_len();
        let from = (fsm.block - 1) * bs;
        let file = &fsm.files[fsm.file_idx];
        let to = file.data.len().min(from + bs);
        let wire_block = (fsm.block % 256) as u8;

        debug!(block = fsm.block, len = to - from, "sending data block");
        if let Err(e) = packet::send_block(
            fsm.channel.as_mut(),
            fsm.block_size,
            wire_block,
            &fsm.files[fsm.file_idx].data[from..to],
        ) {
            return Err(fsm.abort(e.into()));
        }
        Ok(SenderStep::Continue(fsm.transition::<AwaitDataAck>()))
    }
}

impl SenderState for SenderFsm<AwaitDataAck> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        if reply == ACK {
            let bs = fsm.block_size.payload_len();
            let from = (fsm.block - 1) * bs;
            let file = &mut fsm.files[fsm.file_idx];
            let to = file.data.len().min(from + bs);
            file.bar.add(to - from);
            fsm.block += 1;
        } else {
            fsm.failures += 1;
            warn!(
                block = fsm.block,
                reply,
                failures = fsm.failures,
                "data block not acknowledged, resending"
            );
            if fsm.failures >= BLOCK_FAILURE_LIMIT {
                let block = fsm.block;
                return Err(fsm.abort(Error::BlockRetriesExceeded { block }));
            }
        }
        Ok(SenderStep::Continue(fsm.transition::<SendData>()))
    }
}

impl SenderState for SenderFsm<SendEot> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        if let Err(e) = fsm.channel.write_all(&[EOT]) {
            return Err(fsm.abort(e.into()));
        }
        Ok(SenderStep::Continue(fsm.transition::<AwaitEotAck>()))
    }
}

impl SenderState for SenderFsm<AwaitEotAck> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        if reply != ACK {
            return Err(fsm.abort(Error::EotStage1(reply)));
        }

        fsm.file_idx += 1;
        if fsm.file_idx < fsm.files.len() {
            debug!(remaining = fsm.files.len() - fsm.file_idx, "file complete");
            Ok(SenderStep::Continue(fsm.transition::<AwaitPoll>()))
        } else {
            Ok(SenderStep::Continue(fsm.transition::<AwaitFinalPoll>()))
        }
    }
}

impl SenderState for SenderFsm<AwaitFinalPoll> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        if reply != POLL {
            return Err(fsm.abort(Error::EotStage3(reply)));
        }
        Ok(SenderStep::Continue(fsm.transition::<SendTerminator>()))
    }
}

impl SenderState for SenderFsm<SendTerminator> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        // Block 0 with an all-zero payload closes the batch.
        if let Err(e) = packet::send_block(fsm.channel.as_mut(), fsm.block_size, 0, &[]) {
            return Err(fsm.abort(e.into()));
        }
        Ok(SenderStep::Continue(fsm.transition::<AwaitFinalAck>()))
    }
}

impl SenderState for SenderFsm<AwaitFinalAck> {
    fn step(self: Box<Self>) -> Result<SenderStep> {
        let mut fsm = *self;

        let reply = match fsm.read_reply() {
            Ok(b) => b,
            Err(e) => return Err(fsm.abort(e.into())),
        };
        if reply != ACK {
            return Err(fsm.abort(Error::EotStage4(reply)));
        }

        debug!("batch complete");
        Ok(SenderStep::Complete)
    }
}

// ============================================================================
// Constructor & Driver
// ============================================================================

impl SenderFsm<AwaitPoll> {
    pub fn new(
        channel: Box<dyn Channel>,
        progress: &mut dyn Progress,
        block_size: BlockSize,
        files: Vec<TransferFile>,
    ) -> Result<Box<dyn SenderState>> {
        let bs = block_size.payload_len();

        let mut outgoing = Vec::with_capacity(files.len());
        for file in files {
            if !file.name.is_ascii() || file.name.contains('\0') || header_len(&file) > bs {
                return Err(Error::InvalidFileName(file.name));
            }

            let blocks = file.data.len() / bs + usize::from(file.data.len() % bs != 0) + 1;
            let bar = progress.create(&file.name, file.data.len());
            outgoing.push(OutgoingFile {
                name: file.name,
                data: file.data,
                blocks,
                bar,
            });
        }

        let fsm = SenderFsm {
            state: PhantomData::<AwaitPoll>,
            channel,
            block_size,
            files: outgoing,
            file_idx: 0,
            block: 1,
            failures: 0,
            retries: SESSION_RETRIES,
        };

        // An empty batch skips straight to the terminator exchange.
        if fsm.files.is_empty() {
            return Ok(fsm.transition::<AwaitFinalPoll>());
        }
        Ok(Box::new(fsm))
    }
}

fn header_len(file: &TransferFile) -> usize {
    // name, NUL, decimal size, trailing space
    file.name.len() + 1 + file.data.len().to_string().len() + 1
}

/// Send `files` over `channel` as one YMODEM batch.
///
/// A no-op sink is substituted when `progress` is `None`. Every fatal error
/// except a peer cancel writes the cancel sequence before returning.
pub fn send(
    channel: Box<dyn Channel>,
    progress: Option<&mut dyn Progress>,
    block_size: BlockSize,
    files: Vec<TransferFile>,
) -> Result<()> {
    let mut noop = NoProgress;
    let progress = progress.unwrap_or(&mut noop);

    let mut state = SenderFsm::new(channel, progress, block_size, files)?;
    loop {
        match state.step()? {
            SenderStep::Continue(next) => state = next,
            SenderStep::Complete => return Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
