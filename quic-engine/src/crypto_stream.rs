// SPDX-License-Identifier: Apache-2.0

//! Per-space CRYPTO frame reassembly and retransmission, RFC 9000 §7.

use crate::buffer::Pipe;
use quic_core::{connection::TransportError, interval_set::IntervalSet};

/// How far ahead of the contiguous-consumed boundary an endpoint will buffer
/// out-of-order CRYPTO data before giving up on the peer.
pub const CRYPTO_BUFFER_LIMIT: u64 = 1 << 20;

/// The inbound half of a space's CRYPTO stream: reassembles out-of-order
/// `CRYPTO` frames and hands the contiguous prefix to the TLS engine as it
/// becomes available.
#[derive(Debug, Default)]
pub struct Inbound {
    pipe: Pipe,
}

impl Inbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `data` at `offset` and returns whatever contiguous prefix is
    /// now available to hand to the TLS engine (possibly empty, if `offset`
    /// left a gap).
    pub fn handle_crypto(&mut self, offset: u64, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let boundary = self.pipe.consumed_offset();
        offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= boundary + CRYPTO_BUFFER_LIMIT)
            .ok_or(TransportError::CRYPTO_BUFFER_EXCEEDED)?;

        self.pipe
            .write_at(offset, data)
            .expect("the CRYPTO stream never sets a final size");

        let len = self.pipe.readable_len();
        let mut out = vec![0u8; len];
        self.pipe.pop(len, &mut out);
        Ok(out)
    }
}

/// The outbound half of a space's CRYPTO stream: buffers bytes written by
/// the local TLS engine, tracks what has been sent/acked, and replays lost
/// or (on PTO) unacknowledged ranges.
#[derive(Debug, Default)]
pub struct Outbound {
    pipe: Pipe,
    unsent: IntervalSet,
    acked: IntervalSet,
    total_written: u64,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` to the end of the stream, marking it unsent.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let offset = self.total_written;
        self.pipe
            .write_at(offset, data)
            .expect("outbound writes are always contiguous and never set a final size");
        self.unsent.add(offset as i64, offset as i64 + data.len() as i64);
        self.total_written += data.len() as u64;
    }

    /// `true` if there is anything worth sending: unsent bytes, or (under
    /// `pto`) previously-sent bytes that are neither acked nor re-armed by
    /// [`Outbound::on_loss`].
    pub fn has_data_to_send(&self, pto: bool) -> bool {
        !self.unsent.is_empty() || (pto && !self.in_flight().is_empty())
    }

    /// Calls `f(offset, bytes)` once per contiguous range awaiting
    /// transmission. `f` returns how many of the offered bytes it actually
    /// sent (it may send fewer than offered, e.g. to fit a packet).
    /// Under `pto`, ranges that were already sent but are neither acked nor
    /// known lost are replayed too.
    pub fn data_to_send(&mut self, pto: bool, mut f: impl FnMut(u64, &[u8]) -> usize) {
        let mut candidates = self.unsent.clone();
        if pto {
            for r in self.in_flight().iter() {
                candidates.add(r.start, r.end);
            }
        }

        for r in candidates.iter().cloned().collect::<Vec<_>>() {
            let mut offset = r.start as u64;
            let end = r.end as u64;

            while offset < end {
                let want = (end - offset) as usize;
                let mut buf = vec![0u8; want];
                let got = self.pipe.copy_at(offset, want, &mut buf);
                if got == 0 {
                    break;
                }

                let used = f(offset, &buf[..got]).min(got);
                if used == 0 {
                    break;
                }

                self.unsent.sub(offset as i64, offset as i64 + used as i64);
                offset += used as u64;
            }
        }
    }

    /// Marks `[offset, offset+len)` as acknowledged, discarding the
    /// contiguous acked prefix from the backing buffer.
    pub fn on_ack(&mut self, offset: u64, len: usize) {
        let end = offset + len as u64;
        self.acked.add(offset as i64, end as i64);
        self.unsent.sub(offset as i64, end as i64);

        let consumed = self.pipe.consumed_offset();
        if let Some(r) = self.acked.range_containing(consumed as i64) {
            let discard = r.end as u64 - consumed;
            if discard > 0 {
                self.pipe.consume(discard as usize);
            }
        }
    }

    /// Marks `[offset, offset+len)` as lost: whatever wasn't already acked
    /// becomes unsent again so [`Outbound::data_to_send`] resends it.
    pub fn on_loss(&mut self, offset: u64, len: usize) {
        let end = offset + len as u64;
        let mut lost = IntervalSet::new();
        lost.add(offset as i64, end as i64);
        for r in self.acked.iter() {
            lost.sub(r.start, r.end);
        }
        for r in lost.iter() {
            self.unsent.add(r.start, r.end);
        }
    }

    /// Bytes sent at least once but neither acked nor currently unsent.
    fn in_flight(&self) -> IntervalSet {
        let mut rest = IntervalSet::new();
        rest.add(0, self.total_written as i64);
        for r in self.unsent.iter() {
            rest.sub(r.start, r.end);
        }
        for r in self.acked.iter() {
            rest.sub(r.start, r.end);
        }
        rest
    }
}
