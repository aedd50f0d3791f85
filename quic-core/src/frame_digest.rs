// SPDX-License-Identifier: Apache-2.0

//! A compact, self-describing record of what frames a sent packet carried.
//!
//! The loss-recovery ring buffer (`recovery::sent_packets`) stores one of
//! these per in-flight packet instead of the frames themselves. When a
//! packet's fate (acked or lost) is decided, `handleAckOrLoss` re-reads this
//! digest and dispatches to the owning state (ACK manager, CRYPTO stream,
//! connection-ID registry, ...) without retaining a trait object per frame,
//! keeping the hot loss-recovery path allocation-light.

use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

const TAG_ACK: u8 = 0;
const TAG_CRYPTO: u8 = 1;
const TAG_STREAM: u8 = 2;
const TAG_NEW_CONNECTION_ID: u8 = 3;
const TAG_RETIRE_CONNECTION_ID: u8 = 4;
const TAG_HANDSHAKE_DONE: u8 = 5;
const TAG_MAX_DATA: u8 = 6;

/// One frame's worth of loss/ack-fate bookkeeping, extracted from a sent packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRecord {
    /// This packet carried an ACK frame acknowledging up to `largest_acked`.
    Ack { largest_acked: i64 },
    /// A CRYPTO frame covering `[offset, offset + len)`.
    Crypto { offset: u64, len: u64 },
    /// A STREAM frame covering `[offset, offset + len)` on `stream_id`, optionally `fin`.
    Stream {
        stream_id: u64,
        offset: u64,
        len: u64,
        fin: bool,
    },
    /// A NEW_CONNECTION_ID frame for local sequence number `seq`.
    NewConnectionId { seq: u64 },
    /// A RETIRE_CONNECTION_ID frame retiring sequence number `seq`.
    RetireConnectionId { seq: u64 },
    /// A HANDSHAKE_DONE frame.
    HandshakeDone,
    /// A MAX_DATA frame advertising `limit`.
    MaxData { limit: u64 },
}

/// A serialized sequence of [`FrameRecord`]s, in send order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameDigest(Vec<u8>);

impl FrameDigest {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, record: FrameRecord) {
        match record {
            FrameRecord::Ack { largest_acked } => {
                self.0.push(TAG_ACK);
                push_i64(&mut self.0, largest_acked);
            }
            FrameRecord::Crypto { offset, len } => {
                self.0.push(TAG_CRYPTO);
                push_u64(&mut self.0, offset);
                push_u64(&mut self.0, len);
            }
            FrameRecord::Stream {
                stream_id,
                offset,
                len,
                fin,
            } => {
                self.0.push(TAG_STREAM);
                push_u64(&mut self.0, stream_id);
                push_u64(&mut self.0, offset);
                push_u64(&mut self.0, len);
                self.0.push(fin as u8);
            }
            FrameRecord::NewConnectionId { seq } => {
                self.0.push(TAG_NEW_CONNECTION_ID);
                push_u64(&mut self.0, seq);
            }
            FrameRecord::RetireConnectionId { seq } => {
                self.0.push(TAG_RETIRE_CONNECTION_ID);
                push_u64(&mut self.0, seq);
            }
            FrameRecord::HandshakeDone => {
                self.0.push(TAG_HANDSHAKE_DONE);
            }
            FrameRecord::MaxData { limit } => {
                self.0.push(TAG_MAX_DATA);
                push_u64(&mut self.0, limit);
            }
        }
    }

    /// Iterates the records in the order they were pushed.
    pub fn iter(&self) -> FrameDigestIter<'_> {
        FrameDigestIter { bytes: &self.0 }
    }
}

fn push_u64(buf: &mut Vec<u8>, v: u64) {
    let mut tmp = [0u8; 8];
    LittleEndian::write_u64(&mut tmp, v);
    buf.extend_from_slice(&tmp);
}

fn push_i64(buf: &mut Vec<u8>, v: i64) {
    push_u64(buf, v as u64);
}

pub struct FrameDigestIter<'a> {
    bytes: &'a [u8],
}

impl Iterator for FrameDigestIter<'_> {
    type Item = FrameRecord;

    fn next(&mut self) -> Option<FrameRecord> {
        let (tag, rest) = self.bytes.split_first()?;
        let tag = *tag;
        self.bytes = rest;
        let record = match tag {
            TAG_ACK => FrameRecord::Ack {
                largest_acked: self.take_u64() as i64,
            },
            TAG_CRYPTO => {
                let offset = self.take_u64();
                let len = self.take_u64();
                FrameRecord::Crypto { offset, len }
            }
            TAG_STREAM => {
                let stream_id = self.take_u64();
                let offset = self.take_u64();
                let len = self.take_u64();
                let fin = self.take_u8() != 0;
                FrameRecord::Stream {
                    stream_id,
                    offset,
                    len,
                    fin,
                }
            }
            TAG_NEW_CONNECTION_ID => FrameRecord::NewConnectionId {
                seq: self.take_u64(),
            },
            TAG_RETIRE_CONNECTION_ID => FrameRecord::RetireConnectionId {
                seq: self.take_u64(),
            },
            TAG_HANDSHAKE_DONE => FrameRecord::HandshakeDone,
            TAG_MAX_DATA => FrameRecord::MaxData {
                limit: self.take_u64(),
            },
            _ => unreachable!("FrameDigest is only ever built through FrameDigest::push"),
        };
        Some(record)
    }
}

impl FrameDigestIter<'_> {
    fn take_u64(&mut self) -> u64 {
        let (head, rest) = self.bytes.split_at(8);
        self.bytes = rest;
        LittleEndian::read_u64(head)
    }

    fn take_u8(&mut self) -> u8 {
        let (&b, rest) = self.bytes.split_first().expect("malformed frame digest");
        self.bytes = rest;
        b
    }
}
