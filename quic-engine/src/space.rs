// SPDX-License-Identifier: Apache-2.0

//! Binds one packet number space's ack state and CRYPTO stream together, and
//! dispatches a sent packet's [`FrameDigest`] to the right piece of state
//! once its fate (acked or lost) is decided.
//!
//! The sent-packet ring itself lives in `quic_core::recovery::LossDetector`
//! (it already needs full RTT/congestion-control visibility into every
//! space); a [`Space`] is the connection-level glue around the two pieces
//! that ring doesn't own.

use crate::crypto_stream;
use core::time::Duration;
use quic_core::{
    frame_digest::{FrameDigest, FrameRecord},
    packet_number::PacketNumberSpace,
    time::Timestamp,
};

pub use crate::ack::{AckState, PendingAck};

/// A [`FrameRecord`] this space doesn't own, returned from [`Space::apply_digest`]
/// so the connection layer can route it to the owning per-connection state
/// (the connection-ID registries, stream map, flow-control window, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unowned {
    NewConnectionId { seq: u64, lost: bool },
    RetireConnectionId { seq: u64, lost: bool },
    HandshakeDone { lost: bool },
    MaxData { limit: u64, lost: bool },
    Stream {
        stream_id: u64,
        offset: u64,
        len: u64,
        fin: bool,
        lost: bool,
    },
}

/// One packet number space's received-packet tracking and CRYPTO stream.
#[derive(Debug)]
pub struct Space {
    number_space: PacketNumberSpace,
    ack: AckState,
    crypto_tx: crypto_stream::Outbound,
    crypto_rx: crypto_stream::Inbound,
}

impl Space {
    pub fn new(number_space: PacketNumberSpace, max_ack_delay: Duration) -> Self {
        Self {
            number_space,
            ack: AckState::new(number_space, max_ack_delay),
            crypto_tx: crypto_stream::Outbound::new(),
            crypto_rx: crypto_stream::Inbound::new(),
        }
    }

    pub fn number_space(&self) -> PacketNumberSpace {
        self.number_space
    }

    pub fn ack(&self) -> &AckState {
        &self.ack
    }

    pub fn ack_mut(&mut self) -> &mut AckState {
        &mut self.ack
    }

    pub fn crypto_tx(&mut self) -> &mut crypto_stream::Outbound {
        &mut self.crypto_tx
    }

    /// Records receipt of an authenticated packet, feeding the CRYPTO
    /// frames it carried (if any) to the inbound reassembler and returning
    /// whatever contiguous CRYPTO bytes are newly readable.
    pub fn on_packet_received(
        &mut self,
        now: Timestamp,
        pnum: quic_core::packet_number::PacketNumber,
        ack_eliciting: bool,
        crypto_frames: &[(u64, &[u8])],
    ) -> Result<Vec<u8>, quic_core::connection::TransportError> {
        self.ack.receive(now, pnum, ack_eliciting);

        let mut readable = Vec::new();
        for &(offset, data) in crypto_frames {
            readable.extend(self.crypto_rx.handle_crypto(offset, data)?);
        }
        Ok(readable)
    }

    /// Replays one sent packet's digest into this space's CRYPTO stream
    /// (directly) or into the returned [`Unowned`] list (for everything
    /// else), given whether the packet was acked or lost.
    pub fn apply_digest(&mut self, digest: &FrameDigest, lost: bool) -> Vec<Unowned> {
        let mut unowned = Vec::new();
        for record in digest.iter() {
            match record {
                FrameRecord::Ack { .. } => {}
                FrameRecord::Crypto { offset, len } => {
                    if lost {
                        self.crypto_tx.on_loss(offset, len as usize);
                    } else {
                        self.crypto_tx.on_ack(offset, len as usize);
                    }
                }
                FrameRecord::Stream {
                    stream_id,
                    offset,
                    len,
                    fin,
                } => unowned.push(Unowned::Stream {
                    stream_id,
                    offset,
                    len,
                    fin,
                    lost,
                }),
                FrameRecord::NewConnectionId { seq } => {
                    unowned.push(Unowned::NewConnectionId { seq, lost })
                }
                FrameRecord::RetireConnectionId { seq } => {
                    unowned.push(Unowned::RetireConnectionId { seq, lost })
                }
                FrameRecord::HandshakeDone => unowned.push(Unowned::HandshakeDone { lost }),
                FrameRecord::MaxData { limit } => unowned.push(Unowned::MaxData { limit, lost }),
            }
        }
        unowned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quic_core::{frame_digest::FrameRecord, packet_number::PacketNumber, time::Timestamp};

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    #[test]
    fn crypto_frame_received_is_immediately_readable_if_contiguous() {
        let mut space = Space::new(PacketNumberSpace::Initial, Duration::from_millis(25));
        let out = space
            .on_packet_received(ts(0), PacketNumber::new(0), true, &[(0, &[1, 2, 3])])
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn acked_crypto_digest_marks_the_bytes_acked() {
        let mut space = Space::new(PacketNumberSpace::Initial, Duration::from_millis(25));
        space.crypto_tx().write(&[1, 2, 3, 4]);
        space
            .crypto_tx()
            .data_to_send(false, |_, bytes| bytes.len());

        let mut digest = FrameDigest::new();
        digest.push(FrameRecord::Crypto { offset: 0, len: 4 });
        space.apply_digest(&digest, false);

        assert!(!space.crypto_tx.has_data_to_send(true));
    }

    #[test]
    fn lost_crypto_digest_schedules_a_resend() {
        let mut space = Space::new(PacketNumberSpace::Initial, Duration::from_millis(25));
        space.crypto_tx().write(&[1, 2, 3, 4]);
        space
            .crypto_tx()
            .data_to_send(false, |_, bytes| bytes.len());

        let mut digest = FrameDigest::new();
        digest.push(FrameRecord::Crypto { offset: 0, len: 4 });
        space.apply_digest(&digest, true);

        assert!(space.crypto_tx.has_data_to_send(false));
    }

    #[test]
    fn unowned_frames_are_returned_for_the_connection_to_route() {
        let mut space = Space::new(PacketNumberSpace::ApplicationData, Duration::from_millis(25));
        let mut digest = FrameDigest::new();
        digest.push(FrameRecord::NewConnectionId { seq: 3 });
        digest.push(FrameRecord::HandshakeDone);

        let unowned = space.apply_digest(&digest, false);
        assert_eq!(
            unowned,
            vec![
                Unowned::NewConnectionId { seq: 3, lost: false },
                Unowned::HandshakeDone { lost: false },
            ]
        );
    }

    #[test]
    fn lost_unowned_frames_are_flagged_lost_for_the_connection_to_resend() {
        let mut space = Space::new(PacketNumberSpace::ApplicationData, Duration::from_millis(25));
        let mut digest = FrameDigest::new();
        digest.push(FrameRecord::RetireConnectionId { seq: 2 });

        let unowned = space.apply_digest(&digest, true);
        assert_eq!(unowned, vec![Unowned::RetireConnectionId { seq: 2, lost: true }]);
    }
}
