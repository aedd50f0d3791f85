// SPDX-License-Identifier: Apache-2.0

//! A per-space ring buffer of sent-packet records, keyed by packet number.

use crate::{frame_digest::FrameDigest, packet_number::PacketNumber, time::Timestamp};
use alloc::collections::VecDeque;

/// Everything the loss detector needs to remember about one sent packet
/// until its fate (acked or lost) is decided.
#[derive(Clone, Debug)]
pub struct SentPacketInfo {
    pub packet_number: PacketNumber,
    pub time_sent: Timestamp,
    pub size: u32,
    pub ack_eliciting: bool,
    pub in_flight: bool,
    pub acked: bool,
    pub lost: bool,
    pub digest: FrameDigest,
}

/// A ring of [`SentPacketInfo`] for one packet number space, plus the
/// running `max_acked` / `last_ack_eliciting` bookkeeping the loss detector
/// needs without rescanning the ring.
#[derive(Clone, Debug, Default)]
pub struct SentPacketRing {
    packets: VecDeque<SentPacketInfo>,
    max_acked: PacketNumber,
    last_ack_eliciting: PacketNumber,
}

impl SentPacketRing {
    pub fn new() -> Self {
        Self {
            packets: VecDeque::new(),
            max_acked: PacketNumber::NONE,
            last_ack_eliciting: PacketNumber::NONE,
        }
    }

    pub fn max_acked(&self) -> PacketNumber {
        self.max_acked
    }

    pub fn last_ack_eliciting(&self) -> PacketNumber {
        self.last_ack_eliciting
    }

    pub fn on_packet_sent(&mut self, info: SentPacketInfo) {
        if info.ack_eliciting {
            self.last_ack_eliciting = self.last_ack_eliciting.max(info.packet_number);
        }
        self.packets.push_back(info);
    }

    /// Iterates all unacked, unlost, in-flight packets (ascending packet number).
    pub fn iter_unacked(&self) -> impl Iterator<Item = &SentPacketInfo> {
        self.packets.iter().filter(|p| !p.acked && !p.lost)
    }

    pub fn iter_unacked_mut(&mut self) -> impl Iterator<Item = &mut SentPacketInfo> {
        self.packets.iter_mut().filter(|p| !p.acked && !p.lost)
    }

    pub fn get(&self, pn: PacketNumber) -> Option<&SentPacketInfo> {
        self.packets.iter().find(|p| p.packet_number == pn)
    }

    /// Marks `pn` acked, updates `max_acked`, and returns the packet if found
    /// and not already acked/lost.
    pub fn on_ack(&mut self, pn: PacketNumber) -> Option<&SentPacketInfo> {
        self.max_acked = self.max_acked.max(pn);
        let idx = self
            .packets
            .iter()
            .position(|p| p.packet_number == pn && !p.acked && !p.lost)?;
        self.packets[idx].acked = true;
        Some(&self.packets[idx])
    }

    pub fn mark_lost(&mut self, pn: PacketNumber) -> Option<&SentPacketInfo> {
        let idx = self
            .packets
            .iter()
            .position(|p| p.packet_number == pn && !p.acked && !p.lost)?;
        self.packets[idx].lost = true;
        Some(&self.packets[idx])
    }

    /// Drops every entry that is both acked (or lost) and no longer needed
    /// for retransmission bookkeeping, i.e. everything below the oldest
    /// still-active packet. Called periodically to bound memory.
    pub fn drain_settled_prefix(&mut self) {
        while matches!(self.packets.front(), Some(p) if p.acked || p.lost) {
            self.packets.pop_front();
        }
    }

    /// Drops the whole ring (used when the space's keys are discarded) and
    /// returns the total bytes that were still in flight, so the caller can
    /// discount them from `bytes_in_flight`.
    pub fn discard(&mut self) -> u32 {
        let in_flight_bytes = self
            .packets
            .iter()
            .filter(|p| p.in_flight && !p.acked && !p.lost)
            .map(|p| p.size)
            .sum();
        self.packets.clear();
        self.max_acked = PacketNumber::NONE;
        self.last_ack_eliciting = PacketNumber::NONE;
        in_flight_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Iterates every packet still tracked, regardless of acked/lost state.
    pub fn iter_all(&self) -> impl Iterator<Item = &SentPacketInfo> {
        self.packets.iter()
    }

    /// `true` if any ack-eliciting packet strictly between `lo` and `hi`
    /// (exclusive) was acked. Used by persistent-congestion detection to
    /// rule out a lost/lost pair that had an ack in between.
    pub fn acked_between(&self, lo: PacketNumber, hi: PacketNumber) -> bool {
        self.packets
            .iter()
            .any(|p| p.acked && p.packet_number > lo && p.packet_number < hi)
    }
}
