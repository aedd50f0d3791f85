// SPDX-License-Identifier: Apache-2.0

//! Per-number-space received-packet tracking and ACK scheduling, RFC 9000
//! §13.2.

use core::time::Duration;
use quic_core::{
    interval_set::IntervalSet,
    packet_number::{PacketNumber, PacketNumberSpace},
    time::Timestamp,
};

/// The number of stored packet-number ranges an endpoint is willing to
/// retain before dropping the oldest; RFC 9000 places no hard limit but
/// recommends bounding it.
const MAX_ACK_RANGES: usize = 8;

/// The set of packet-number ranges to report in an outgoing ACK frame, and
/// the delay to report alongside them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAck {
    pub ranges: IntervalSet,
    pub ack_delay: Duration,
}

/// Tracks received packet numbers for one [`PacketNumberSpace`] and decides
/// when an ACK must be sent.
#[derive(Debug)]
pub struct AckState {
    space: PacketNumberSpace,
    max_ack_delay: Duration,
    seen: IntervalSet,
    max_recv_time: Option<Timestamp>,
    unacked_ack_eliciting: u32,
    max_ack_eliciting: PacketNumber,
    next_ack: Option<Timestamp>,
}

impl AckState {
    pub fn new(space: PacketNumberSpace, max_ack_delay: Duration) -> Self {
        Self {
            space,
            max_ack_delay,
            seen: IntervalSet::new(),
            max_recv_time: None,
            unacked_ack_eliciting: 0,
            max_ack_eliciting: PacketNumber::NONE,
            next_ack: None,
        }
    }

    /// Records receipt of `pnum` at `now`, updating the immediate-ack
    /// schedule per RFC 9000 §13.2.1.
    pub fn receive(&mut self, now: Timestamp, pnum: PacketNumber, ack_eliciting: bool) {
        let n = pnum.as_i64();
        self.seen.add(n, n + 1);

        if self.seen.max() == Some(n) {
            self.max_recv_time = Some(now);
        }

        if ack_eliciting {
            self.unacked_ack_eliciting += 1;

            let gap_before_this = self
                .seen
                .range_containing(self.max_ack_eliciting.as_i64())
                .map(|r| r.end != n + 1)
                .unwrap_or(true);

            let must_ack_immediately = !self.space.is_application_data()
                || pnum < self.max_ack_eliciting
                || gap_before_this
                || self.unacked_ack_eliciting >= 2;

            if pnum > self.max_ack_eliciting {
                self.max_ack_eliciting = pnum;
            }

            if must_ack_immediately {
                self.next_ack = Some(now);
            } else if self.next_ack.is_none() {
                let delay = self
                    .max_ack_delay
                    .checked_sub(quic_core::recovery::K_GRANULARITY)
                    .unwrap_or(Duration::ZERO);
                self.next_ack = now.checked_add(delay);
            }
        }

        self.seen.trim_oldest_to(MAX_ACK_RANGES);
    }

    /// `false` if `pnum` is outside the tracked window or already seen
    /// (including ranges aged out by the `MAX_ACK_RANGES` trim).
    pub fn should_process(&self, pnum: PacketNumber) -> bool {
        let n = pnum.as_i64();
        match self.seen.min() {
            Some(min) if n < min => false,
            _ => !self.seen.contains(n),
        }
    }

    pub fn should_send_ack(&self, now: Timestamp) -> bool {
        matches!(self.next_ack, Some(t) if t <= now)
    }

    /// The ranges and delay to report in an ACK frame, available even when
    /// [`AckState::should_send_ack`] is false so an ACK can ride along with
    /// other outgoing frames.
    pub fn acks_to_send(&self, now: Timestamp) -> Option<PendingAck> {
        if self.seen.is_empty() {
            return None;
        }

        let ack_delay = self
            .max_recv_time
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::ZERO);

        Some(PendingAck {
            ranges: self.seen.clone(),
            ack_delay,
        })
    }

    /// Marks an ACK as sent: clears the schedule and the ack-eliciting
    /// debt that drove it.
    pub fn sent_ack(&mut self) {
        self.next_ack = None;
        self.unacked_ack_eliciting = 0;
    }

    /// Stops advertising packet numbers the peer has already acknowledged
    /// our ACK for, RFC 9000 §13.2.4.
    pub fn handle_ack(&mut self, largest_acked_by_peer: PacketNumber) {
        if let Some(r) = self.seen.range_containing(largest_acked_by_peer.as_i64()) {
            self.seen.remove_below(r.start);
        }
    }

    /// When this space's ACK must next be sent, if anything is owed at all.
    /// The connection event loop folds this into its `nextTimeout`
    /// computation for the Application Data space.
    pub fn next_ack_deadline(&self) -> Option<Timestamp> {
        self.next_ack
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
