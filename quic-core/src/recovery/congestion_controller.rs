// SPDX-License-Identifier: Apache-2.0

//! The seam between the loss detector and a concrete congestion control
//! algorithm. This crate ships exactly one implementation, [`super::reno`],
//! but the loss detector is written against this trait so a different
//! algorithm could be substituted without touching `recovery::loss`.

use crate::{recovery::rtt_estimator::RttEstimator, time::Timestamp};
use core::time::Duration;

/// A congestion controller as seen by the loss detector.
pub trait CongestionController {
    /// The current congestion window, in bytes.
    fn congestion_window(&self) -> u32;

    /// The current count of bytes considered in flight.
    fn bytes_in_flight(&self) -> u32;

    /// `true` if sending `max_datagram_size` more bytes would exceed the window.
    fn is_congestion_limited(&self, max_datagram_size: u32) -> bool {
        self.bytes_in_flight().saturating_add(max_datagram_size) > self.congestion_window()
    }

    /// Called when a packet of `sent_bytes` is sent. `in_flight` is `false`
    /// for packets that carry only ACK/PADDING/CONNECTION_CLOSE frames,
    /// which are not congestion controlled.
    fn on_packet_sent(&mut self, time_sent: Timestamp, sent_bytes: u32, in_flight: bool);

    /// Called once per newly-acknowledged packet.
    fn on_packet_ack(
        &mut self,
        time_sent: Timestamp,
        acked_bytes: u32,
        rtt_estimator: &RttEstimator,
        now: Timestamp,
    );

    /// Called once per packet newly declared lost.
    fn on_packet_lost(
        &mut self,
        time_sent: Timestamp,
        lost_bytes: u32,
        persistent_congestion: bool,
        now: Timestamp,
    );

    /// Marks the window as under-utilized so `on_packet_ack` does not grow
    /// the window on stale acks (RFC 9002 §7.8).
    fn on_app_limited(&mut self, under_utilized: bool);

    /// The duration after which the sender may consider itself no longer in
    /// recovery, used by the loss detector's PTO backoff reset rule.
    fn recovery_start(&self) -> Option<Timestamp>;

    /// Called when a space's keys are discarded: discounts `bytes` (the
    /// in-flight total for packets that will never be acked or declared
    /// lost now that their space is gone) from `bytes_in_flight`.
    fn remove_from_flight(&mut self, bytes: u32);
}

/// Shared constant used by every controller implementation: the minimum
/// congestion window, RFC 9002 §7.
pub fn minimum_window(max_datagram_size: u32) -> u32 {
    2 * max_datagram_size
}

pub type PersistentCongestionWindow = u32;

/// `2 * max_datagram_size`, applied when persistent congestion collapses the
/// window, RFC 9002 §7.6.2.
pub fn persistent_congestion_window(max_datagram_size: u32) -> PersistentCongestionWindow {
    2 * max_datagram_size
}

/// A no-op duration helper kept alongside the trait for callers that need to
/// reason about "no RTT sample yet" without importing `Option<Duration>`
/// machinery at every call site.
pub const NO_RTT_SAMPLE: Option<Duration> = None;
