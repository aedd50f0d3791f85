// SPDX-License-Identifier: Apache-2.0

//! The per-connection loss detector: packet- and time-threshold loss,
//! PTO arming and backoff, anti-amplification accounting, and the single
//! next-event timer that drives retransmission, RFC 9002 §§5-7.

use super::{
    congestion_controller::CongestionController, pacing::Pacer, persistent_congestion,
    rtt_estimator::RttEstimator, sent_packets::SentPacketRing, K_PACKET_THRESHOLD,
};
use crate::{
    packet_number::{PacketNumber, PacketNumberSpace},
    time::Timestamp,
};
use core::time::Duration;

/// The minimum datagram an anti-amplification-limited server may still
/// send; below this the server must wait for more validated bytes from
/// the peer before sending anything at all, RFC 9000 §8.1.
const MIN_PACKET_SIZE: i64 = crate::PADDED_INITIAL_DATAGRAM_SIZE as i64;

/// What [`LossDetector::on_ack_received`] learned from applying one ACK
/// frame: which packet numbers transitioned to acked (so the caller can
/// replay their [`crate::frame_digest::FrameDigest`] into ack-state/CRYPTO-
/// stream/connection-ID bookkeeping), and any packets newly declared lost
/// by the loss detection the ACK triggered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub newly_acked: alloc::vec::Vec<PacketNumber>,
    pub newly_lost: alloc::vec::Vec<(PacketNumberSpace, PacketNumber)>,
}

/// What a caller asking "can I send now" should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendLimit {
    /// Send is permitted.
    Ok,
    /// Blocked on anti-amplification: the server must wait for the peer's
    /// address to be validated or for more bytes to arrive from it.
    AntiAmplification,
    /// Blocked on the congestion window.
    CongestionWindow,
    /// Permitted after `Timestamp`, per the pacer.
    Paced(Timestamp),
}

/// Per-space bookkeeping the detector needs beyond the sent-packet ring
/// itself: whether the space's keys are still live.
#[derive(Default)]
struct Space {
    ring: SentPacketRing,
    active: bool,
}

/// Owns RTT estimation, congestion control, pacing, and the three packet
/// number spaces' sent-packet records for one connection, and derives the
/// single timer that should fire next (a loss-detection alarm or a PTO).
pub struct LossDetector<C> {
    rtt: RttEstimator,
    cc: C,
    pacer: Pacer,
    spaces: [Space; 3],
    is_server: bool,
    handshake_confirmed: bool,
    max_ack_delay: Duration,
    /// `None` means "unlimited" (client, or a server past address
    /// validation). `Some(credit)` is `3 * bytes_received - bytes_sent`.
    anti_amplification_credit: Option<i64>,
    received_any_ack: bool,
    pto_backoff_count: u32,
    /// `true` from the moment a PTO fires until the caller sends a probe
    /// and calls [`LossDetector::clear_pto_expired`].
    pto_expired: bool,
    timer: Option<Timestamp>,
    pto_armed: bool,
}

impl<C: CongestionController> LossDetector<C> {
    pub fn new(now: Timestamp, cc: C, max_ack_delay: Duration, is_server: bool) -> Self {
        let initial_cwnd = cc.congestion_window();
        Self {
            rtt: RttEstimator::new(max_ack_delay),
            cc,
            pacer: Pacer::new(now, initial_cwnd, super::K_GRANULARITY),
            spaces: [
                Space { ring: SentPacketRing::new(), active: true },
                Space { ring: SentPacketRing::new(), active: true },
                Space { ring: SentPacketRing::new(), active: true },
            ],
            is_server,
            handshake_confirmed: false,
            max_ack_delay,
            anti_amplification_credit: if is_server { Some(0) } else { None },
            received_any_ack: false,
            pto_backoff_count: 0,
            pto_expired: false,
            timer: None,
            pto_armed: false,
        }
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn congestion_controller(&self) -> &C {
        &self.cc
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    pub fn timer(&self) -> Option<Timestamp> {
        self.timer
    }

    pub fn pto_expired(&self) -> bool {
        self.pto_expired
    }

    pub fn clear_pto_expired(&mut self) {
        self.pto_expired = false;
    }

    pub fn pto_backoff_count(&self) -> u32 {
        self.pto_backoff_count
    }

    fn is_client(&self) -> bool {
        !self.is_server
    }

    /// Marks the handshake confirmed: from this point PTO is computed only
    /// from the Application Data space and its `max_ack_delay` applies.
    pub fn on_handshake_confirmed(&mut self) {
        self.handshake_confirmed = true;
    }

    /// Stops treating the server as anti-amplification limited, once the
    /// peer's address has been validated (e.g. a successful Retry exchange
    /// or receipt of a HANDSHAKE-protected packet).
    pub fn on_address_validated(&mut self) {
        self.anti_amplification_credit = None;
    }

    /// Credits `3 * bytes` toward the anti-amplification limit on receipt
    /// of a datagram from an as-yet-unvalidated peer address. A no-op once
    /// validated or for a client.
    pub fn on_datagram_received(&mut self, bytes: usize) {
        if let Some(credit) = &mut self.anti_amplification_credit {
            *credit = credit.saturating_add(3 * bytes as i64);
        }
    }

    fn on_bytes_sent(&mut self, bytes: u32) {
        if let Some(credit) = &mut self.anti_amplification_credit {
            *credit = credit.saturating_sub(bytes as i64);
        }
    }

    fn is_anti_amplification_blocked(&self) -> bool {
        matches!(self.anti_amplification_credit, Some(c) if c < MIN_PACKET_SIZE)
    }

    /// What the caller should do before sending `max_datagram_size` more
    /// bytes right now.
    pub fn send_limit(&self, now: Timestamp, max_datagram_size: u32) -> SendLimit {
        if self.is_anti_amplification_blocked() {
            return SendLimit::AntiAmplification;
        }
        if self.cc.is_congestion_limited(max_datagram_size) {
            return SendLimit::CongestionWindow;
        }
        if let Err(next) = self.pacer.can_send(now) {
            return SendLimit::Paced(next);
        }
        SendLimit::Ok
    }

    /// Records a packet just handed to the network.
    pub fn on_packet_sent(
        &mut self,
        space: PacketNumberSpace,
        now: Timestamp,
        info: super::SentPacketInfo,
    ) {
        self.cc.on_packet_sent(now, info.size, info.in_flight);
        self.pacer
            .on_packet_sent(now, info.size, self.cc.congestion_window(), self.rtt.smoothed_rtt());
        self.on_bytes_sent(info.size);
        self.spaces[space as usize].ring.on_packet_sent(info);
        self.reschedule(now);
    }

    /// Applies one space's worth of newly-acknowledged packet numbers.
    /// `largest_acked` identifies which of `newly_acked` (if any) is the
    /// one the ACK Delay applies to for an RTT sample.
    pub fn on_ack_received(
        &mut self,
        space: PacketNumberSpace,
        now: Timestamp,
        largest_acked: PacketNumber,
        newly_acked: &[PacketNumber],
        ack_delay: Duration,
    ) -> AckOutcome {
        self.pacer.advance(now, self.cc.congestion_window(), self.rtt.smoothed_rtt());

        let mut outcome = AckOutcome::default();
        for &pn in newly_acked {
            let idx = space as usize;
            let Some(p) = self.spaces[idx].ring.on_ack(pn) else {
                continue;
            };
            let (sent_time, size, ack_eliciting, in_flight) =
                (p.time_sent, p.size, p.ack_eliciting, p.in_flight);
            outcome.newly_acked.push(pn);

            if pn == largest_acked && ack_eliciting {
                self.rtt.update_sample(now, sent_time, ack_delay, self.handshake_confirmed);
            }
            if in_flight {
                self.cc.on_packet_ack(sent_time, size, &self.rtt, now);
            }
        }

        // RFC 9002 Appendix A: reset the PTO backoff on any ACK, except a
        // client must not reset it on an Initial-space ACK, since a
        // malicious network can trivially spoof those.
        if !(self.is_client() && space == PacketNumberSpace::Initial) {
            self.pto_backoff_count = 0;
        }
        self.received_any_ack = true;

        outcome.newly_lost = self.detect_and_declare_losses(now);
        self.reschedule(now);
        outcome
    }

    /// Drops a space's keys: discards its sent-packet ring, discounts any
    /// bytes still in flight, and stops considering it for loss/PTO timers.
    pub fn discard_keys(&mut self, now: Timestamp, space: PacketNumberSpace) {
        let idx = space as usize;
        let dropped = self.spaces[idx].ring.discard();
        self.cc.remove_from_flight(dropped);
        self.spaces[idx].active = false;
        self.reschedule(now);
    }

    /// Advances time: expires the PTO if due, re-runs loss detection, and
    /// rearms the timer. Call whenever `timer()` has passed.
    pub fn advance(&mut self, now: Timestamp) -> alloc::vec::Vec<(PacketNumberSpace, PacketNumber)> {
        if self.pto_armed {
            if let Some(t) = self.timer {
                if t <= now {
                    self.pto_expired = true;
                    self.pto_backoff_count = self.pto_backoff_count.saturating_add(1);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(backoff = self.pto_backoff_count, "pto expired");
                }
            }
        }
        let newly_lost = self.detect_and_declare_losses(now);
        self.reschedule(now);
        newly_lost
    }

    /// Accesses one space's sent-packet ring, e.g. to look up a just-acked
    /// or just-lost packet's [`crate::frame_digest::FrameDigest`].
    pub fn ring(&self, space: PacketNumberSpace) -> &SentPacketRing {
        &self.spaces[space as usize].ring
    }

    fn detect_and_declare_losses(
        &mut self,
        now: Timestamp,
    ) -> alloc::vec::Vec<(PacketNumberSpace, PacketNumber)> {
        let loss_duration = self.rtt.loss_duration();
        let mut persistent_any = false;
        let mut all_newly_lost = alloc::vec::Vec::new();

        for idx in 0..3 {
            if !self.spaces[idx].active {
                continue;
            }
            let max_acked = self.spaces[idx].ring.max_acked();
            if max_acked.is_none() {
                continue;
            }

            let mut newly_lost = alloc::vec::Vec::new();
            for p in self.spaces[idx].ring.iter_unacked() {
                if p.packet_number >= max_acked {
                    continue;
                }
                let packet_threshold_lost =
                    max_acked.saturating_diff(p.packet_number) >= K_PACKET_THRESHOLD;
                let time_threshold_lost =
                    now.saturating_duration_since(p.time_sent) >= loss_duration;
                if packet_threshold_lost || time_threshold_lost {
                    newly_lost.push(p.packet_number);
                }
            }
            if newly_lost.is_empty() {
                continue;
            }
            all_newly_lost.extend(newly_lost.iter().map(|&pn| (PacketNumberSpace::ALL[idx], pn)));

            let mut lost_ack_eliciting_bounds: Option<(Timestamp, Timestamp)> = None;
            for &pn in &newly_lost {
                let Some(p) = self.spaces[idx].ring.mark_lost(pn) else {
                    continue;
                };
                self.cc.on_packet_lost(p.time_sent, p.size, false, now);
                if p.ack_eliciting {
                    lost_ack_eliciting_bounds = Some(match lost_ack_eliciting_bounds {
                        None => (p.time_sent, p.time_sent),
                        Some((first, last)) => (first.min(p.time_sent), last.max(p.time_sent)),
                    });
                }
            }

            if let Some((first, last)) = lost_ack_eliciting_bounds {
                let lo = PacketNumber::new(newly_lost.iter().map(|p| p.as_i64()).min().unwrap());
                let hi = PacketNumber::new(newly_lost.iter().map(|p| p.as_i64()).max().unwrap());
                let gap_acked = self.spaces[idx].ring.acked_between(lo, hi);
                if !gap_acked
                    && persistent_congestion::is_persistent_congestion(
                        &self.rtt,
                        self.max_ack_delay,
                        first,
                        last,
                    )
                {
                    persistent_any = true;
                    self.cc.on_packet_lost(last, 0, true, now);
                }
            }
        }

        if persistent_any {
            #[cfg(feature = "tracing")]
            tracing::debug!("persistent congestion detected");
            self.rtt.on_persistent_congestion();
        }

        #[cfg(feature = "tracing")]
        if !all_newly_lost.is_empty() {
            tracing::trace!(count = all_newly_lost.len(), "packets declared lost");
        }

        all_newly_lost
    }

    /// Returns `(latest_send_time, space_index)` among the spaces still
    /// valid for probing, plus whether that space's `max_ack_delay` should
    /// be added to the PTO period.
    fn latest_probe_candidate(&self) -> Option<(Timestamp, usize)> {
        let candidate_spaces: &[usize] = if self.handshake_confirmed { &[2] } else { &[0, 1] };
        let mut latest: Option<(Timestamp, usize)> = None;
        for &idx in candidate_spaces {
            if !self.spaces[idx].active {
                continue;
            }
            let last_pn = self.spaces[idx].ring.last_ack_eliciting();
            if last_pn.is_none() {
                continue;
            }
            if let Some(p) = self.spaces[idx].ring.get(last_pn) {
                if latest.map_or(true, |(t, _)| p.time_sent > t) {
                    latest = Some((p.time_sent, idx));
                }
            }
        }
        latest
    }

    fn pto_period(&self, space_idx: usize) -> Duration {
        let mut period = self.rtt.pto_base_duration();
        if space_idx == 2 && self.handshake_confirmed {
            period += self.max_ack_delay;
        }
        period.saturating_mul(1u32 << self.pto_backoff_count.min(30))
    }

    fn compute_pto(&self, now: Timestamp) -> Option<Timestamp> {
        match self.latest_probe_candidate() {
            Some((sent, idx)) => Some(sent + self.pto_period(idx)),
            // A client with nothing in flight and no ack received yet still
            // arms a PTO, so the handshake can make progress after loss of
            // the first flight, RFC 9002 §6.2.2.1.
            None if self.is_client() && !self.received_any_ack => {
                Some(now + self.pto_period(0))
            }
            None => None,
        }
    }

    fn reschedule(&mut self, now: Timestamp) {
        let loss_duration = self.rtt.loss_duration();
        let mut earliest_loss: Option<Timestamp> = None;
        for idx in 0..3 {
            if !self.spaces[idx].active {
                continue;
            }
            let max_acked = self.spaces[idx].ring.max_acked();
            if max_acked.is_none() {
                continue;
            }
            for p in self.spaces[idx].ring.iter_unacked() {
                if p.packet_number < max_acked {
                    let t = p.time_sent + loss_duration;
                    if earliest_loss.map_or(true, |e| t < e) {
                        earliest_loss = Some(t);
                    }
                }
            }
        }

        if let Some(t) = earliest_loss {
            self.timer = Some(t);
            self.pto_armed = false;
            return;
        }
        if self.pto_expired {
            self.timer = None;
            self.pto_armed = false;
            return;
        }
        if self.is_anti_amplification_blocked() {
            self.timer = None;
            self.pto_armed = false;
            return;
        }
        match self.compute_pto(now) {
            Some(t) => {
                self.timer = Some(t);
                self.pto_armed = true;
            }
            None => {
                self.timer = None;
                self.pto_armed = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame_digest::FrameDigest, recovery::reno::RenoCongestionController};

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    fn sent(pn: i64, at_ms: u64, size: u32) -> super::super::SentPacketInfo {
        super::super::SentPacketInfo {
            packet_number: PacketNumber::new(pn),
            time_sent: ts(at_ms),
            size,
            ack_eliciting: true,
            in_flight: true,
            acked: false,
            lost: false,
            digest: FrameDigest::new(),
        }
    }

    fn client_detector(now: Timestamp) -> LossDetector<RenoCongestionController> {
        LossDetector::new(now, RenoCongestionController::new(1200), Duration::from_millis(25), false)
    }

    #[test]
    fn client_has_unlimited_anti_amplification_budget() {
        let detector = client_detector(ts(0));
        assert_eq!(detector.send_limit(ts(0), 1200), SendLimit::Ok);
    }

    #[test]
    fn server_starts_anti_amplification_blocked_until_credited() {
        let mut detector: LossDetector<RenoCongestionController> =
            LossDetector::new(ts(0), RenoCongestionController::new(1200), Duration::from_millis(25), true);
        assert_eq!(detector.send_limit(ts(0), 1200), SendLimit::AntiAmplification);
        detector.on_datagram_received(1200);
        assert_eq!(detector.send_limit(ts(0), 1200), SendLimit::Ok);
    }

    #[test]
    fn server_address_validation_lifts_the_limit() {
        let mut detector: LossDetector<RenoCongestionController> =
            LossDetector::new(ts(0), RenoCongestionController::new(1200), Duration::from_millis(25), true);
        detector.on_address_validated();
        assert_eq!(detector.send_limit(ts(0), 1200), SendLimit::Ok);
    }

    #[test]
    fn packet_threshold_declares_loss_on_third_higher_ack() {
        let mut detector = client_detector(ts(0));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(0), sent(0, 0, 1200));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(1), sent(1, 1, 1200));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(2), sent(2, 2, 1200));
        // pn 3 is not ack-eliciting, so acking it takes no RTT sample and
        // loss_duration stays at its large pre-sample default: only the
        // packet threshold can fire in this test.
        let mut pn3 = sent(3, 3, 1200);
        pn3.ack_eliciting = false;
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(3), pn3);
        // Ack only packet 3: packets 0..=2 are all >= 3 behind, so pn 0 is lost
        // by packet threshold (diff 3), pn 1 and 2 are not (diff 2 and 1).
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(10),
            PacketNumber::new(3),
            &[PacketNumber::new(3)],
            Duration::ZERO,
        );
        let ring = &detector.spaces[PacketNumberSpace::ApplicationData as usize].ring;
        assert!(ring.get(PacketNumber::new(0)).unwrap().lost);
        assert!(!ring.get(PacketNumber::new(1)).unwrap().lost);
    }

    #[test]
    fn time_threshold_declares_loss_after_window_elapses() {
        let mut detector = client_detector(ts(0));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(0), sent(0, 0, 1200));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(1), sent(1, 1, 1200));
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(1),
            PacketNumber::new(1),
            &[PacketNumber::new(1)],
            Duration::ZERO,
        );
        // after the first sample, loss_duration = 1ms * 9/8, floored by 1ms granularity.
        detector.advance(ts(100));
        let ring = &detector.spaces[PacketNumberSpace::ApplicationData as usize].ring;
        assert!(ring.get(PacketNumber::new(0)).unwrap().lost);
    }

    #[test]
    fn ack_in_initial_space_does_not_reset_client_pto_backoff() {
        let mut detector = client_detector(ts(0));
        detector.pto_backoff_count = 2;
        detector.on_packet_sent(PacketNumberSpace::Initial, ts(0), sent(0, 0, 1200));
        detector.on_ack_received(
            PacketNumberSpace::Initial,
            ts(10),
            PacketNumber::new(0),
            &[PacketNumber::new(0)],
            Duration::ZERO,
        );
        assert_eq!(detector.pto_backoff_count(), 2);
    }

    #[test]
    fn ack_in_application_space_resets_pto_backoff() {
        let mut detector = client_detector(ts(0));
        detector.pto_backoff_count = 2;
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(0), sent(0, 0, 1200));
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(10),
            PacketNumber::new(0),
            &[PacketNumber::new(0)],
            Duration::ZERO,
        );
        assert_eq!(detector.pto_backoff_count(), 0);
    }

    #[test]
    fn client_with_nothing_in_flight_still_arms_a_pto() {
        let detector = client_detector(ts(0));
        assert!(detector.timer().is_none());
        let mut detector = detector;
        detector.reschedule(ts(0));
        assert!(detector.timer().is_some());
        assert!(detector.pto_armed);
    }

    #[test]
    fn discard_keys_discounts_in_flight_bytes_and_stops_tracking_space() {
        let mut detector = client_detector(ts(0));
        detector.on_packet_sent(PacketNumberSpace::Initial, ts(0), sent(0, 0, 1200));
        let before = detector.congestion_controller().bytes_in_flight();
        detector.discard_keys(ts(5), PacketNumberSpace::Initial);
        assert_eq!(detector.congestion_controller().bytes_in_flight(), before - 1200);
        assert!(detector.spaces[PacketNumberSpace::Initial as usize].ring.is_empty());
    }

    #[test]
    fn loss_timer_is_scheduled_before_pto_while_an_unacked_packet_precedes_max_acked() {
        let mut detector = client_detector(ts(0));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(0), sent(0, 0, 1200));
        // pn 1 is not ack-eliciting, so acking it takes no RTT sample and
        // loss_duration stays at its large pre-sample default, keeping pn 0
        // unlost (but scheduled) at the moment of the ack.
        let mut pn1 = sent(1, 1, 1200);
        pn1.ack_eliciting = false;
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(1), pn1);
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(2),
            PacketNumber::new(1),
            &[PacketNumber::new(1)],
            Duration::ZERO,
        );
        assert!(!detector.pto_armed);
        assert!(detector.timer().is_some());
    }

    #[test]
    fn pto_expiry_increments_backoff_and_clears_on_probe_sent() {
        let mut detector = client_detector(ts(0));
        detector.reschedule(ts(0));
        let fire_at = detector.timer().unwrap();
        detector.advance(fire_at);
        assert!(detector.pto_expired());
        assert_eq!(detector.pto_backoff_count(), 1);
        detector.clear_pto_expired();
        assert!(!detector.pto_expired());
    }

    #[test]
    fn anti_amplification_blocks_timer_arming_for_server() {
        let mut detector: LossDetector<RenoCongestionController> =
            LossDetector::new(ts(0), RenoCongestionController::new(1200), Duration::from_millis(25), true);
        detector.reschedule(ts(0));
        assert!(detector.timer().is_none());
    }

    fn sent_at(pn: i64, time: Timestamp, size: u32) -> super::super::SentPacketInfo {
        super::super::SentPacketInfo {
            packet_number: PacketNumber::new(pn),
            time_sent: time,
            size,
            ack_eliciting: true,
            in_flight: true,
            acked: false,
            lost: false,
            digest: FrameDigest::new(),
        }
    }

    #[test]
    fn widely_spaced_losses_with_no_intervening_ack_trigger_persistent_congestion() {
        let mut detector = client_detector(ts(0));
        // Seed an RTT sample so persistent_congestion::duration is a known window.
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(0), sent(100, 0, 1200));
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(10),
            PacketNumber::new(100),
            &[PacketNumber::new(100)],
            Duration::ZERO,
        );
        let window = persistent_congestion::duration(&detector.rtt, detector.max_ack_delay);

        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(20), sent(101, 20, 1200));
        let later = ts(20) + window + Duration::from_millis(1);
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, later, sent_at(102, later, 1200));
        // A far-future ack of a much higher packet number declares both 101
        // and 102 lost by packet threshold in the same detection pass. It is
        // marked non-ack-eliciting so it takes no RTT sample, keeping the
        // `window` computed above valid at evaluation time.
        let mut pn200 = sent_at(200, later, 1200);
        pn200.ack_eliciting = false;
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, later, pn200);
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            later,
            PacketNumber::new(200),
            &[PacketNumber::new(200)],
            Duration::ZERO,
        );
        assert_eq!(detector.congestion_controller().congestion_window(), 2 * 1200);
    }

    #[test]
    fn no_persistent_congestion_when_an_ack_falls_between_the_two_losses() {
        let mut detector = client_detector(ts(0));
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(0), sent(100, 0, 1200));
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(10),
            PacketNumber::new(100),
            &[PacketNumber::new(100)],
            Duration::ZERO,
        );
        let window = persistent_congestion::duration(&detector.rtt, detector.max_ack_delay);

        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(20), sent(101, 20, 1200));
        // An intervening packet between the two eventual losses (101 and
        // 110) gets acked. It and the later probe ack are non-ack-eliciting
        // so neither takes an RTT sample, keeping `window` valid at
        // evaluation time.
        let mut pn105 = sent(105, 21, 1200);
        pn105.ack_eliciting = false;
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, ts(21), pn105);
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            ts(22),
            PacketNumber::new(105),
            &[PacketNumber::new(105)],
            Duration::ZERO,
        );
        let later = ts(20) + window + Duration::from_millis(1);
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, later, sent_at(110, later, 1200));
        let mut pn200 = sent_at(200, later, 1200);
        pn200.ack_eliciting = false;
        detector.on_packet_sent(PacketNumberSpace::ApplicationData, later, pn200);
        let before_cwnd = detector.congestion_controller().congestion_window();
        detector.on_ack_received(
            PacketNumberSpace::ApplicationData,
            later,
            PacketNumber::new(200),
            &[PacketNumber::new(200)],
            Duration::ZERO,
        );
        // Regular loss still halves the window, but the intervening ack rules
        // out persistent congestion, so it must not collapse to the 2*mds floor.
        assert!(detector.congestion_controller().congestion_window() < before_cwnd);
        assert!(detector.congestion_controller().congestion_window() > 2 * 1200);
    }
}
