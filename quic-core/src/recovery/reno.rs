// SPDX-License-Identifier: Apache-2.0

//! A Reno-style congestion controller: slow start, recovery, and congestion
//! avoidance, RFC 9002 §7.

use super::{
    congestion_controller::{minimum_window, CongestionController},
    initial_congestion_window, rtt_estimator::RttEstimator,
};
use crate::time::Timestamp;

/// `kLossReductionFactor`, RFC 9002 §7.3.1: the fraction of the current
/// window retained on entering recovery.
const LOSS_REDUCTION_FACTOR_NUM: u32 = 1;
const LOSS_REDUCTION_FACTOR_DEN: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenoCongestionController {
    max_datagram_size: u32,
    congestion_window: u32,
    slow_start_threshold: u32,
    bytes_in_flight: u32,
    /// `Some(t)` once a loss has put the controller into recovery; a packet
    /// sent at or before `t` cannot trigger a second recovery entry or grow
    /// the window, per RFC 9002 §7.3.2's `InCongestionRecovery`.
    congestion_recovery_start_time: Option<Timestamp>,
    /// Fractional congestion-avoidance growth accumulated across acks so
    /// that one window's worth of acks grows `cwnd` by exactly one MDS.
    bytes_acked_in_avoidance: u32,
    under_utilized: bool,
}

impl RenoCongestionController {
    pub fn new(max_datagram_size: u32) -> Self {
        let congestion_window = initial_congestion_window(max_datagram_size);
        Self {
            max_datagram_size,
            congestion_window,
            slow_start_threshold: u32::MAX,
            bytes_in_flight: 0,
            congestion_recovery_start_time: None,
            bytes_acked_in_avoidance: 0,
            under_utilized: false,
        }
    }

    fn in_congestion_recovery(&self, sent_time: Timestamp) -> bool {
        matches!(self.congestion_recovery_start_time, Some(start) if sent_time <= start)
    }

    fn in_slow_start(&self) -> bool {
        self.congestion_window < self.slow_start_threshold
    }
}

impl CongestionController for RenoCongestionController {
    fn congestion_window(&self) -> u32 {
        self.congestion_window
    }

    fn bytes_in_flight(&self) -> u32 {
        self.bytes_in_flight
    }

    fn on_packet_sent(&mut self, _time_sent: Timestamp, sent_bytes: u32, in_flight: bool) {
        if in_flight {
            self.bytes_in_flight = self.bytes_in_flight.saturating_add(sent_bytes);
        }
    }

    fn on_packet_ack(
        &mut self,
        time_sent: Timestamp,
        acked_bytes: u32,
        _rtt_estimator: &RttEstimator,
        _now: Timestamp,
    ) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(acked_bytes);

        if self.under_utilized {
            return;
        }
        if self.in_congestion_recovery(time_sent) {
            return;
        }

        if self.in_slow_start() {
            self.congestion_window = self.congestion_window.saturating_add(acked_bytes);
        } else {
            self.bytes_acked_in_avoidance =
                self.bytes_acked_in_avoidance.saturating_add(acked_bytes);
            while self.bytes_acked_in_avoidance >= self.congestion_window {
                self.bytes_acked_in_avoidance -= self.congestion_window;
                self.congestion_window =
                    self.congestion_window.saturating_add(self.max_datagram_size);
            }
        }
    }

    fn on_packet_lost(
        &mut self,
        time_sent: Timestamp,
        lost_bytes: u32,
        persistent_congestion: bool,
        now: Timestamp,
    ) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(lost_bytes);

        if !self.in_congestion_recovery(time_sent) {
            self.congestion_recovery_start_time = Some(now);
            let reduced = (self.congestion_window as u64 * LOSS_REDUCTION_FACTOR_NUM as u64
                / LOSS_REDUCTION_FACTOR_DEN as u64) as u32;
            self.slow_start_threshold = reduced.max(minimum_window(self.max_datagram_size));
            self.congestion_window = self.slow_start_threshold;
            self.bytes_acked_in_avoidance = 0;
        }

        if persistent_congestion {
            self.congestion_window = 2 * self.max_datagram_size;
        }
    }

    fn on_app_limited(&mut self, under_utilized: bool) {
        self.under_utilized = under_utilized;
    }

    fn recovery_start(&self) -> Option<Timestamp> {
        self.congestion_recovery_start_time
    }

    fn remove_from_flight(&mut self, bytes: u32) {
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    #[test]
    fn initial_window_matches_formula() {
        let cc = RenoCongestionController::new(1200);
        assert_eq!(cc.congestion_window(), 12000);
    }

    #[test]
    fn slow_start_grows_by_full_acked_bytes() {
        let mut cc = RenoCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(25));
        let before = cc.congestion_window();
        cc.on_packet_sent(ts(0), 1200, true);
        cc.on_packet_ack(ts(0), 1200, &rtt, ts(50));
        assert_eq!(cc.congestion_window(), before + 1200);
    }

    #[test]
    fn loss_enters_recovery_and_halves_window() {
        let mut cc = RenoCongestionController::new(1200);
        cc.on_packet_sent(ts(0), 1200, true);
        cc.on_packet_lost(ts(0), 1200, false, ts(50));
        assert_eq!(cc.congestion_window(), 6000);
        assert_eq!(cc.recovery_start(), Some(ts(50)));
    }

    #[test]
    fn loss_never_drops_below_minimum_window() {
        let mut cc = RenoCongestionController::new(1200);
        cc.congestion_window = 1800; // below 2*2*MDS threshold territory
        cc.on_packet_lost(ts(0), 1200, false, ts(10));
        assert_eq!(cc.congestion_window(), 2400); // 2 * MDS floor
    }

    #[test]
    fn acks_during_recovery_do_not_grow_window() {
        let mut cc = RenoCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(25));
        cc.on_packet_lost(ts(10), 1200, false, ts(10));
        let cwnd_after_loss = cc.congestion_window();
        // a packet sent before the recovery episode started must not grow cwnd
        cc.on_packet_ack(ts(5), 1200, &rtt, ts(20));
        assert_eq!(cc.congestion_window(), cwnd_after_loss);
    }

    #[test]
    fn persistent_congestion_collapses_to_two_mds() {
        let mut cc = RenoCongestionController::new(1200);
        cc.on_packet_lost(ts(0), 1200, true, ts(50));
        assert_eq!(cc.congestion_window(), 2400);
    }

    #[test]
    fn congestion_avoidance_grows_by_one_mds_per_window_of_acks() {
        let mut cc = RenoCongestionController::new(1200);
        let rtt = RttEstimator::new(Duration::from_millis(25));
        cc.congestion_window = 10000;
        cc.slow_start_threshold = 5000; // force congestion avoidance
        let before = cc.congestion_window();
        // Ack exactly one window's worth of bytes, split across calls.
        cc.on_packet_ack(ts(0), 6000, &rtt, ts(10));
        cc.on_packet_ack(ts(0), 4000, &rtt, ts(20));
        assert_eq!(cc.congestion_window(), before + 1200);
    }
}
