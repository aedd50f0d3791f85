// SPDX-License-Identifier: Apache-2.0

//! RTT estimation, RFC 9002 §5.

use super::{DEFAULT_INITIAL_RTT, K_GRANULARITY};
use crate::time::Timestamp;
use core::time::Duration;

/// Tracks `min_rtt`, `latest_rtt`, `smoothed_rtt`, and `rttvar` for a
/// connection, per RFC 9002 §5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RttEstimator {
    latest_rtt: Duration,
    /// `None` until the first sample, equivalent to RFC 9002's `min_rtt = -1`.
    min_rtt: Option<Duration>,
    smoothed_rtt: Duration,
    rttvar: Duration,
    max_ack_delay: Duration,
    first_sample_time: Option<Timestamp>,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(crate::MAX_ACK_DELAY)
    }
}

impl RttEstimator {
    pub fn new(max_ack_delay: Duration) -> Self {
        Self {
            latest_rtt: Duration::ZERO,
            min_rtt: None,
            smoothed_rtt: DEFAULT_INITIAL_RTT,
            rttvar: DEFAULT_INITIAL_RTT / 2,
            max_ack_delay,
            first_sample_time: None,
        }
    }

    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// `None` before the first sample has arrived.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    pub fn first_sample_time(&self) -> Option<Timestamp> {
        self.first_sample_time
    }

    /// Records a new RTT sample. `ack_delay` is the peer-reported ACK Delay;
    /// it is only honored (clamped to `max_ack_delay`) once the handshake is
    /// confirmed, matching RFC 9002 §5.3.
    pub fn update_sample(
        &mut self,
        now: Timestamp,
        time_sent: Timestamp,
        ack_delay: Duration,
        handshake_confirmed: bool,
    ) {
        self.latest_rtt = now.saturating_duration_since(time_sent);

        if self.first_sample_time.is_none() {
            self.first_sample_time = Some(now);
            self.min_rtt = Some(self.latest_rtt);
            self.smoothed_rtt = self.latest_rtt;
            self.rttvar = self.latest_rtt / 2;
            return;
        }

        let min_rtt = self.min_rtt.unwrap_or(self.latest_rtt).min(self.latest_rtt);
        self.min_rtt = Some(min_rtt);

        let ack_delay = if handshake_confirmed {
            ack_delay.min(self.max_ack_delay)
        } else {
            ack_delay
        };

        let adjusted_rtt = match self.latest_rtt.checked_sub(ack_delay) {
            Some(adjusted) if adjusted >= min_rtt => adjusted,
            _ => self.latest_rtt,
        };

        let rttvar_sample = abs_diff(self.smoothed_rtt, adjusted_rtt);
        self.rttvar = (self.rttvar * 3 + rttvar_sample) / 4;
        self.smoothed_rtt = (self.smoothed_rtt * 7 + adjusted_rtt) / 8;
    }

    /// Invoked when persistent congestion is declared: `min_rtt` resets to
    /// the most recent sample, RFC 9002 §5.2.
    pub fn on_persistent_congestion(&mut self) {
        self.min_rtt = Some(self.latest_rtt);
    }

    /// `max((9/8) * max(smoothed_rtt, latest_rtt), timer_granularity)`, the
    /// time-threshold loss window, RFC 9002 §6.1.2.
    pub fn loss_duration(&self) -> Duration {
        let base = self.smoothed_rtt.max(self.latest_rtt);
        (base * 9 / 8).max(K_GRANULARITY)
    }

    /// `smoothed_rtt + max(4 * rttvar, timer_granularity)`, the PTO base
    /// duration before any `max_ack_delay` addition, RFC 9002 §6.2.1.
    pub fn pto_base_duration(&self) -> Duration {
        self.smoothed_rtt + (self.rttvar * 4).max(K_GRANULARITY)
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_duration(Duration::from_millis(ms))
    }

    #[test]
    fn first_sample_seeds_all_fields() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_sample(ts(110), ts(100), Duration::ZERO, true);
        assert_eq!(rtt.latest_rtt(), Duration::from_millis(10));
        assert_eq!(rtt.min_rtt(), Some(Duration::from_millis(10)));
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(10));
        assert_eq!(rtt.rttvar(), Duration::from_millis(5));
    }

    #[test]
    fn time_threshold_from_single_sample() {
        // single 10ms RTT sample -> loss_duration = 10ms * 9/8 = 11.25ms.
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_sample(ts(10), ts(0), Duration::ZERO, true);
        assert_eq!(rtt.loss_duration(), Duration::from_micros(11_250));
    }

    #[test]
    fn subsequent_sample_uses_ewma() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_sample(ts(10), ts(0), Duration::ZERO, true);
        rtt.update_sample(ts(30), ts(20), Duration::ZERO, true);
        // adjusted_rtt = 10ms, smoothed = (7*10 + 10)/8 = 10ms
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(10));
    }

    #[test]
    fn ack_delay_not_applied_below_min_rtt() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_sample(ts(10), ts(0), Duration::ZERO, true);
        // second sample: latest=5ms, ack_delay=10ms would go below min_rtt (5ms would
        // become negative), so adjusted falls back to latest_rtt unadjusted.
        rtt.update_sample(ts(35), ts(30), Duration::from_millis(10), true);
        assert_eq!(rtt.latest_rtt(), Duration::from_millis(5));
    }

    #[test]
    fn persistent_congestion_resets_min_rtt() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_sample(ts(10), ts(0), Duration::ZERO, true);
        rtt.update_sample(ts(130), ts(100), Duration::ZERO, true); // latest = 30ms
        rtt.on_persistent_congestion();
        assert_eq!(rtt.min_rtt(), Some(Duration::from_millis(30)));
    }
}
