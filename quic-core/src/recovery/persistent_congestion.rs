// SPDX-License-Identifier: Apache-2.0

//! Persistent congestion detection, RFC 9002 §7.6.

use super::{rtt_estimator::RttEstimator, K_PERSISTENT_CONGESTION_THRESHOLD};
use crate::time::Timestamp;
use core::time::Duration;

/// The minimum duration that must separate the sent times of two
/// ack-eliciting, lost packets for persistent congestion to be declared.
pub fn duration(rtt: &RttEstimator, max_ack_delay: Duration) -> Duration {
    (rtt.pto_base_duration() + max_ack_delay) * K_PERSISTENT_CONGESTION_THRESHOLD
}

/// `true` if `first` and `last` (both ack-eliciting, both lost, `first`
/// sent no later than `last`) are far enough apart, and a prior RTT sample
/// exists, to declare persistent congestion.
pub fn is_persistent_congestion(
    rtt: &RttEstimator,
    max_ack_delay: Duration,
    first_sent: Timestamp,
    last_sent: Timestamp,
) -> bool {
    if rtt.first_sample_time().is_none() {
        return false;
    }
    last_sent.saturating_duration_since(first_sent) > duration(rtt, max_ack_delay)
}
