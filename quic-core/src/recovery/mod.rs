// SPDX-License-Identifier: Apache-2.0

//! RFC 9002 loss detection and congestion control.

pub mod congestion_controller;
pub mod loss;
pub mod pacing;
pub mod persistent_congestion;
pub mod reno;
pub mod rtt_estimator;
pub mod sent_packets;

pub use congestion_controller::CongestionController;
pub use loss::LossDetector;
pub use pacing::Pacer;
pub use reno::RenoCongestionController;
pub use rtt_estimator::RttEstimator;
pub use sent_packets::{SentPacketInfo, SentPacketRing};

use core::time::Duration;

/// RFC 9002 §6.1.2: the recommended timer granularity.
pub const K_GRANULARITY: Duration = Duration::from_millis(1);

/// RFC 9002 §6.2.2: the initial RTT estimate, used before any sample exists.
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(333);

/// RFC 9002 §6.1.1: declare a packet lost after this many higher-numbered
/// packets in the same space have been acknowledged.
pub const K_PACKET_THRESHOLD: u64 = 3;

/// RFC 9002 §6.1.2: the time-threshold multiplier on `max(smoothed_rtt,
/// latest_rtt)`, expressed as a ninths fraction to stay integer-exact.
pub const K_TIME_THRESHOLD_NUM: u32 = 9;
pub const K_TIME_THRESHOLD_DEN: u32 = 8;

/// RFC 9002 §7.6.1: persistent congestion requires losses spanning at least
/// this many PTOs.
pub const K_PERSISTENT_CONGESTION_THRESHOLD: u32 = 3;

/// RFC 9002 §7.2: the recommended floor on the initial congestion window,
/// expressed in multiples of the maximum datagram size.
pub const INITIAL_WINDOW_PACKETS: u32 = 10;

/// RFC 9002 §7.2: the ceiling applied to the initial congestion window.
pub const MAX_INITIAL_WINDOW_BYTES: u32 = 14720;

/// Computes the initial congestion window per RFC 9002 §7.2:
/// `max(10 * max_datagram_size, min(14720, 2 * max_datagram_size))`.
pub fn initial_congestion_window(max_datagram_size: u32) -> u32 {
    let ten_mds = INITIAL_WINDOW_PACKETS.saturating_mul(max_datagram_size);
    let two_mds = 2u32.saturating_mul(max_datagram_size);
    ten_mds.max(MAX_INITIAL_WINDOW_BYTES.min(two_mds))
}
