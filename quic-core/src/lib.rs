#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Core data structures and RFC 9002 loss-recovery state for a QUIC transport
//! implementation: the range-set, packet number spaces, connection IDs,
//! transport error codes, stateless-reset tokens, and the RTT/congestion/pacer/
//! loss-detector stack.
//!
//! This crate intentionally does not implement the wire codecs (varint, frame
//! parse/serialize, header protection, AEAD) byte-by-byte; those are treated as
//! external contracts fixed by RFC 9000 §§16-19 and RFC 9001 §5.

extern crate alloc;

pub mod connection;
pub mod frame_digest;
pub mod interval_set;
pub mod packet_number;
pub mod recovery;
pub mod stateless_reset;
pub mod time;

/// The QUIC v1 wire version, RFC 9000 §15.
pub const QUIC_VERSION_1: u32 = 0x0000_0001;

/// Minimum size of a padded Initial datagram (RFC 9000 §14.1).
pub const PADDED_INITIAL_DATAGRAM_SIZE: usize = 1200;

/// Recommended maximum UDP payload size.
pub const MAX_UDP_PAYLOAD_SIZE: usize = 1452;

/// The initial maximum datagram size assumed before path MTU discovery.
pub const INITIAL_MAX_DATAGRAM_SIZE: u32 = 1200;

/// ACK Delay Exponent transport parameter default (RFC 9000 §18.2).
pub const ACK_DELAY_EXPONENT: u8 = 3;

/// `max_ack_delay` transport parameter default.
pub const MAX_ACK_DELAY: core::time::Duration = core::time::Duration::from_millis(25);

/// `timer_granularity`, RFC 9002 §6.1.2.
pub const TIMER_GRANULARITY: core::time::Duration = core::time::Duration::from_millis(1);
