// SPDX-License-Identifier: Apache-2.0

//! Stateless-reset token derivation, RFC 9000 §10.3.

pub mod token;

pub use token::Token;

/// Datagrams shorter than this never elicit a stateless reset (RFC 9000 §10.3).
pub const MIN_DATAGRAM_LEN_TO_RESET: usize = 22;

/// The maximum size of an emitted stateless-reset datagram.
pub const MAX_RESET_DATAGRAM_LEN: usize = 42;

/// Computes the size of a stateless-reset datagram sent in reply to an
/// inbound datagram of `inbound_len` bytes: `min(inbound_len - 1, 42)`.
pub fn reset_datagram_len(inbound_len: usize) -> usize {
    inbound_len.saturating_sub(1).min(MAX_RESET_DATAGRAM_LEN)
}
