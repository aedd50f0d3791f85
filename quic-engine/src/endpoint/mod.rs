// SPDX-License-Identifier: Apache-2.0

//! The per-socket endpoint: connection-ID routing, the accept queue,
//! stateless-reset token derivation, Retry-token validation, and the
//! deferred-update list that lets a connection ask the endpoint to do
//! something without blocking its own loop on it, §5 / §6.
//!
//! Datagram I/O and version negotiation wire encoding live outside this
//! crate; `Endpoint` only owns the bookkeeping that has to be shared across
//! every connection on a socket.

use crate::connection::Connection;
use crate::key_schedule::{KeyPair, OneRttKeyPair};
use crate::mailbox::Mailbox;
use alloc::{collections::VecDeque, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use hashbrown::HashMap;
use hmac::{Hmac, Mac};
use quic_core::{
    connection::{id::MAX_LEN as CONNECTION_ID_MAX_LEN, ConnectionId},
    recovery::CongestionController,
    stateless_reset::{token::Token, token::LEN as RESET_TOKEN_LEN, MIN_DATAGRAM_LEN_TO_RESET},
    time::Timestamp,
};
use sha2::Sha256;
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

/// The MAC length appended to a Retry token, RFC 9001 §4.9 leaves the token
/// format to the implementation; this one is self-authenticating so the
/// endpoint needs no per-client state to validate it.
const TOKEN_MAC_LEN: usize = 32;
const TOKEN_TIMESTAMP_LEN: usize = 8;

/// Derives the stable per-CID stateless-reset token, RFC 9000 §10.3:
/// `HMAC-SHA-256(reset_key, cid)`, truncated to [`quic_core::stateless_reset::token::LEN`].
pub fn derive_reset_token(reset_key: &[u8], cid: &ConnectionId) -> Token {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(reset_key).expect("HMAC accepts a key of any length");
    mac.update(cid.as_bytes());
    let digest = mac.finalize().into_bytes();
    Token::try_from(&digest[..RESET_TOKEN_LEN])
        .expect("digest truncation is exactly the token length")
}

/// Largest client address this module will bind into a token. A
/// `SocketAddr`'s raw form (IPv6 plus a port) fits comfortably under this;
/// anything longer is treated as untrustworthy rather than truncated.
const MAX_CLIENT_ADDRESS_LEN: usize = 64;

/// Builds a Retry token binding `odcid` (the client's original destination
/// CID), the client's source address, and the time it was issued,
/// authenticated with `reset_key` so the endpoint can validate a token it
/// issued without storing per-client state. `client_address` should be a
/// stable encoding of the datagram's source (e.g. IP and port); a token
/// validated against a different address is rejected, RFC 9001 §8.1.
pub fn issue_retry_token(
    reset_key: &[u8],
    odcid: &ConnectionId,
    client_address: &[u8],
    issued_at: Timestamp,
) -> Vec<u8> {
    let mut token = Vec::with_capacity(
        TOKEN_TIMESTAMP_LEN + 1 + CONNECTION_ID_MAX_LEN + 1 + MAX_CLIENT_ADDRESS_LEN + TOKEN_MAC_LEN,
    );
    let micros = issued_at.as_duration().as_micros() as u64;
    token.extend_from_slice(&micros.to_le_bytes());
    token.push(odcid.len() as u8);
    token.extend_from_slice(odcid.as_bytes());
    token.push(client_address.len() as u8);
    token.extend_from_slice(client_address);

    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(reset_key).expect("HMAC accepts a key of any length");
    mac.update(&token);
    token.extend_from_slice(&mac.finalize().into_bytes());
    token
}

/// Validates a token produced by [`issue_retry_token`], returning the
/// original destination CID if the MAC checks out, the token is no older
/// than `max_age`, and `client_address` matches the address it was issued
/// for.
pub fn validate_retry_token(
    reset_key: &[u8],
    token: &[u8],
    client_address: &[u8],
    now: Timestamp,
    max_age: Duration,
) -> Option<ConnectionId> {
    if token.len() < TOKEN_TIMESTAMP_LEN + 1 + 1 + TOKEN_MAC_LEN {
        return None;
    }
    let (body, mac_bytes) = token.split_at(token.len() - TOKEN_MAC_LEN);
    let mut mac = <HmacSha256 as Mac>::new_from_slice(reset_key).ok()?;
    mac.update(body);
    mac.verify_slice(mac_bytes).ok()?;

    let micros = u64::from_le_bytes(body[..TOKEN_TIMESTAMP_LEN].try_into().ok()?);
    let issued_at = Timestamp::from_duration(Duration::from_micros(micros));
    if now.saturating_duration_since(issued_at) > max_age {
        tracing::debug!("retry token expired");
        return None;
    }

    let odcid_len = body[TOKEN_TIMESTAMP_LEN] as usize;
    let after_odcid = TOKEN_TIMESTAMP_LEN + 1 + odcid_len;
    let odcid_bytes = body.get(TOKEN_TIMESTAMP_LEN + 1..after_odcid)?;

    let address_len = *body.get(after_odcid)? as usize;
    let address_bytes = body.get(after_odcid + 1..after_odcid + 1 + address_len)?;
    if address_bytes != client_address {
        tracing::debug!("retry token presented from a different client address");
        return None;
    }

    ConnectionId::try_from_bytes(odcid_bytes)
}

/// An action a connection asked the endpoint to perform outside of its own
/// task, §5's deferred-update list.
pub enum DeferredUpdate {
    /// A local connection ID has been retired and should stop routing.
    RetireLocalId(ConnectionId),
    /// A connection is gone; every local ID it ever owned should stop
    /// routing.
    ConnectionClosed(Vec<ConnectionId>),
}

/// Routes inbound datagrams by destination CID to a connection's mailbox,
/// derives stateless-reset tokens and Retry tokens, and collects deferred
/// updates connections can't apply to themselves.
pub struct Endpoint<C, I, H, A>
where
    C: CongestionController,
    I: KeyPair,
    H: KeyPair,
    A: OneRttKeyPair,
{
    routes: HashMap<ConnectionId, Mailbox<Connection<C, I, H, A>>>,
    accept_queue: VecDeque<ConnectionId>,
    reset_key: Option<[u8; 32]>,
    deferred: Mutex<Vec<DeferredUpdate>>,
    deferred_dirty: AtomicBool,
}

impl<C, I, H, A> Endpoint<C, I, H, A>
where
    C: CongestionController,
    I: KeyPair,
    H: KeyPair,
    A: OneRttKeyPair,
{
    /// `reset_key` of all zeroes disables stateless reset, matching
    /// [`crate::config::EndpointConfig`]'s convention.
    pub fn new(reset_key: Option<[u8; 32]>) -> Self {
        let reset_key = reset_key.filter(|key| key.iter().any(|&b| b != 0));
        Self {
            routes: HashMap::new(),
            accept_queue: VecDeque::new(),
            reset_key,
            deferred: Mutex::new(Vec::new()),
            deferred_dirty: AtomicBool::new(false),
        }
    }

    pub fn register(&mut self, cid: ConnectionId, mailbox: Mailbox<Connection<C, I, H, A>>) {
        self.routes.insert(cid, mailbox);
    }

    pub fn unregister(&mut self, cid: &ConnectionId) {
        self.routes.remove(cid);
    }

    pub fn route(&self, dcid: &ConnectionId) -> Option<&Mailbox<Connection<C, I, H, A>>> {
        self.routes.get(dcid)
    }

    pub fn routed_len(&self) -> usize {
        self.routes.len()
    }

    pub fn enqueue_accept(&mut self, cid: ConnectionId) {
        self.accept_queue.push_back(cid);
    }

    pub fn accept(&mut self) -> Option<ConnectionId> {
        self.accept_queue.pop_front()
    }

    /// The stateless-reset token this endpoint would issue for `cid`, or
    /// `None` if stateless reset is disabled.
    pub fn reset_token_for(&self, cid: &ConnectionId) -> Option<Token> {
        self.reset_key
            .as_ref()
            .map(|key| derive_reset_token(&key[..], cid))
    }

    /// Checks whether a datagram that failed to decrypt against any known
    /// connection is in fact a stateless reset addressed to `cid`.
    ///
    /// RFC 9000 §10.3.1 lower-bounds the token search on datagram size to
    /// avoid treating a short, clearly-malformed packet as a reset.
    pub fn is_stateless_reset(&self, cid: &ConnectionId, datagram: &[u8]) -> bool {
        let Some(key) = self.reset_key.as_ref() else {
            return false;
        };
        if datagram.len() < MIN_DATAGRAM_LEN_TO_RESET {
            return false;
        }
        let candidate = &datagram[datagram.len() - RESET_TOKEN_LEN..];
        let matched = match Token::try_from(candidate) {
            Ok(found) => found == derive_reset_token(&key[..], cid),
            Err(_) => false,
        };
        if matched {
            tracing::debug!("stateless reset token matched");
        }
        matched
    }

    pub fn issue_retry_token(
        &self,
        odcid: &ConnectionId,
        client_address: &[u8],
        issued_at: Timestamp,
    ) -> Option<Vec<u8>> {
        self.reset_key
            .as_ref()
            .map(|key| issue_retry_token(&key[..], odcid, client_address, issued_at))
    }

    pub fn validate_retry_token(
        &self,
        token: &[u8],
        client_address: &[u8],
        now: Timestamp,
        max_age: Duration,
    ) -> Option<ConnectionId> {
        let key = self.reset_key.as_ref()?;
        validate_retry_token(&key[..], token, client_address, now, max_age)
    }

    /// Queues an action for later processing by whoever owns the endpoint's
    /// main loop; never blocks and never touches `self.routes` directly, so
    /// it can be called from a connection's own task via a shared reference.
    pub fn defer(&self, update: DeferredUpdate) {
        self.deferred
            .lock()
            .expect("deferred-update lock is never held across a panic")
            .push(update);
        self.deferred_dirty.store(true, Ordering::Release);
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred_dirty.load(Ordering::Acquire)
    }

    /// Drains every queued deferred update for processing against
    /// `self.routes`.
    pub fn drain_deferred(&self) -> Vec<DeferredUpdate> {
        let mut guard = self
            .deferred
            .lock()
            .expect("deferred-update lock is never held across a panic");
        self.deferred_dirty.store(false, Ordering::Release);
        core::mem::take(&mut *guard)
    }

    /// Applies every queued deferred update to `self.routes`, unregistering
    /// whatever local IDs they name.
    pub fn apply_deferred(&mut self) {
        for update in self.drain_deferred() {
            match update {
                DeferredUpdate::RetireLocalId(cid) => {
                    self.unregister(&cid);
                }
                DeferredUpdate::ConnectionClosed(cids) => {
                    for cid in cids {
                        self.unregister(&cid);
                    }
                }
            }
        }
    }
}
