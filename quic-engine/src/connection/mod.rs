// SPDX-License-Identifier: Apache-2.0

//! Per-connection state: the three packet number spaces, the loss detector,
//! the key schedule, the connection-ID registries, and the connection
//! lifetime (RFC 9000 §10), all owned exclusively by one cooperative task
//! per §5.
//!
//! Parsing datagrams into authenticated packets and frames, and serializing
//! outbound packets, are external contracts (the TLS/AEAD layer and the
//! wire codecs) that this crate does not implement; callers feed already-
//! authenticated packet metadata in via [`Connection::on_packet_authenticated`]
//! and drain already-built [`quic_core::recovery::SentPacketInfo`] records
//! out via [`Connection::on_packet_sent`]. [`event_loop`] binds this state
//! to the mailbox-driven task described in §5.

pub mod event_loop;

use crate::{
    connection_id::{random_connection_id, LocalIdRegistry, RemoteIdRegistry},
    key_schedule::{KeyPair, KeySchedule, OneRttKeyPair},
    space::{Space, Unowned},
};
use alloc::vec::Vec;
use core::time::Duration;
use quic_core::{
    connection::{ConnectionId, Error, TransportError},
    packet_number::{PacketNumber, PacketNumberSpace},
    recovery::{CongestionController, LossDetector, SentPacketInfo},
    time::Timestamp,
};
use rand::RngCore;

/// Which end of the handshake this connection is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The connection lifetime state machine, RFC 9000 §10.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifetimeState {
    New,
    Handshaking,
    Established,
    /// A local transport or application error has been recorded; a
    /// `CONNECTION_CLOSE` is owed on the wire before draining can start.
    Closing,
    /// Only close frames may be sent (in response to further inbound
    /// packets) until [`Connection::drain_end_time`] elapses.
    Draining,
    Done,
}

/// One connection's complete per-task state.
pub struct Connection<C, I, H, A>
where
    C: CongestionController,
    I: KeyPair,
    H: KeyPair,
    A: OneRttKeyPair,
{
    role: Role,
    state: LifetimeState,
    spaces: [Space; 3],
    loss: LossDetector<C>,
    keys: KeySchedule<I, H, A>,
    local_ids: LocalIdRegistry,
    remote_ids: RemoteIdRegistry,
    max_ack_delay: Duration,
    max_idle_timeout: Duration,
    handshake_deadline: Timestamp,
    idle_deadline: Option<Timestamp>,
    drain_end_time: Option<Timestamp>,
    final_err: Option<Error>,
    /// The wire-level code to send in `CONNECTION_CLOSE` while `Closing`;
    /// `None` for a peer-initiated or stateless-reset drain, which send
    /// nothing.
    local_close_reason: Option<TransportError>,
    first_handshake_rx: bool,
}

impl<C: CongestionController, I: KeyPair, H: KeyPair, A: OneRttKeyPair> Connection<C, I, H, A> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        role: Role,
        now: Timestamp,
        cc: C,
        max_ack_delay: Duration,
        max_idle_timeout: Duration,
        handshake_timeout: Duration,
        local_ids: LocalIdRegistry,
        remote_ids: RemoteIdRegistry,
    ) -> Self {
        Self {
            role,
            state: LifetimeState::New,
            spaces: [
                Space::new(PacketNumberSpace::Initial, max_ack_delay),
                Space::new(PacketNumberSpace::Handshake, max_ack_delay),
                Space::new(PacketNumberSpace::ApplicationData, max_ack_delay),
            ],
            loss: LossDetector::new(now, cc, max_ack_delay, role == Role::Server),
            keys: KeySchedule::new(),
            local_ids,
            remote_ids,
            max_ack_delay,
            max_idle_timeout,
            handshake_deadline: now
                .checked_add(handshake_timeout)
                .unwrap_or(now),
            idle_deadline: now.checked_add(max_idle_timeout),
            drain_end_time: None,
            final_err: None,
            local_close_reason: None,
            first_handshake_rx: false,
        }
    }

    /// A client picks its own transient destination CID (the DCID of its
    /// first Initial) and starts with a single local CID.
    #[allow(clippy::too_many_arguments)]
    pub fn new_client(
        now: Timestamp,
        cc: C,
        max_ack_delay: Duration,
        max_idle_timeout: Duration,
        handshake_timeout: Duration,
        our_active_connection_id_limit: u64,
        rng: &mut dyn RngCore,
    ) -> Self {
        let local_ids = LocalIdRegistry::new_client(rng);
        let transient_dcid = random_connection_id(rng);
        let remote_ids =
            RemoteIdRegistry::new_client_transient(transient_dcid, our_active_connection_id_limit);
        Self::new(
            Role::Client,
            now,
            cc,
            max_ack_delay,
            max_idle_timeout,
            handshake_timeout,
            local_ids,
            remote_ids,
        )
    }

    /// A server starts from the client-chosen transient DCID observed on
    /// the first Initial and has no remote CID yet.
    #[allow(clippy::too_many_arguments)]
    pub fn new_server(
        now: Timestamp,
        cc: C,
        max_ack_delay: Duration,
        max_idle_timeout: Duration,
        handshake_timeout: Duration,
        our_active_connection_id_limit: u64,
        client_transient_dcid: ConnectionId,
        rng: &mut dyn RngCore,
    ) -> Self {
        let local_ids = LocalIdRegistry::new_server(client_transient_dcid, rng);
        let remote_ids = RemoteIdRegistry::new_server(our_active_connection_id_limit);
        Self::new(
            Role::Server,
            now,
            cc,
            max_ack_delay,
            max_idle_timeout,
            handshake_timeout,
            local_ids,
            remote_ids,
        )
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LifetimeState {
        self.state
    }

    pub fn final_err(&self) -> Option<Error> {
        self.final_err
    }

    pub fn local_close_reason(&self) -> Option<TransportError> {
        self.local_close_reason
    }

    pub fn space(&self, space: PacketNumberSpace) -> &Space {
        &self.spaces[space as usize]
    }

    pub fn space_mut(&mut self, space: PacketNumberSpace) -> &mut Space {
        &mut self.spaces[space as usize]
    }

    pub fn loss(&self) -> &LossDetector<C> {
        &self.loss
    }

    pub fn keys_mut(&mut self) -> &mut KeySchedule<I, H, A> {
        &mut self.keys
    }

    pub fn local_ids(&self) -> &LocalIdRegistry {
        &self.local_ids
    }

    pub fn local_ids_mut(&mut self) -> &mut LocalIdRegistry {
        &mut self.local_ids
    }

    pub fn remote_ids(&self) -> &RemoteIdRegistry {
        &self.remote_ids
    }

    pub fn remote_ids_mut(&mut self) -> &mut RemoteIdRegistry {
        &mut self.remote_ids
    }

    fn restart_idle_timer(&mut self, now: Timestamp) {
        self.idle_deadline = now.checked_add(self.max_idle_timeout);
    }

    /// RFC 9000 §10.2: `3 * PTO`, estimated from the current RTT sample
    /// rather than the loss detector's internal (private) PTO-with-backoff
    /// timer, since draining duration is fixed once entered.
    fn drain_duration(&self) -> Duration {
        (self.loss.rtt().pto_base_duration() + self.max_ack_delay) * 3
    }

    /// Records receipt of a datagram from the peer: credits anti-
    /// amplification and restarts the idle timer. A no-op while draining,
    /// per §4.10 ("if draining, drop").
    pub fn on_datagram_received(&mut self, now: Timestamp, bytes: usize) {
        if self.state == LifetimeState::Draining {
            return;
        }
        self.loss.on_datagram_received(bytes);
        self.restart_idle_timer(now);
    }

    /// Records an authenticated packet: restarts the idle timer, advances
    /// the handshake (a server discards Initial keys and retires its
    /// transient local CID on the first Handshake-space packet), and feeds
    /// any CRYPTO frames it carried to that space's reassembler.
    pub fn on_packet_authenticated(
        &mut self,
        now: Timestamp,
        space: PacketNumberSpace,
        pn: PacketNumber,
        ack_eliciting: bool,
        crypto_frames: &[(u64, &[u8])],
    ) -> Result<Vec<u8>, TransportError> {
        self.restart_idle_timer(now);

        if self.state == LifetimeState::New {
            self.state = LifetimeState::Handshaking;
        }

        if space == PacketNumberSpace::Handshake
            && self.role == Role::Server
            && !self.first_handshake_rx
        {
            self.first_handshake_rx = true;
            self.keys.discard_initial();
            self.local_ids.retire_transient();
            self.loss.on_address_validated();
        }

        self.spaces[space as usize].on_packet_received(now, pn, ack_eliciting, crypto_frames)
    }

    /// Records a packet the transmit pipeline just sent: feeds the loss
    /// detector and restarts the idle timer for ack-eliciting packets,
    /// RFC 9000 §10.1.
    pub fn on_packet_sent(&mut self, now: Timestamp, space: PacketNumberSpace, info: SentPacketInfo) {
        let ack_eliciting = info.ack_eliciting;
        self.loss.on_packet_sent(space, now, info);
        if ack_eliciting {
            self.restart_idle_timer(now);
        }
    }

    /// Signals that the (externally driven) TLS handshake has confirmed:
    /// Application-space keys are live and trusted, and PTO computation may
    /// stop considering the Initial/Handshake spaces, RFC 9002 §6.2.1.
    pub fn on_handshake_confirmed(&mut self, now: Timestamp) {
        self.state = LifetimeState::Established;
        self.loss.on_handshake_confirmed();
        tracing::debug!(role = ?self.role, "handshake confirmed");
        let _ = now;
    }

    /// Applies newly-acknowledged packet numbers in `space`, replaying each
    /// one's frame digest into the owning state and returning anything the
    /// caller (the connection's stream/flow-control layer) needs to act on.
    pub fn on_ack_received(
        &mut self,
        now: Timestamp,
        space: PacketNumberSpace,
        largest_acked: PacketNumber,
        newly_acked: &[PacketNumber],
        ack_delay: Duration,
    ) -> Vec<Unowned> {
        let outcome = self
            .loss
            .on_ack_received(space, now, largest_acked, newly_acked, ack_delay);
        self.spaces[space as usize].ack_mut().handle_ack(largest_acked);

        let mut items: Vec<(PacketNumberSpace, PacketNumber, bool)> = outcome
            .newly_acked
            .iter()
            .map(|&pn| (space, pn, false))
            .collect();
        items.extend(outcome.newly_lost.iter().map(|&(s, pn)| (s, pn, true)));
        self.replay(&items)
    }

    fn replay(&mut self, items: &[(PacketNumberSpace, PacketNumber, bool)]) -> Vec<Unowned> {
        let mut unowned = Vec::new();
        for &(space, pn, lost) in items {
            if let Some(info) = self.loss.ring(space).get(pn) {
                let digest = info.digest.clone();
                unowned.extend(self.spaces[space as usize].apply_digest(&digest, lost));
            }
        }
        unowned
    }

    fn enter_draining(&mut self, now: Timestamp, err: Error, duration: Duration) {
        if matches!(self.state, LifetimeState::Draining | LifetimeState::Done) {
            return;
        }
        self.final_err = Some(err);
        self.state = LifetimeState::Draining;
        self.drain_end_time = now.checked_add(duration);
    }

    /// A local transport error was discovered while processing a packet or
    /// updating state: moves to `Closing`, owing a `CONNECTION_CLOSE`.
    pub fn close_locally(&mut self, err: TransportError) {
        if matches!(
            self.state,
            LifetimeState::Closing | LifetimeState::Draining | LifetimeState::Done
        ) {
            return;
        }
        self.local_close_reason = Some(err);
        self.final_err = Some(Error::LocalTransport(err));
        self.state = LifetimeState::Closing;
        tracing::debug!(code = err.code, reason = err.reason, "closing locally");
    }

    /// The transmit pipeline has put the `CONNECTION_CLOSE` frame on the
    /// wire: starts the `3 * PTO` drain, RFC 9000 §10.2.
    pub fn mark_close_sent(&mut self, now: Timestamp) {
        if self.state != LifetimeState::Closing {
            return;
        }
        let duration = self.drain_duration();
        self.state = LifetimeState::Draining;
        self.drain_end_time = now.checked_add(duration);
        tracing::debug!(?duration, "close sent, draining");
    }

    /// A `CONNECTION_CLOSE` arrived from the peer: moves directly into
    /// draining without anything further being sent.
    pub fn on_remote_close(&mut self, now: Timestamp, err: Error) {
        let duration = self.drain_duration();
        tracing::debug!(?duration, "peer closed, draining");
        self.enter_draining(now, err, duration);
    }

    /// A datagram's trailing 16 bytes matched a known stateless-reset
    /// token: the connection is gone immediately.
    pub fn on_stateless_reset(&mut self, now: Timestamp) {
        tracing::debug!("stateless reset observed");
        self.enter_draining(now, Error::StatelessReset, Duration::ZERO);
    }

    /// Lifts the anti-amplification limit. Called internally on a server's
    /// first authenticated Handshake-space packet, and expected to be
    /// called by the endpoint on a successful Retry-token validation, RFC
    /// 9000 §8.1.
    pub fn on_address_validated(&mut self) {
        self.loss.on_address_validated();
    }

    /// Advances time: expires the handshake/idle timers, re-runs loss
    /// detection, and expires draining. Returns anything newly lost that
    /// the caller must act on (e.g. resend).
    pub fn advance_time(&mut self, now: Timestamp) -> Vec<Unowned> {
        match self.state {
            LifetimeState::Done => return Vec::new(),
            LifetimeState::Draining => {
                if matches!(self.drain_end_time, Some(t) if now >= t) {
                    self.state = LifetimeState::Done;
                }
                return Vec::new();
            }
            LifetimeState::Closing => {
                let newly_lost = self.loss.advance(now);
                let items: Vec<_> = newly_lost.into_iter().map(|(s, pn)| (s, pn, true)).collect();
                return self.replay(&items);
            }
            _ => {}
        }

        if self.state != LifetimeState::Established && now >= self.handshake_deadline {
            self.local_close_reason = Some(TransportError::CONNECTION_REFUSED);
            self.final_err = Some(Error::HandshakeTimeout);
            // RFC 9000 §10: a handshake/idle timeout silently discards
            // state; nothing further is sent, so there is no drain period.
            self.state = LifetimeState::Done;
            tracing::debug!("handshake timed out");
            return Vec::new();
        }

        if matches!(self.idle_deadline, Some(t) if now >= t) {
            self.final_err = Some(Error::IdleTimeout);
            self.state = LifetimeState::Done;
            tracing::debug!("idle timeout");
            return Vec::new();
        }

        let newly_lost = self.loss.advance(now);
        let items: Vec<_> = newly_lost.into_iter().map(|(s, pn)| (s, pn, true)).collect();
        self.replay(&items)
    }

    /// `nextTimeout` per §4.10 step 2: the earliest of the caller's own
    /// send-retry deadline, the idle timer, the loss detector's timer, the
    /// Application-space ACK deadline, and (pre-handshake) the handshake
    /// deadline. While draining, only `drainEndTime` matters.
    pub fn next_timeout(&self, send_timeout: Option<Timestamp>) -> Option<Timestamp> {
        if self.state == LifetimeState::Draining {
            return self.drain_end_time;
        }
        if self.state == LifetimeState::Done {
            return None;
        }

        let handshake_timeout = (self.state != LifetimeState::Established)
            .then_some(self.handshake_deadline);
        let app_ack = self.spaces[PacketNumberSpace::ApplicationData as usize]
            .ack()
            .next_ack_deadline();

        [
            send_timeout,
            self.idle_deadline,
            self.loss.timer(),
            app_ack,
            handshake_timeout,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}
