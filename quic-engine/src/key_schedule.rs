// SPDX-License-Identifier: Apache-2.0

//! Key-slot and key-phase bookkeeping, RFC 9001 §4 / §6 and RFC 9000 §17.2.
//!
//! The AEAD primitives and the TLS handshake itself are external to this
//! crate; `KeyPair`/`OneRttKeyPair` are the seam a concrete crypto provider
//! plugs into.

use quic_core::packet_number::PacketNumber;

/// A connection-ID-scoped, unprotect/protect-capable key pair. Encryption
/// and decryption themselves are the TLS/AEAD layer's job; this crate only
/// needs the AEAD's usage limits to enforce RFC 9001 §6.6.
pub trait KeyPair: Send {
    /// Maximum packets this key may encrypt before a key update is required.
    fn aead_confidentiality_limit(&self) -> u64;
    /// Maximum decryption failures tolerated before `AEAD_LIMIT_REACHED`.
    fn aead_integrity_limit(&self) -> u64;
}

/// A 1-RTT key pair, additionally able to derive the next phase's keys.
pub trait OneRttKeyPair: KeyPair + Sized {
    fn derive_next_key(&self) -> Self;
}

/// The two alternating key phases used by 1-RTT packets, RFC 9001 §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPhase {
    Zero,
    One,
}

impl KeyPhase {
    pub fn flipped(self) -> Self {
        match self {
            KeyPhase::Zero => KeyPhase::One,
            KeyPhase::One => KeyPhase::Zero,
        }
    }
}

/// Which of an [`ApplicationKeySchedule`]'s keys a caller should try to
/// unprotect an inbound 1-RTT packet with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundKeySelection {
    Current,
    Previous,
    Next,
}

/// The updating Application-space key pair, tracking the current phase, a
/// briefly-retained previous-phase read key, and a lazily-derived next-phase
/// key candidate.
pub struct ApplicationKeySchedule<K: OneRttKeyPair> {
    phase: KeyPhase,
    current: K,
    previous: Option<K>,
    next: Option<K>,
    /// The packet number of the first packet authenticated in `phase`.
    confirmed_pn: Option<PacketNumber>,
    integrity_failures: u64,
}

impl<K: OneRttKeyPair> ApplicationKeySchedule<K> {
    pub fn new(initial: K) -> Self {
        Self {
            phase: KeyPhase::Zero,
            current: initial,
            previous: None,
            next: None,
            confirmed_pn: None,
            integrity_failures: 0,
        }
    }

    pub fn phase(&self) -> KeyPhase {
        self.phase
    }

    pub fn integrity_failures(&self) -> u64 {
        self.integrity_failures
    }

    pub fn is_integrity_limit_reached(&self) -> bool {
        self.integrity_failures >= self.current.aead_integrity_limit()
    }

    /// Picks which key an inbound packet carrying `incoming_phase` at
    /// sequence `pn` should be unprotected with. Lazily derives the
    /// next-phase key candidate the first time one is needed.
    pub fn key_for_inbound(&mut self, pn: PacketNumber, incoming_phase: KeyPhase) -> InboundKeySelection {
        if incoming_phase == self.phase {
            return InboundKeySelection::Current;
        }

        if let (Some(confirmed), Some(_)) = (self.confirmed_pn, &self.previous) {
            if pn < confirmed {
                return InboundKeySelection::Previous;
            }
        }

        if self.next.is_none() {
            self.next = Some(self.current.derive_next_key());
        }
        InboundKeySelection::Next
    }

    /// Returns the key named by a prior [`ApplicationKeySchedule::key_for_inbound`]
    /// call, or `None` if that slot is unpopulated (e.g. `Previous` before
    /// any update has ever happened).
    pub fn key(&self, selection: InboundKeySelection) -> Option<&K> {
        match selection {
            InboundKeySelection::Current => Some(&self.current),
            InboundKeySelection::Previous => self.previous.as_ref(),
            InboundKeySelection::Next => self.next.as_ref(),
        }
    }

    /// Reports whether unprotecting with the key named by `selection`
    /// authenticated. A successful `Next` unprotect finalizes the key
    /// update: `next` becomes `current`, the old `current` becomes
    /// `previous`, and the phase flips.
    pub fn on_inbound_result(&mut self, pn: PacketNumber, selection: InboundKeySelection, ok: bool) {
        if !ok {
            self.integrity_failures += 1;
            return;
        }

        match selection {
            InboundKeySelection::Current => {
                if self.confirmed_pn.map_or(true, |c| pn > c) {
                    self.confirmed_pn = Some(pn);
                }
            }
            InboundKeySelection::Previous => {}
            InboundKeySelection::Next => {
                let next = self
                    .next
                    .take()
                    .expect("Next selection implies a derived key exists");
                let old_current = core::mem::replace(&mut self.current, next);
                self.previous = Some(old_current);
                self.phase = self.phase.flipped();
                self.confirmed_pn = Some(pn);
            }
        }
    }

    /// Drops the retained previous-phase read key once a newer-numbered
    /// packet in the current phase has been observed.
    pub fn maybe_drop_previous(&mut self, newest_current_phase_pn: PacketNumber) {
        if let Some(confirmed) = self.confirmed_pn {
            if newest_current_phase_pn > confirmed {
                self.previous = None;
            }
        }
    }
}

/// The three key slots for one connection: Initial and Handshake are fixed
/// once installed, Application updates over time via [`ApplicationKeySchedule`].
pub struct KeySchedule<I, H, A: OneRttKeyPair> {
    initial: Option<I>,
    handshake: Option<H>,
    application: Option<ApplicationKeySchedule<A>>,
}

impl<I: KeyPair, H: KeyPair, A: OneRttKeyPair> Default for KeySchedule<I, H, A> {
    fn default() -> Self {
        Self {
            initial: None,
            handshake: None,
            application: None,
        }
    }
}

impl<I: KeyPair, H: KeyPair, A: OneRttKeyPair> KeySchedule<I, H, A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_initial(&mut self, keys: I) {
        self.initial = Some(keys);
    }

    pub fn install_handshake(&mut self, keys: H) {
        self.handshake = Some(keys);
    }

    pub fn install_application(&mut self, keys: A) {
        self.application = Some(ApplicationKeySchedule::new(keys));
    }

    /// Discarded by the server on receiving, and the client on sending, the
    /// first Handshake-space packet.
    pub fn discard_initial(&mut self) {
        self.initial = None;
    }

    /// Discarded by the server after sending, and the client after
    /// receiving, `HANDSHAKE_DONE`.
    pub fn discard_handshake(&mut self) {
        self.handshake = None;
    }

    pub fn initial(&self) -> Option<&I> {
        self.initial.as_ref()
    }

    pub fn handshake(&self) -> Option<&H> {
        self.handshake.as_ref()
    }

    pub fn application(&mut self) -> Option<&mut ApplicationKeySchedule<A>> {
        self.application.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct TestKey {
        generation: u32,
    }

    impl KeyPair for TestKey {
        fn aead_confidentiality_limit(&self) -> u64 {
            u64::MAX
        }
        fn aead_integrity_limit(&self) -> u64 {
            3
        }
    }

    impl OneRttKeyPair for TestKey {
        fn derive_next_key(&self) -> Self {
            TestKey {
                generation: self.generation + 1,
            }
        }
    }

    fn pn(v: i64) -> PacketNumber {
        PacketNumber::new(v)
    }

    #[test]
    fn matching_phase_selects_current() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        assert_eq!(
            app.key_for_inbound(pn(0), KeyPhase::Zero),
            InboundKeySelection::Current
        );
    }

    #[test]
    fn opposite_phase_before_any_update_is_a_candidate_update() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        assert_eq!(
            app.key_for_inbound(pn(0), KeyPhase::One),
            InboundKeySelection::Next
        );
        assert_eq!(app.key(InboundKeySelection::Next).unwrap().generation, 1);
    }

    #[test]
    fn successful_next_key_finalizes_the_update() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        let sel = app.key_for_inbound(pn(5), KeyPhase::One);
        app.on_inbound_result(pn(5), sel, true);

        assert_eq!(app.phase(), KeyPhase::One);
        assert_eq!(app.key(InboundKeySelection::Current).unwrap().generation, 1);
        assert_eq!(app.key(InboundKeySelection::Previous).unwrap().generation, 0);
    }

    #[test]
    fn failed_next_key_does_not_update_and_counts_as_integrity_failure() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        let sel = app.key_for_inbound(pn(5), KeyPhase::One);
        app.on_inbound_result(pn(5), sel, false);

        assert_eq!(app.phase(), KeyPhase::Zero);
        assert_eq!(app.integrity_failures(), 1);
    }

    #[test]
    fn earlier_numbered_packet_in_old_phase_uses_previous_key() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        let sel = app.key_for_inbound(pn(10), KeyPhase::One);
        app.on_inbound_result(pn(10), sel, true);

        // a reordered packet numbered below the one that confirmed the
        // update, still carrying the old phase bit
        let sel = app.key_for_inbound(pn(3), KeyPhase::Zero);
        assert_eq!(sel, InboundKeySelection::Previous);
    }

    #[test]
    fn previous_key_is_dropped_once_a_newer_current_phase_packet_arrives() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        let sel = app.key_for_inbound(pn(10), KeyPhase::One);
        app.on_inbound_result(pn(10), sel, true);
        assert!(app.key(InboundKeySelection::Previous).is_some());

        app.maybe_drop_previous(pn(11));
        assert!(app.key(InboundKeySelection::Previous).is_none());
    }

    #[test]
    fn integrity_limit_reached_after_enough_failures() {
        let mut app = ApplicationKeySchedule::new(TestKey { generation: 0 });
        for _ in 0..3 {
            let sel = app.key_for_inbound(pn(1), KeyPhase::One);
            app.on_inbound_result(pn(1), sel, false);
        }
        assert!(app.is_integrity_limit_reached());
    }

    #[test]
    fn key_schedule_tracks_all_three_slots_independently() {
        let mut schedule: KeySchedule<TestKey, TestKey, TestKey> = KeySchedule::new();
        schedule.install_initial(TestKey { generation: 0 });
        schedule.install_handshake(TestKey { generation: 0 });
        schedule.install_application(TestKey { generation: 0 });

        assert!(schedule.initial().is_some());
        schedule.discard_initial();
        assert!(schedule.initial().is_none());
        assert!(schedule.handshake().is_some());
        assert!(schedule.application().is_some());
    }
}
