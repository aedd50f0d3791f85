// SPDX-License-Identifier: Apache-2.0

//! Connection-ID issuance, retirement, and validation, RFC 9000 §5.1 and
//! §19.15/§19.16.

use quic_core::{
    connection::{id::ConnectionId, TransportError},
    stateless_reset::token::Token,
};
use rand::RngCore;

/// The number of additional local CIDs proactively issued once the peer's
/// `active_connection_id_limit` is known, capped regardless of how high the
/// peer's limit is.
const PROACTIVE_ISSUANCE_CAP: u64 = 2;

/// Generates a random locally-issued connection ID, also used by a client
/// to pick the destination CID of its first Initial.
pub fn random_connection_id(rng: &mut dyn RngCore) -> ConnectionId {
    let mut bytes = [0u8; quic_core::connection::id::LOCAL_LEN];
    rng.fill_bytes(&mut bytes);
    ConnectionId::try_from_bytes(&bytes).expect("LOCAL_LEN is within MAX_LEN")
}

/// A CID this endpoint has issued to its peer. `sequence == -1` marks the
/// transient entry used before the handshake establishes a stable CID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalEntry {
    pub sequence: i64,
    pub id: ConnectionId,
    pub retired: bool,
}

/// Tracks the CIDs this endpoint has issued (`local[]` in the number-space
/// agnostic connection-ID state).
#[derive(Debug, Default)]
pub struct LocalIdRegistry {
    entries: Vec<LocalEntry>,
    next_sequence: u64,
    peer_active_connection_id_limit: Option<u64>,
}

impl LocalIdRegistry {
    /// A client starts with a single random 8-byte CID at sequence 0.
    pub fn new_client(rng: &mut dyn RngCore) -> Self {
        Self {
            entries: vec![LocalEntry {
                sequence: 0,
                id: random_connection_id(rng),
                retired: false,
            }],
            next_sequence: 1,
            peer_active_connection_id_limit: None,
        }
    }

    /// A server starts with the client-chosen transient DCID (sequence -1)
    /// plus a fresh random CID at sequence 0.
    pub fn new_server(transient_dcid: ConnectionId, rng: &mut dyn RngCore) -> Self {
        Self {
            entries: vec![
                LocalEntry {
                    sequence: -1,
                    id: transient_dcid,
                    retired: false,
                },
                LocalEntry {
                    sequence: 0,
                    id: random_connection_id(rng),
                    retired: false,
                },
            ],
            next_sequence: 1,
            peer_active_connection_id_limit: None,
        }
    }

    /// `true` if this endpoint's currently-active CID is zero-length (used
    /// by the remote registry to reject incoming `NEW_CONNECTION_ID` frames
    /// per RFC 9000 §5.1.1).
    pub fn uses_zero_length_cids(&self) -> bool {
        self.entries.iter().any(|e| e.id.is_empty())
    }

    /// Retires the transient (sequence -1) entry; called by a server on its
    /// first Handshake-space packet receipt.
    pub fn retire_transient(&mut self) {
        for e in &mut self.entries {
            if e.sequence == -1 {
                e.retired = true;
            }
        }
    }

    /// Called once the peer's `active_connection_id_limit` transport
    /// parameter is known; issues additional CIDs up to
    /// `min(limit, PROACTIVE_ISSUANCE_CAP)`, returning the newly issued
    /// `(sequence, id)` pairs so the caller can emit `NEW_CONNECTION_ID`
    /// frames for them.
    pub fn on_peer_active_connection_id_limit(
        &mut self,
        limit: u64,
        rng: &mut dyn RngCore,
    ) -> Vec<(u64, ConnectionId)> {
        self.peer_active_connection_id_limit = Some(limit);

        let want = limit.min(PROACTIVE_ISSUANCE_CAP);
        let active = self.entries.iter().filter(|e| !e.retired).count() as u64;

        let mut issued = Vec::new();
        while active + issued.len() as u64 < want {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            let id = random_connection_id(rng);
            self.entries.push(LocalEntry {
                sequence: sequence as i64,
                id,
                retired: false,
            });
            issued.push((sequence, id));
        }
        issued
    }

    /// Applies a `RETIRE_CONNECTION_ID` frame from the peer naming
    /// `sequence`. A sequence we never issued is a protocol violation.
    pub fn on_retire_connection_id(&mut self, sequence: u64) -> Result<(), TransportError> {
        if sequence >= self.next_sequence {
            return Err(TransportError::PROTOCOL_VIOLATION);
        }
        if let Some(e) = self
            .entries
            .iter_mut()
            .find(|e| e.sequence == sequence as i64)
        {
            e.retired = true;
        }
        Ok(())
    }
}

/// A CID received from the peer. `sequence == -1` marks the transient entry
/// formed from the first Initial's source CID before the real one arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    pub sequence: i64,
    pub id: ConnectionId,
    pub reset_token: Option<Token>,
    pub retired: bool,
}

/// Tracks the CIDs the peer has handed us (`remote[]`), including the
/// `active_connection_id_limit` *we* advertised to them.
#[derive(Debug)]
pub struct RemoteIdRegistry {
    entries: Vec<RemoteEntry>,
    retire_prior_to: u64,
    our_active_connection_id_limit: u64,
}

impl RemoteIdRegistry {
    /// A client's transient remote entry is the destination CID of its
    /// first Initial (a random 8-byte value it chose itself).
    pub fn new_client_transient(dcid: ConnectionId, our_active_connection_id_limit: u64) -> Self {
        Self {
            entries: vec![RemoteEntry {
                sequence: -1,
                id: dcid,
                reset_token: None,
                retired: false,
            }],
            retire_prior_to: 0,
            our_active_connection_id_limit,
        }
    }

    /// A server has no remote CID until the client's first Initial arrives.
    pub fn new_server(our_active_connection_id_limit: u64) -> Self {
        Self {
            entries: Vec::new(),
            retire_prior_to: 0,
            our_active_connection_id_limit,
        }
    }

    /// A client replaces its transient remote entry with the server's real
    /// source CID upon receiving the server's first Initial.
    pub fn on_first_server_initial(&mut self, source_cid: ConnectionId) {
        self.entries.retain(|e| e.sequence != -1);
        self.entries.insert(
            0,
            RemoteEntry {
                sequence: 0,
                id: source_cid,
                reset_token: None,
                retired: false,
            },
        );
    }

    /// Validates then applies a `NEW_CONNECTION_ID` frame as a single
    /// transaction: a rejected frame leaves the registry untouched.
    pub fn on_new_connection_id(
        &mut self,
        we_use_zero_length_cids: bool,
        sequence: u64,
        retire_prior_to: u64,
        id: ConnectionId,
        reset_token: Token,
    ) -> Result<(), TransportError> {
        if we_use_zero_length_cids {
            return Err(TransportError::PROTOCOL_VIOLATION);
        }

        let already_known = self
            .entries
            .iter()
            .find(|e| e.sequence == sequence as i64);
        if let Some(existing) = already_known {
            if existing.id != id {
                return Err(TransportError::PROTOCOL_VIOLATION);
            }
        }

        let effective_retire_prior_to = retire_prior_to.max(self.retire_prior_to);
        let is_new = already_known.is_none();

        let active_after = self
            .entries
            .iter()
            .filter(|e| e.sequence >= 0 && e.sequence as u64 >= effective_retire_prior_to)
            .count() as u64
            + u64::from(is_new && sequence >= effective_retire_prior_to);
        if active_after > self.our_active_connection_id_limit {
            return Err(TransportError::CONNECTION_ID_LIMIT_ERROR);
        }

        let retained_after = self.entries.len() as u64 + u64::from(is_new);
        if retained_after > 4 * self.our_active_connection_id_limit {
            return Err(TransportError::CONNECTION_ID_LIMIT_ERROR);
        }

        self.retire_prior_to = effective_retire_prior_to;
        self.entries
            .retain(|e| e.sequence < 0 || e.sequence as u64 >= self.retire_prior_to);

        if is_new {
            self.entries.push(RemoteEntry {
                sequence: sequence as i64,
                id,
                reset_token: Some(reset_token),
                retired: false,
            });
        }

        Ok(())
    }

    pub fn active_len(&self) -> usize {
        self.entries.iter().filter(|e| !e.retired).count()
    }
}
