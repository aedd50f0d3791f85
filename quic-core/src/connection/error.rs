// SPDX-License-Identifier: Apache-2.0

//! The transport and application error taxonomies, RFC 9000 §20.

use core::fmt;

/// A transport-layer error code, optionally naming the frame type that
/// triggered it, plus a human-readable (non-wire) reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TransportError {
    pub code: u64,
    pub frame_type: Option<u64>,
    pub reason: &'static str,
}

impl TransportError {
    pub const fn new(code: u64, reason: &'static str) -> Self {
        Self {
            code,
            frame_type: None,
            reason,
        }
    }

    pub const fn with_frame_type(mut self, frame_type: u64) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "TransportError({:#x})", self.code)
        } else {
            f.write_str(self.reason)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

macro_rules! def_error {
    ($doc:expr, $name:ident, $code:expr) => {
        impl TransportError {
            #[doc = $doc]
            pub const $name: TransportError = TransportError::new($code, stringify!($name));
        }
    };
}

def_error!(
    "The connection is being closed abruptly in the absence of any error.",
    NO_ERROR,
    0x00
);
def_error!(
    "The endpoint encountered an internal error and cannot continue with the connection.",
    INTERNAL_ERROR,
    0x01
);
def_error!(
    "The server refused to accept a new connection.",
    CONNECTION_REFUSED,
    0x02
);
def_error!(
    "An endpoint received more data than permitted under its advertised flow control limits.",
    FLOW_CONTROL_ERROR,
    0x03
);
def_error!(
    "An endpoint received a frame for a stream identifier exceeding its advertised limit.",
    STREAM_LIMIT_ERROR,
    0x04
);
def_error!(
    "An endpoint received a frame for a stream that was not in a permitted state.",
    STREAM_STATE_ERROR,
    0x05
);
def_error!(
    "An endpoint received a STREAM frame containing data that exceeded the previously \
     established final size.",
    FINAL_SIZE_ERROR,
    0x06
);
def_error!(
    "An endpoint received a frame that was badly formatted.",
    FRAME_ENCODING_ERROR,
    0x07
);
def_error!(
    "An endpoint received transport parameters that were badly formatted, included an invalid \
     value, was absent although required, or is otherwise in error.",
    TRANSPORT_PARAMETER_ERROR,
    0x08
);
def_error!(
    "An endpoint detected more connection IDs than it permitted its peer to retain.",
    CONNECTION_ID_LIMIT_ERROR,
    0x09
);
def_error!(
    "An endpoint detected a violation of generic protocol rules.",
    PROTOCOL_VIOLATION,
    0x0a
);
def_error!(
    "A server received a client Initial that contained an invalid Retry token.",
    INVALID_TOKEN,
    0x0b
);
def_error!(
    "The application or application protocol caused the connection to be closed.",
    APPLICATION_ERROR,
    0x0c
);
def_error!(
    "An endpoint has received more data in CRYPTO frames than it can buffer.",
    CRYPTO_BUFFER_EXCEEDED,
    0x0d
);
def_error!(
    "An endpoint detected errors in performing key updates.",
    KEY_UPDATE_ERROR,
    0x0e
);
def_error!(
    "An endpoint has reached the confidentiality or integrity limit for the AEAD algorithm \
     used by the given connection.",
    AEAD_LIMIT_REACHED,
    0x0f
);
def_error!(
    "The requested operation cannot be completed in the absence of a viable network path.",
    NO_VIABLE_PATH,
    0x10
);

impl TransportError {
    /// Constructs a `CRYPTO_ERROR` transport error from a TLS alert level
    /// (RFC 9000 §20, codes 0x100-0x1ff).
    pub const fn crypto_error(tls_alert: u8) -> Self {
        TransportError::new(0x100 + tls_alert as u64, "CRYPTO_ERROR")
    }
}

/// An opaque application-protocol error code plus a reason string, carried
/// in `CONNECTION_CLOSE` frames of type 0x1d.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApplicationError {
    pub code: u64,
    pub reason: &'static str,
}

impl ApplicationError {
    pub const fn new(code: u64, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "ApplicationError({})", self.code)
        } else {
            f.write_str(self.reason)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ApplicationError {}

/// The reason a connection's lifetime ended, surfaced as `final_err` from
/// blocking API calls. Distinguishes every trigger named in §7 so callers
/// and qlog can tell them apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// We initiated the close with a local transport error.
    LocalTransport(TransportError),
    /// The peer closed with a transport error.
    PeerTransport(TransportError),
    /// We initiated the close with an application error.
    LocalApplication(ApplicationError),
    /// The peer closed with an application error.
    PeerApplication(ApplicationError),
    /// The connection was idle for longer than `max_idle_timeout`.
    IdleTimeout,
    /// The handshake did not complete within `handshake_timeout`.
    HandshakeTimeout,
    /// A stateless reset token matching this connection's remote CIDs arrived.
    StatelessReset,
    /// A Version Negotiation packet was received listing no supported version.
    VersionNegotiation,
    /// The blocking call was cancelled before the loop observed it.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::LocalTransport(e) => write!(f, "local transport error: {e}"),
            Error::PeerTransport(e) => write!(f, "peer transport error: {e}"),
            Error::LocalApplication(e) => write!(f, "local application error: {e}"),
            Error::PeerApplication(e) => write!(f, "peer application error: {e}"),
            Error::IdleTimeout => write!(f, "idle timeout"),
            Error::HandshakeTimeout => write!(f, "handshake timeout"),
            Error::StatelessReset => write!(f, "stateless reset"),
            Error::VersionNegotiation => write!(f, "version negotiation failed"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
