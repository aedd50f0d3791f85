// SPDX-License-Identifier: Apache-2.0

//! Validated endpoint/connection configuration, built once via a `Builder`
//! and then treated as immutable for the lifetime of the endpoint.

use core::time::Duration;

/// A `tls_config`/`qlog` handle is an opaque pointer into an external
/// subsystem from this crate's point of view; callers provide their own
/// concrete type and this crate only stores and clones the handle around.
pub trait Opaque: Send + Sync {}
impl<T: Send + Sync> Opaque for T {}

/// Why a [`Builder`] rejected a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigError(&'static str);

impl ConfigError {
    const fn new(reason: &'static str) -> Self {
        Self(reason)
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

const ERR_MISSING_TLS_CONFIG: ConfigError = ConfigError::new("tls_config is required");
const ERR_HANDSHAKE_TIMEOUT_TOO_SHORT: ConfigError =
    ConfigError::new("handshake_timeout must be at least 1 second");

/// Length of the stateless-reset HMAC key, RFC 9000 §10.3.
pub const STATELESS_RESET_KEY_LEN: usize = 32;

/// Options shared by both endpoint roles, validated once at [`Builder::build`].
pub struct EndpointConfig<Tls> {
    pub tls_config: Tls,
    pub max_idle_timeout: Duration,
    pub handshake_timeout: Duration,
    pub require_address_validation: bool,
    /// `None` if the caller supplied an all-zero key: reset emission is
    /// disabled rather than deriving a key from a weak secret.
    pub stateless_reset_key: Option<[u8; STATELESS_RESET_KEY_LEN]>,
    pub max_bidi_remote_streams: u64,
    pub max_uni_remote_streams: u64,
    pub max_stream_read_buffer_size: u64,
    pub max_conn_read_buffer_size: u64,
    pub qlog: Option<Box<dyn Opaque>>,
}

impl<Tls> core::fmt::Debug for EndpointConfig<Tls> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("max_idle_timeout", &self.max_idle_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("require_address_validation", &self.require_address_validation)
            .field("stateless_reset_enabled", &self.stateless_reset_key.is_some())
            .field("max_bidi_remote_streams", &self.max_bidi_remote_streams)
            .field("max_uni_remote_streams", &self.max_uni_remote_streams)
            .field("max_stream_read_buffer_size", &self.max_stream_read_buffer_size)
            .field("max_conn_read_buffer_size", &self.max_conn_read_buffer_size)
            .finish_non_exhaustive()
    }
}

/// Builds an [`EndpointConfig`], filling in RFC-recommended defaults and
/// validating everything once at [`Builder::build`].
pub struct Builder<Tls> {
    tls_config: Option<Tls>,
    max_idle_timeout: Duration,
    handshake_timeout: Duration,
    require_address_validation: bool,
    stateless_reset_key: [u8; STATELESS_RESET_KEY_LEN],
    max_bidi_remote_streams: u64,
    max_uni_remote_streams: u64,
    max_stream_read_buffer_size: u64,
    max_conn_read_buffer_size: u64,
    qlog: Option<Box<dyn Opaque>>,
}

impl<Tls> Default for Builder<Tls> {
    fn default() -> Self {
        Self {
            tls_config: None,
            max_idle_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            require_address_validation: false,
            stateless_reset_key: [0; STATELESS_RESET_KEY_LEN],
            max_bidi_remote_streams: 100,
            max_uni_remote_streams: 100,
            max_stream_read_buffer_size: 1 << 20,
            max_conn_read_buffer_size: 4 << 20,
            qlog: None,
        }
    }
}

impl<Tls> Builder<Tls> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tls_config(mut self, tls_config: Tls) -> Self {
        self.tls_config = Some(tls_config);
        self
    }

    pub fn with_max_idle_timeout(mut self, timeout: Duration) -> Self {
        self.max_idle_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_require_address_validation(mut self, require: bool) -> Self {
        self.require_address_validation = require;
        self
    }

    pub fn with_stateless_reset_key(mut self, key: [u8; STATELESS_RESET_KEY_LEN]) -> Self {
        self.stateless_reset_key = key;
        self
    }

    pub fn with_max_bidi_remote_streams(mut self, max: u64) -> Self {
        self.max_bidi_remote_streams = max;
        self
    }

    pub fn with_max_uni_remote_streams(mut self, max: u64) -> Self {
        self.max_uni_remote_streams = max;
        self
    }

    pub fn with_max_stream_read_buffer_size(mut self, max: u64) -> Self {
        self.max_stream_read_buffer_size = max;
        self
    }

    pub fn with_max_conn_read_buffer_size(mut self, max: u64) -> Self {
        self.max_conn_read_buffer_size = max;
        self
    }

    pub fn with_qlog(mut self, qlog: Box<dyn Opaque>) -> Self {
        self.qlog = Some(qlog);
        self
    }

    pub fn build(self) -> Result<EndpointConfig<Tls>, ConfigError> {
        let tls_config = self.tls_config.ok_or(ERR_MISSING_TLS_CONFIG)?;

        if self.handshake_timeout < Duration::from_secs(1) {
            return Err(ERR_HANDSHAKE_TIMEOUT_TOO_SHORT);
        }

        let all_zero = self.stateless_reset_key == [0; STATELESS_RESET_KEY_LEN];
        let stateless_reset_key = if all_zero {
            None
        } else {
            Some(self.stateless_reset_key)
        };

        Ok(EndpointConfig {
            tls_config,
            max_idle_timeout: self.max_idle_timeout,
            handshake_timeout: self.handshake_timeout,
            require_address_validation: self.require_address_validation,
            stateless_reset_key,
            max_bidi_remote_streams: self.max_bidi_remote_streams,
            max_uni_remote_streams: self.max_uni_remote_streams,
            max_stream_read_buffer_size: self.max_stream_read_buffer_size,
            max_conn_read_buffer_size: self.max_conn_read_buffer_size,
            qlog: self.qlog,
        })
    }
}
