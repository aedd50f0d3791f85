// SPDX-License-Identifier: Apache-2.0

//! Connection identifiers and the connection-wide error taxonomy.

pub mod error;
pub mod id;

pub use error::{ApplicationError, Error, TransportError};
pub use id::ConnectionId;
