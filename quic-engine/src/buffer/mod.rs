// SPDX-License-Identifier: Apache-2.0

//! Byte-buffering primitives shared by the CRYPTO stream and (eventually)
//! application stream state.

mod pipe;

pub use pipe::{Error, Pipe};
