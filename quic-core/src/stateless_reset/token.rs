// SPDX-License-Identifier: Apache-2.0

//! The stateless-reset token, RFC 9000 §10.3.

use subtle::ConstantTimeEq;

pub const LEN: usize = 128 / 8;

/// A 16-byte stateless-reset token. Equality is constant-time since tokens
/// are compared against attacker-controlled datagram suffixes.
#[derive(Copy, Clone, Debug, Eq, Hash)]
pub struct Token([u8; LEN]);

impl Token {
    pub const ZEROED: Self = Self([0; LEN]);

    pub fn into_inner(self) -> [u8; LEN] {
        self.0
    }
}

impl From<[u8; LEN]> for Token {
    fn from(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Token {
    type Error = core::array::TryFromSliceError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes = bytes.try_into()?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_compare_equal() {
        let a = Token::from([7u8; LEN]);
        let b = Token::from([7u8; LEN]);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_tokens_compare_unequal() {
        let a = Token::from([1u8; LEN]);
        let b = Token::from([2u8; LEN]);
        assert_ne!(a, b);
    }
}
