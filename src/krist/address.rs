use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::{self, FromStr};

/// A krist address. Plain hex addresses (v1) and `k`-prefixed base36
/// addresses (v2) are both accepted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "&str", into = "String")]
pub struct Address([u8; Address::LENGTH]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidAddress {
    #[error("address must be {} characters, got {0}", Address::LENGTH)]
    BadLength(usize),

    #[error("address contains {0:?} at position {1}")]
    BadCharacter(char, usize),
}

impl Address {
    /// Address length in bytes.
    pub const LENGTH: usize = 10;

    pub fn as_str(&self) -> &str {
        // only validated ASCII is ever stored
        str::from_utf8(&self.0).unwrap()
    }

    pub fn as_bytes(&self) -> &[u8; Address::LENGTH] {
        &self.0
    }

    /// Whether `c` may appear in an address of the given version. The v1
    /// alphabet is lowercase hex; v2 widens it to the full lowercase base36
    /// range.
    fn allowed(version_2: bool, c: char) -> bool {
        match c {
            '0'..='9' | 'a'..='f' => true,
            'g'..='z' => version_2,
            _ => false,
        }
    }
}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LENGTH {
            return Err(InvalidAddress::BadLength(s.len()));
        }

        let version_2 = s.starts_with('k');
        if let Some((i, c)) = s
            .chars()
            .enumerate()
            .find(|&(_, c)| !Self::allowed(version_2, c))
        {
            return Err(InvalidAddress::BadCharacter(c, i));
        }

        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(s.as_bytes());
        Ok(Self(bytes))
    }
}

impl TryFrom<&str> for Address {
    type Error = InvalidAddress;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_tuple("Address").field(&self.as_str()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_addresses() {
        assert_eq!(
            Address::from_str("abcdef1234").unwrap().as_str(),
            "abcdef1234"
        );
        assert_eq!(
            Address::from_str("k5ztameslf").unwrap().as_str(),
            "k5ztameslf"
        );
    }

    #[test]
    fn length_is_checked_first() {
        assert_eq!(
            Address::from_str("abc").unwrap_err(),
            InvalidAddress::BadLength(3)
        );
        assert_eq!(
            Address::from_str("k5ztameslf0").unwrap_err(),
            InvalidAddress::BadLength(11)
        );
    }

    #[test]
    fn alphabet_depends_on_version() {
        // base36 characters are fine in v2 but not in plain hex addresses
        assert!(Address::from_str("kabcdefghi").is_ok());
        assert_eq!(
            Address::from_str("abcdefghij").unwrap_err(),
            InvalidAddress::BadCharacter('g', 6)
        );
        assert_eq!(
            Address::from_str("K5ZTAMESLF").unwrap_err(),
            InvalidAddress::BadCharacter('K', 0)
        );
    }

    #[test]
    fn serde_round_trip() {
        let address = Address::from_str("k5ztameslf").unwrap();

        assert_eq!(
            address,
            serde_json::from_str::<Address>(&serde_json::to_string(&address).unwrap()).unwrap()
        );
    }
}
