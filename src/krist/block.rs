use hex::FromHexError;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

/// The truncated hash of a block, as served by the node: exactly twelve hex
/// characters, stored as six raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "&str", into = "String")]
pub struct ShortHash([u8; ShortHash::LENGTH]);

impl ShortHash {
    pub const LENGTH: usize = 6;

    /// Length of the hex form used on the wire and in hash preimages.
    pub const HEX_LENGTH: usize = 12;

    pub fn bytes(self) -> [u8; ShortHash::LENGTH] {
        self.0
    }

    /// The twelve character hex form.
    pub fn into_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ShortHash {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut hash = [0u8; Self::LENGTH];
        hex::decode_to_slice(s, &mut hash)?;
        Ok(Self(hash))
    }
}

impl TryFrom<&str> for ShortHash {
    type Error = FromHexError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl Display for ShortHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.into_hex())
    }
}

impl From<ShortHash> for String {
    fn from(hash: ShortHash) -> Self {
        hash.into_hex()
    }
}

impl Debug for ShortHash {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "ShortHash({})", self)
    }
}

/// The block fields consumed from node messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Block {
    pub short_hash: ShortHash,

    #[serde(default)]
    pub height: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let hash = ShortHash::from_str("000000000cad").unwrap();
        assert_eq!(hash.into_hex(), "000000000cad");
        assert_eq!(hash.to_string(), "000000000cad");
        assert_eq!(hash.bytes(), [0, 0, 0, 0, 0x0c, 0xad]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ShortHash::from_str("0cad").is_err());
        assert!(ShortHash::from_str("000000000cad00").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(ShortHash::from_str("00000000zzad").is_err());
    }

    #[test]
    fn block_from_json() {
        let block: Block =
            serde_json::from_str(r#"{"short_hash":"abcdef012345","height":42,"value":25}"#)
                .unwrap();
        assert_eq!(block.short_hash.into_hex(), "abcdef012345");
        assert_eq!(block.height, Some(42));
    }
}
