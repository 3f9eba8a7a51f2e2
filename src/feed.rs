//! Feed identifiers: fixed-width 32-byte opaque identifiers whose first two
//! bytes encode a schema version.

use byteorder::{BigEndian, ByteOrder};
use hex::{FromHex, ToHex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IDError {
    #[error("missing '0x' prefix")]
    MissingPrefix,

    #[error("invalid length for feed ID")]
    InvalidLength,

    #[error("failed to decode feed ID: {0}")]
    DecodeError(#[from] hex::FromHexError),
}

/// The feed report schema version, taken from the first two bytes of an [`ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedVersion(pub u16);

/// A fixed-width 32-byte feed identifier. Equality is by byte content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ID(pub [u8; 32]);

impl ID {
    /// Parses an `ID` from a `0x`-prefixed (or `0X`-prefixed) hex string.
    pub fn from_hex_str(s: &str) -> Result<Self, IDError> {
        let s = s.trim();

        if !s.starts_with("0x") && !s.starts_with("0X") {
            return Err(IDError::MissingPrefix);
        }

        let hex_str = &s[2..];
        if hex_str.len() != 64 {
            return Err(IDError::InvalidLength);
        }

        let bytes = <[u8; 32]>::from_hex(hex_str)?;
        Ok(ID(bytes))
    }

    /// Returns the `0x`-prefixed lowercase hex representation.
    pub fn to_hex_string(&self) -> String {
        format!("0x{}", self.0.encode_hex::<String>())
    }

    /// Extracts the schema version from the first two bytes.
    pub fn version(&self) -> FeedVersion {
        FeedVersion(BigEndian::read_u16(&self.0[0..2]))
    }
}

impl FromStr for ID {
    type Err = IDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ID::from_hex_str(s)
    }
}

impl fmt::Display for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}

impl fmt::Debug for ID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}

impl Serialize for ID {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> Deserialize<'de> for ID {
    fn deserialize<D>(deserializer: D) -> Result<ID, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ID::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A feed advertised by the service; carries the stream ID for subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    #[serde(rename = "feedID")]
    pub feed_id: ID,
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub const V1_FEED_ID: ID = ID([
        0, 1, 107, 74, 167, 229, 124, 167, 182, 138, 225, 191, 69, 101, 63, 86, 182, 86, 253, 58,
        163, 53, 239, 127, 174, 105, 107, 102, 63, 27, 132, 114,
    ]);
    pub const V3_FEED_ID: ID = ID([
        00, 03, 107, 74, 167, 229, 124, 167, 182, 138, 225, 191, 69, 101, 63, 86, 182, 86, 253, 58,
        163, 53, 239, 127, 174, 105, 107, 102, 63, 27, 132, 114,
    ]);

    pub const V1_FEED_ID_STR: &str =
        "0x00016b4aa7e57ca7b68ae1bf45653f56b656fd3aa335ef7fae696b663f1b8472";
    pub const V3_FEED_ID_STR: &str =
        "0x00036b4aa7e57ca7b68ae1bf45653f56b656fd3aa335ef7fae696b663f1b8472";

    #[test]
    fn feed_version_reads_first_two_bytes() {
        assert_eq!(V1_FEED_ID.version(), FeedVersion(1));
        assert_eq!(V3_FEED_ID.version(), FeedVersion(3));
    }

    #[test]
    fn from_hex_str_round_trips() {
        assert_eq!(ID::from_hex_str(V1_FEED_ID_STR), Ok(V1_FEED_ID));
        assert_eq!(V1_FEED_ID.to_hex_string(), V1_FEED_ID_STR);
    }

    #[test]
    fn from_str_matches_from_hex_str() {
        assert_eq!(ID::from_str(V3_FEED_ID_STR), Ok(V3_FEED_ID));
    }

    #[test]
    fn serialize_and_deserialize_feed() {
        let feed = Feed {
            feed_id: V1_FEED_ID,
        };
        let json = serde_json::to_string(&feed).unwrap();
        assert_eq!(json, format!("{{\"feedID\":\"{}\"}}", V1_FEED_ID_STR));

        let back: Feed = serde_json::from_str(&json).unwrap();
        assert_eq!(back, feed);
    }

    #[test]
    fn revert_if_missing_prefix() {
        let hex_str = &V1_FEED_ID_STR[2..];
        assert_eq!(ID::from_hex_str(hex_str), Err(IDError::MissingPrefix));
    }

    #[test]
    fn revert_if_invalid_length() {
        assert_eq!(ID::from_hex_str("0x309"), Err(IDError::InvalidLength));
    }

    #[test]
    fn revert_if_failed_to_decode() {
        let hex_str = "0xZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ";
        assert!(matches!(
            ID::from_hex_str(hex_str),
            Err(IDError::DecodeError(_))
        ));
    }
}
