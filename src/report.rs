//! The report envelope value object.
//!
//! Decoding `full_report` into a version-specific schema (`ReportDataV1`,
//! `V2`, ...) is explicitly out of scope for this crate: the Stream Core
//! decodes only the outer `0x`-prefixed hex wrapper into bytes and leaves
//! interpretation of those bytes to the caller.

use crate::feed::ID;

use hex::FromHex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(&s);
    Vec::from_hex(trimmed).map_err(serde::de::Error::custom)
}

fn serialize_hex_bytes<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

/// A single report envelope as delivered by the service, either from the
/// REST API or over the realtime stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "feedID")]
    pub feed_id: ID,

    #[serde(rename = "validFromTimestamp")]
    pub valid_from_timestamp: u64,

    #[serde(rename = "observationsTimestamp")]
    pub observations_timestamp: u64,

    /// The signed report payload, decoded from the wire's `0x`-prefixed hex
    /// string. Per-schema decoding of these bytes is the caller's
    /// responsibility.
    #[serde(
        rename = "fullReport",
        deserialize_with = "deserialize_hex_bytes",
        serialize_with = "serialize_hex_bytes"
    )]
    pub full_report: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::{V3_FEED_ID, V3_FEED_ID_STR};

    #[test]
    fn deserializes_inbound_shape() {
        let json = format!(
            r#"{{"feedID":"{}","fullReport":"0xdead","validFromTimestamp":100,"observationsTimestamp":200}}"#,
            V3_FEED_ID_STR
        );

        let report: Report = serde_json::from_str(&json).unwrap();

        assert_eq!(report.feed_id, V3_FEED_ID);
        assert_eq!(report.full_report, vec![0xde, 0xad]);
        assert_eq!(report.valid_from_timestamp, 100);
        assert_eq!(report.observations_timestamp, 200);
    }

    #[test]
    fn round_trips_through_serialize() {
        let report = Report {
            feed_id: V3_FEED_ID,
            valid_from_timestamp: 1,
            observations_timestamp: 2,
            full_report: vec![0xbe, 0xef, 0x00],
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"fullReport\":\"0xbeef00\""));

        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn rejects_non_hex_full_report() {
        let json = format!(
            r#"{{"feedID":"{}","fullReport":"0xzz","validFromTimestamp":1,"observationsTimestamp":1}}"#,
            V3_FEED_ID_STR
        );
        assert!(serde_json::from_str::<Report>(&json).is_err());
    }
}
