//! Serde helper carrying opaque byte values as base64 strings in JSON.
//! Use with `#[serde(with = "bytes")]` on a `Vec<u8>` field.

use serde::{de, Deserialize, Deserializer, Serializer};

pub(crate) fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&base64::encode(value))
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    base64::decode(&encoded).map_err(de::Error::custom)
}
