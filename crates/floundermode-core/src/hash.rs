use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::DictionaryError;

/// SHA-256 digest of a term file's raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(pub [u8; 32]);

impl ContentDigest {
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Digest arbitrary serialized content. Pure and deterministic.
#[must_use]
pub fn digest(content: &[u8]) -> ContentDigest {
    ContentDigest(Sha256::digest(content).into())
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = DictionaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(value)
            .map_err(|err| DictionaryError::Parse(format!("invalid digest hex: {err}")))?;
        let array: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            DictionaryError::Parse(format!("digest must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
