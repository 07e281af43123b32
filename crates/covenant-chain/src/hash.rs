use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Length in bytes of a chain hash (SHA-1).
pub const HASH_LEN: usize = 20;

/// A content hash identifying a commit record, or the digest of some payload.
///
/// Rendered and serialized as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainHash([u8; HASH_LEN]);

impl ChainHash {
    /// Sentinel parent hash of the first commit in every actor chain.
    pub const GENESIS: ChainHash = ChainHash([0u8; HASH_LEN]);

    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First seven hex characters, the way short hashes show up in listings.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(7);
        hex
    }
}

/// Hashes arbitrary bytes with the chain's hash primitive.
pub fn digest(content: &[u8]) -> ChainHash {
    let mut hasher = Sha1::new();
    hasher.update(content);
    let mut bytes = [0u8; HASH_LEN];
    bytes.copy_from_slice(&hasher.finalize());
    ChainHash(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid chain hash '{input}': expected {} hex characters", HASH_LEN * 2)]
pub struct ParseHashError {
    input: String,
}

impl FromStr for ChainHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('#').unwrap_or(s);
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(trimmed, &mut bytes).map_err(|_| ParseHashError {
            input: s.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", self.short())
    }
}

impl Serialize for ChainHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing byte payloads as hex strings instead of number arrays.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_sha1() {
        // sha1("abc")
        assert_eq!(
            digest(b"abc").to_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_parse_and_display() {
        let hash = digest(b"covenant");
        let parsed: ChainHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);

        let prefixed: ChainHash = format!("#{}", hash).parse().unwrap();
        assert_eq!(prefixed, hash);
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert!("abcd".parse::<ChainHash>().is_err());
        assert!("zz".repeat(20).parse::<ChainHash>().is_err());
    }

    #[test]
    fn test_genesis() {
        assert!(ChainHash::GENESIS.is_genesis());
        assert_eq!(ChainHash::GENESIS.to_hex(), "0".repeat(40));
        assert!(!digest(b"").is_genesis());
    }

    #[test]
    fn test_serialization() {
        let hash = digest(b"state");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ChainHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
