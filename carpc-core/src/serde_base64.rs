//! Serde helper that carries opaque binary fields as standard base64 strings.
//!
//! Use with `#[serde(with = "carpc_core::serde_base64")]` on a `Vec<u8>` field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    STANDARD
        .decode(s.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "super")]
        data: Vec<u8>,
    }

    #[test]
    fn test_encodes_as_base64_string() {
        let blob = Blob {
            data: vec![0x00, 0xff, 0x10],
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"AP8Q"}"#);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let result: Result<Blob, _> = serde_json::from_str(r#"{"data":"***"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_non_string() {
        let result: Result<Blob, _> = serde_json::from_str(r#"{"data":[1,2,3]}"#);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let blob = Blob { data };
            let json = serde_json::to_vec(&blob).unwrap();
            let parsed: Blob = serde_json::from_slice(&json).unwrap();
            prop_assert_eq!(parsed, blob);
        }
    }
}
