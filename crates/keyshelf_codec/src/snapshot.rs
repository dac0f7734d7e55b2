//! CBOR encoding for persisted database snapshots.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid CBOR for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, KeyPath};
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Image {
        key_path: Option<KeyPath>,
        records: Vec<(Key, Value)>,
    }

    #[test]
    fn roundtrip_records_with_keys() {
        let image = Image {
            key_path: Some(KeyPath::from("id")),
            records: vec![
                (Key::from(1), json!({"id": 1, "data": "foo", "tags": ["a", "b"]})),
                (Key::from(2), json!({"id": 2, "ratio": 0.5, "neg": -3, "nested": {"ok": true}})),
            ],
        };
        let bytes = to_cbor(&image).unwrap();
        let decoded: Image = from_cbor(&bytes).unwrap();
        assert_eq!(image, decoded);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let result: CodecResult<Image> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
