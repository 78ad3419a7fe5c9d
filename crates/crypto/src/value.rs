use serde::{Deserialize, Serialize};

/// How a [`CryptoValue`] was produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CryptoType {
    #[default]
    Encryption,
    Hash,
}

/// An encrypted value as persisted in event payloads.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoValue {
    pub crypto_type: CryptoType,
    pub algorithm: String,
    pub key_id: String,
    #[serde(with = "base64_bytes")]
    pub crypted: Vec<u8>,
}

impl std::fmt::Debug for CryptoValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoValue")
            .field("crypto_type", &self.crypto_type)
            .field("algorithm", &self.algorithm)
            .field("key_id", &self.key_id)
            .field("crypted", &format_args!("[{} bytes]", self.crypted.len()))
            .finish()
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_camel_case_with_base64_ciphertext() {
        let value = CryptoValue {
            crypto_type: CryptoType::Encryption,
            algorithm: "aes-256-gcm".to_string(),
            key_id: "idp".to_string(),
            crypted: vec![0, 1, 2, 255],
        };

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            json!({
                "cryptoType": "encryption",
                "algorithm": "aes-256-gcm",
                "keyId": "idp",
                "crypted": "AAEC/w==",
            })
        );
        assert_eq!(serde_json::from_value::<CryptoValue>(json).unwrap(), value);
    }

    #[test]
    fn debug_hides_ciphertext() {
        let value = CryptoValue {
            crypted: vec![42; 16],
            ..serde_json::from_value(json!({
                "cryptoType": "encryption",
                "algorithm": "a",
                "keyId": "k",
                "crypted": "",
            }))
            .unwrap()
        };
        assert!(format!("{value:?}").contains("[16 bytes]"));
    }
}
