//! Stored payloads for sites and ACME users.
//!
//! Records are plain JSON objects without a version envelope. Field names and
//! the base64 encoding of byte fields match what the host TLS subsystem has
//! always written, so objects stored by earlier deployments stay readable.

use serde::{Deserialize, Serialize};

/// Certificate bundle for one domain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// PEM-encoded certificate chain.
    #[serde(rename = "Cert", with = "base64_bytes", default)]
    pub cert: Vec<u8>,
    /// PEM-encoded private key.
    #[serde(rename = "Key", with = "base64_bytes", default)]
    pub key: Vec<u8>,
    /// Opaque metadata owned by the host.
    #[serde(rename = "Meta", with = "base64_bytes", default)]
    pub meta: Vec<u8>,
}

impl SiteRecord {
    pub fn new(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>, meta: impl Into<Vec<u8>>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            meta: meta.into(),
        }
    }
}

/// ACME account registration and key material for one email.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "Reg", with = "base64_bytes", default)]
    pub reg: Vec<u8>,
    #[serde(rename = "Key", with = "base64_bytes", default)]
    pub key: Vec<u8>,
}

impl UserRecord {
    pub fn new(reg: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            reg: reg.into(),
            key: key.into(),
        }
    }
}

/// Byte fields travel as standard base64 strings; `null` decodes as empty.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn site_record_wire_format() {
        let site = SiteRecord::new("cert", "key", "meta");
        let json = serde_json::to_string(&site).unwrap();
        assert_eq!(json, r#"{"Cert":"Y2VydA==","Key":"a2V5","Meta":"bWV0YQ=="}"#);
    }

    #[test]
    fn user_record_wire_format() {
        let user = UserRecord::new("reg", "key");
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, r#"{"Reg":"cmVn","Key":"a2V5"}"#);
    }

    #[test]
    fn null_and_missing_fields_decode_as_empty() {
        let site: SiteRecord = serde_json::from_str(r#"{"Cert":null,"Key":"a2V5"}"#).unwrap();
        assert!(site.cert.is_empty());
        assert_eq!(site.key, b"key");
        assert!(site.meta.is_empty());
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let result = serde_json::from_str::<UserRecord>(r#"{"Reg":"!!!","Key":""}"#);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(serde_json::from_str::<SiteRecord>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<SiteRecord>("not json").is_err());
    }

    proptest! {
        #[test]
        fn site_bytes_survive_json(
            cert in proptest::collection::vec(any::<u8>(), 0..256),
            key in proptest::collection::vec(any::<u8>(), 0..256),
            meta in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let site = SiteRecord::new(cert, key, meta);
            let json = serde_json::to_vec(&site).unwrap();
            let back: SiteRecord = serde_json::from_slice(&json).unwrap();
            prop_assert_eq!(back, site);
        }
    }
}
