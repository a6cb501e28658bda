// Wire and storage types for PLC log entries

use crate::error::MirageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One line of the upstream export feed. Also the shape persisted in the
/// operation log and echoed back by the audit-log endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcEntry {
    pub did: String,
    pub operation: PlcOperation,
    pub cid: String,
    #[serde(default)]
    pub nullified: bool,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// The polymorphic operation payload, dispatched on the upstream `type`
/// discriminator. The upstream emits `create` for the legacy pre-multi-service
/// form, not `legacy_plc_operation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlcOperation {
    #[serde(rename = "plc_operation")]
    Operation(PlcOperationData),
    #[serde(rename = "plc_tombstone")]
    Tombstone(PlcTombstoneData),
    #[serde(rename = "create")]
    LegacyCreate(LegacyCreateData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcOperationData {
    pub sig: String,
    #[serde(default)]
    pub prev: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, PlcService>,
    #[serde(default)]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub rotation_keys: Vec<String>,
    #[serde(default)]
    pub verification_methods: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcTombstoneData {
    pub sig: String,
    pub prev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCreateData {
    pub sig: String,
    #[serde(default)]
    pub prev: Option<String>,
    pub handle: String,
    pub service: String,
    pub signing_key: String,
    pub recovery_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcService {
    #[serde(rename = "type")]
    pub service_type: String,
    pub endpoint: String,
}

impl PlcEntry {
    /// Decode a single NDJSON line from the export feed.
    ///
    /// An unknown `operation.type` is reported as `BadOperationType` so the
    /// exporter can tell a new upstream variant from plain garbage.
    pub fn from_json(line: &str) -> Result<Self, MirageError> {
        match serde_json::from_str::<PlcEntry>(line) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                    if let Some(op_type) =
                        value.pointer("/operation/type").and_then(|t| t.as_str())
                    {
                        if !matches!(op_type, "plc_operation" | "plc_tombstone" | "create") {
                            return Err(MirageError::BadOperationType(op_type.to_string()));
                        }
                    }
                }
                Err(MirageError::BadEntry(err.to_string()))
            }
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self.operation, PlcOperation::Tombstone(_))
    }

    /// The handle this entry asserts, if any: `alsoKnownAs[0]` for full
    /// operations, the flat `handle` for legacy creates. The `at://` scheme
    /// prefix is stripped.
    pub fn asserted_handle(&self) -> Option<String> {
        let raw = match &self.operation {
            PlcOperation::Operation(op) => op.also_known_as.first()?.as_str(),
            PlcOperation::LegacyCreate(create) => create.handle.as_str(),
            PlcOperation::Tombstone(_) => return None,
        };
        Some(raw.strip_prefix("at://").unwrap_or(raw).to_string())
    }
}

/// Currently asserted primary handle for a DID, as materialized in the
/// handle index.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DidHandle {
    pub did: String,
    pub handle: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_ENTRY: &str = r#"{"did":"did:plc:abc","operation":{"type":"plc_operation","alsoKnownAs":["at://alice.test"],"verificationMethods":{"atproto":"did:key:zQ3sh"},"services":{"atproto_pds":{"type":"AtprotoPersonalDataServer","endpoint":"https://pds.example"}},"rotationKeys":[],"sig":"s"},"cid":"bafy1","nullified":false,"createdAt":"2024-01-01T00:00:00.000000000Z"}"#;

    const TOMBSTONE_ENTRY: &str = r#"{"did":"did:plc:abc","operation":{"type":"plc_tombstone","sig":"s","prev":"bafy1"},"cid":"bafy2","nullified":false,"createdAt":"2024-01-02T00:00:00.000000000Z"}"#;

    const LEGACY_ENTRY: &str = r#"{"did":"did:plc:leg","operation":{"type":"create","handle":"bob.test","service":"https://bob.pds","signingKey":"did:key:zQ3sh","recoveryKey":"did:key:zQ3sh","sig":"s","prev":""},"cid":"bafy3","nullified":false,"createdAt":"2024-01-03T00:00:00.000000000Z"}"#;

    #[test]
    fn test_decode_plc_operation() {
        let entry = PlcEntry::from_json(CREATE_ENTRY).unwrap();
        assert_eq!(entry.did, "did:plc:abc");
        assert_eq!(entry.cid, "bafy1");
        assert!(!entry.nullified);
        assert_eq!(entry.created_at, "2024-01-01T00:00:00.000000000Z");

        match &entry.operation {
            PlcOperation::Operation(op) => {
                assert_eq!(op.also_known_as, vec!["at://alice.test"]);
                assert_eq!(
                    op.verification_methods.get("atproto").unwrap(),
                    "did:key:zQ3sh"
                );
                let pds = op.services.get("atproto_pds").unwrap();
                assert_eq!(pds.service_type, "AtprotoPersonalDataServer");
                assert_eq!(pds.endpoint, "https://pds.example");
                assert!(op.prev.is_none());
            }
            other => panic!("expected plc_operation, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_tombstone() {
        let entry = PlcEntry::from_json(TOMBSTONE_ENTRY).unwrap();
        assert!(entry.is_tombstone());
        assert!(entry.asserted_handle().is_none());
        match &entry.operation {
            PlcOperation::Tombstone(t) => assert_eq!(t.prev, "bafy1"),
            other => panic!("expected tombstone, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_legacy_create() {
        let entry = PlcEntry::from_json(LEGACY_ENTRY).unwrap();
        match &entry.operation {
            PlcOperation::LegacyCreate(create) => {
                assert_eq!(create.handle, "bob.test");
                assert_eq!(create.service, "https://bob.pds");
            }
            other => panic!("expected legacy create, got {:?}", other),
        }
        assert_eq!(entry.asserted_handle().unwrap(), "bob.test");
    }

    #[test]
    fn test_unknown_operation_type() {
        let line = r#"{"did":"did:plc:x","operation":{"type":"plc_genesis","sig":"s"},"cid":"bafy9","nullified":false,"createdAt":"2024-01-01T00:00:00Z"}"#;
        match PlcEntry::from_json(line) {
            Err(MirageError::BadOperationType(t)) => assert_eq!(t, "plc_genesis"),
            other => panic!("expected BadOperationType, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_line() {
        assert!(matches!(
            PlcEntry::from_json("{not json"),
            Err(MirageError::BadEntry(_))
        ));
    }

    #[test]
    fn test_asserted_handle_strips_scheme() {
        let entry = PlcEntry::from_json(CREATE_ENTRY).unwrap();
        assert_eq!(entry.asserted_handle().unwrap(), "alice.test");
    }

    #[test]
    fn test_reencode_keeps_discriminator() {
        let entry = PlcEntry::from_json(TOMBSTONE_ENTRY).unwrap();
        let out = serde_json::to_value(&entry.operation).unwrap();
        assert_eq!(out["type"], "plc_tombstone");
        assert_eq!(out["prev"], "bafy1");
    }
}
